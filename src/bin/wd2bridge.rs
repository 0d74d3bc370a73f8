use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use wd2bridge::app::{App, BuildOptions};
use wd2bridge::config::ConfigLoader;
use wd2bridge::domain::Profile;
use wd2bridge::error::BridgeError;
use wd2bridge::output::{JsonOutput, OutputMode, ProfileSummary, TextOutput, TracingSink};
use wd2bridge::qc::{HttpReleaseFetcher, PriorRelease};
use wd2bridge::source::Row;
use wd2bridge::sparql::{SparqlClient, SparqlHttpClient};

#[derive(Parser)]
#[command(name = "wd2bridge")]
#[command(about = "Build identifier-mapping databases from Wikidata")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build the mapping database for a profile")]
    Build(BuildArgs),
    #[command(about = "Compare two mapping databases")]
    Qc(QcArgs),
    #[command(about = "List the built-in profiles")]
    Profiles,
}

#[derive(Args)]
struct BuildArgs {
    profile: Profile,

    #[arg(long)]
    config: Option<String>,

    /// Database path, instead of the dated file in the output directory.
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Query or delimited file to read instead of the profile default.
    #[arg(long)]
    source: Option<Utf8PathBuf>,

    /// Previous release (path or URL) to compare against.
    #[arg(long)]
    old_db: Option<String>,

    #[arg(long)]
    no_qc: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct QcArgs {
    /// Previous release, path or URL.
    old: String,
    new: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<BridgeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BridgeError) -> u8 {
    match error {
        BridgeError::MissingConfig(_)
        | BridgeError::ConfigRead(_)
        | BridgeError::ConfigParse(_)
        | BridgeError::UnknownProfile(_)
        | BridgeError::UnknownDataSource(_)
        | BridgeError::InvalidIdentifier(_)
        | BridgeError::QueryRead(_)
        | BridgeError::SourceRead { .. }
        | BridgeError::MissingPrimary { .. } => 2,
        BridgeError::SparqlHttp(_)
        | BridgeError::SparqlStatus { .. }
        | BridgeError::SparqlParse(_)
        | BridgeError::ReleaseFetch(_)
        | BridgeError::ReleaseStatus { .. } => 3,
        BridgeError::Store { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match cli.command {
        Commands::Build(args) => run_build(args, output_mode),
        Commands::Qc(args) => run_qc(args, output_mode),
        Commands::Profiles => run_profiles(output_mode),
    }
}

fn run_build(args: BuildArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let sparql = SparqlHttpClient::new(&config.endpoint, config.timeout)?;
    let fetcher = HttpReleaseFetcher::new()?;
    let app = App::new(config, sparql, fetcher);

    let options = BuildOptions {
        output: args.output,
        source: args.source,
        old_db: args.old_db.as_deref().map(PriorRelease::parse),
        no_qc: args.no_qc,
        dry_run: args.dry_run,
    };

    match output_mode {
        OutputMode::Json => {
            let result = app.build(args.profile, &options, &JsonOutput)?;
            JsonOutput::print_build(&result).into_diagnostic()?;
        }
        OutputMode::Text => {
            let result = app.build(args.profile, &options, &TracingSink)?;
            TextOutput::print_build(&result);
        }
    }
    Ok(())
}

fn run_qc(args: QcArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(None)?;
    let app = App::new(config, NopSparql, HttpReleaseFetcher::new()?);
    let release = PriorRelease::parse(&args.old);

    match output_mode {
        OutputMode::Json => {
            let report = app.compare(&release, &args.new, &JsonOutput)?;
            JsonOutput::print_qc(&report).into_diagnostic()?;
        }
        OutputMode::Text => {
            let report = app.compare(&release, &args.new, &TracingSink)?;
            TextOutput::print_qc(&report);
        }
    }
    Ok(())
}

fn run_profiles(output_mode: OutputMode) -> miette::Result<()> {
    let profiles: Vec<ProfileSummary> = Profile::ALL
        .iter()
        .map(|profile| ProfileSummary::from(profile.definition()))
        .collect();
    match output_mode {
        OutputMode::Json => JsonOutput::print_profiles(&profiles).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_profiles(&profiles),
    }
    Ok(())
}

struct NopSparql;

impl SparqlClient for NopSparql {
    fn select(&self, _query: &str) -> Result<Vec<Row>, BridgeError> {
        Err(BridgeError::SparqlHttp("no SPARQL access in qc mode".to_string()))
    }
}
