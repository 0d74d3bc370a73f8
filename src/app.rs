use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::Serialize;

use crate::commit::{CommitStats, RunContext};
use crate::config::{DatasetSettings, ResolvedConfig};
use crate::domain::Profile;
use crate::error::BridgeError;
use crate::fs_util::{dated_output_path, file_size};
use crate::load::{LoadSummary, load_rows};
use crate::profile::SourceKind;
use crate::qc::{PriorRelease, QcReport, ReleaseFetcher, run_qc};
use crate::source::RowSource;
use crate::sparql::{SparqlClient, SparqlSource};
use crate::store::{MappingStore, MemoryStore, SqliteStore, StoreInfo};
use crate::tsv::TsvSource;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Explicit store path instead of the dated default.
    pub output: Option<Utf8PathBuf>,
    /// Query or delimited file overriding the profile's source.
    pub source: Option<Utf8PathBuf>,
    pub old_db: Option<PriorRelease>,
    pub no_qc: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub profile: Profile,
    pub source: String,
    pub output_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub info: StoreInfo,
    pub load: LoadSummary,
    pub stats: CommitStats,
    pub qc: Option<QcReport>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: String, started: Option<Instant>) {
    sink.event(ProgressEvent {
        message,
        elapsed: started.map(|at| at.elapsed()),
    });
}

pub struct App<C: SparqlClient, F: ReleaseFetcher> {
    config: ResolvedConfig,
    sparql: C,
    fetcher: F,
}

impl<C: SparqlClient, F: ReleaseFetcher> App<C, F> {
    pub fn new(config: ResolvedConfig, sparql: C, fetcher: F) -> Self {
        Self {
            config,
            sparql,
            fetcher,
        }
    }

    /// Builds the store for `profile`: source, graph, commit, finalize, then
    /// the optional comparison with a prior release.
    pub fn build(
        &self,
        profile: Profile,
        options: &BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, BridgeError> {
        let settings = self.config.settings(profile);
        let info = StoreInfo::new(
            settings.definition.series,
            &settings.data_type,
            &settings.source_version,
        );
        let mut source = self.open_source(&settings, options)?;
        let source_label = source.describe();

        if options.dry_run {
            phase(sink, format!("phase=Build; dry run of {profile}"), None);
            let mut store = MemoryStore::new();
            let (load, stats) = self.fill(&settings, &info, source.as_mut(), &mut store, sink)?;
            return Ok(BuildResult {
                profile,
                source: source_label,
                output_path: None,
                size_bytes: None,
                info,
                load,
                stats,
                qc: None,
                dry_run: true,
            });
        }

        let output_path = options.output.clone().unwrap_or_else(|| {
            dated_output_path(
                &self.config.output_dir,
                &settings.output_file,
                Local::now().date_naive(),
            )
        });
        phase(
            sink,
            format!("phase=Store; creating database {output_path}"),
            None,
        );
        let (load, stats) = {
            let mut store = SqliteStore::create(&output_path)?;
            self.fill(&settings, &info, source.as_mut(), &mut store, sink)?
        };
        let size = file_size(&output_path)?;
        phase(
            sink,
            format!(
                "phase=Store; database finished: {} ({size} bytes)",
                output_path.file_name().unwrap_or(output_path.as_str())
            ),
            None,
        );

        let release = options.old_db.clone().or(settings.old_db);
        let qc = match release {
            Some(release) if !options.no_qc => Some(self.compare(&release, &output_path, sink)?),
            _ => None,
        };

        Ok(BuildResult {
            profile,
            source: source_label,
            output_path: Some(output_path.to_string()),
            size_bytes: Some(size),
            info,
            load,
            stats,
            qc,
            dry_run: false,
        })
    }

    /// Compares a prior release with the store at `new_store`.
    pub fn compare(
        &self,
        release: &PriorRelease,
        new_store: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<QcReport, BridgeError> {
        let started = Instant::now();
        phase(
            sink,
            format!(
                "phase=Qc; comparing {} with previous version {}",
                new_store,
                release.describe()
            ),
            None,
        );
        let report = run_qc(&self.fetcher, release, new_store)?;
        report.log();
        phase(sink, "phase=Qc; done".to_string(), Some(started));
        Ok(report)
    }

    fn open_source<'s>(
        &'s self,
        settings: &DatasetSettings,
        options: &BuildOptions,
    ) -> Result<Box<dyn RowSource + 's>, BridgeError> {
        let path = options
            .source
            .clone()
            .unwrap_or_else(|| settings.source_path.clone());
        Ok(match settings.definition.source {
            SourceKind::Sparql { .. } => Box::new(SparqlSource::new(&self.sparql, path)),
            SourceKind::Tsv { .. } => Box::new(TsvSource::new(path)),
        })
    }

    fn fill<R, S>(
        &self,
        settings: &DatasetSettings,
        info: &StoreInfo,
        source: &mut R,
        store: &mut S,
        sink: &dyn ProgressSink,
    ) -> Result<(LoadSummary, CommitStats), BridgeError>
    where
        R: RowSource + ?Sized,
        S: MappingStore + ?Sized,
    {
        store.write_info(info)?;
        store.commit()?;

        let started = Instant::now();
        phase(
            sink,
            format!("phase=Source; reading {}", source.describe()),
            None,
        );
        let chunk_size = match settings.definition.source {
            SourceKind::Tsv { chunk_size, .. } => Some(chunk_size),
            SourceKind::Sparql { .. } => None,
        };
        let mut context = RunContext::new();
        let load = load_rows(
            source.rows()?,
            &settings.definition.mapping,
            chunk_size,
            &mut *store,
            &mut context,
        )?;
        store.finalize()?;
        let stats = context.stats();
        phase(
            sink,
            format!(
                "phase=Commit; {} rows, {} primaries committed, {} identifiers, {} links",
                load.rows,
                stats.commits,
                stats.registrations,
                stats.links + stats.reflexive_links
            ),
            Some(started),
        );
        Ok((load, stats))
    }
}
