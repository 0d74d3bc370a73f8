use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{BuildResult, ProgressEvent, ProgressSink};
use crate::domain::Profile;
use crate::profile::{ProfileDefinition, SourceKind};
use crate::qc::QcReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_qc(report: &QcReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_profiles(profiles: &[ProfileSummary]) -> io::Result<()> {
        Self::print_json(&profiles)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub name: Profile,
    pub source: SourceKind,
    pub series: &'static str,
    pub data_type: &'static str,
    pub primary: String,
    pub secondaries: Vec<String>,
    pub attribute: Option<String>,
}

impl From<ProfileDefinition> for ProfileSummary {
    fn from(definition: ProfileDefinition) -> Self {
        let (field, source) = &definition.mapping.primary;
        Self {
            name: definition.profile,
            primary: format!("{field} -> {}", source.system_code()),
            secondaries: definition
                .mapping
                .secondaries
                .iter()
                .map(|(field, source)| format!("{field} -> {}", source.system_code()))
                .collect(),
            attribute: definition
                .mapping
                .attribute
                .as_ref()
                .map(|(field, name)| format!("{field} -> {name}")),
            source: definition.source,
            series: definition.series,
            data_type: definition.data_type,
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_build(result: &BuildResult) {
        match &result.output_path {
            Some(path) => println!(
                "{}: {path} ({} bytes)",
                result.profile,
                result.size_bytes.unwrap_or(0)
            ),
            None => println!("{}: dry run, nothing written", result.profile),
        }
        println!(
            "  rows={} chunks={} primaries={} identifiers={} links={} (+{} reflexive) attributes={}",
            result.load.rows,
            result.load.chunks,
            result.stats.commits,
            result.stats.registrations,
            result.stats.links,
            result.stats.reflexive_links,
            result.stats.attributes
        );
        if let Some(report) = &result.qc {
            Self::print_qc(report);
        }
    }

    pub fn print_qc(report: &QcReport) {
        println!("QC {} -> {}", report.old, report.new);
        for change in &report.info {
            println!(
                "  {}: {} -> {}",
                change.key,
                change.old.as_deref().unwrap_or("-"),
                change.new.as_deref().unwrap_or("-")
            );
        }
        for change in report
            .identifiers
            .iter()
            .chain(report.attributes.iter())
            .chain(std::iter::once(&report.links))
        {
            let percent = change
                .percent
                .map(|p| format!("{p:+.1}%"))
                .unwrap_or_else(|| "new".to_string());
            println!("  {:<8} {:>10} -> {:>10} {percent}", change.name, change.old, change.new);
        }
        if !report.has_differences() {
            println!("  no differences");
        }
    }

    pub fn print_profiles(profiles: &[ProfileSummary]) {
        for profile in profiles {
            let source = match &profile.source {
                SourceKind::Sparql { query } => format!("sparql {query}"),
                SourceKind::Tsv { path, chunk_size } => format!("tsv {path} (chunks of {chunk_size})"),
            };
            println!("{:<22} {source}", profile.name.as_str());
            println!("  {} / {}", profile.series, profile.data_type);
            println!("  {} ; {}", profile.primary, profile.secondaries.join(", "));
            if let Some(attribute) = &profile.attribute {
                println!("  attribute {attribute}");
            }
        }
    }
}
