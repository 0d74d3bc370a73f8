use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Profile;
use crate::error::BridgeError;
use crate::profile::{ProfileDefinition, SourceKind};
use crate::qc::PriorRelease;
use crate::sparql::WIKIDATA_ENDPOINT;

pub const DEFAULT_CONFIG_FILE: &str = "wd2bridge.json";
pub const DEFAULT_SOURCE_VERSION: &str = "1.0.0";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub query_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub datasets: BTreeMap<Profile, DatasetEntry>,
}

/// Per-profile overrides. Every field falls back to the built-in profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatasetEntry {
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub old_db: Option<String>,
    #[serde(default)]
    pub source_version: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub endpoint: String,
    pub query_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub timeout: Option<Duration>,
    datasets: BTreeMap<Profile, DatasetEntry>,
}

/// Everything a build needs to know about one profile after overrides.
#[derive(Debug, Clone)]
pub struct DatasetSettings {
    pub definition: ProfileDefinition,
    pub output_file: String,
    pub data_type: String,
    pub source_version: String,
    pub old_db: Option<PriorRelease>,
    /// Query file or delimited file, already resolved to a path.
    pub source_path: Utf8PathBuf,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BridgeError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        if !config_path.as_std_path().exists() {
            if path.is_some() {
                return Err(BridgeError::MissingConfig(config_path.into_std_path_buf()));
            }
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| BridgeError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BridgeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BridgeError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(BridgeError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }
        Ok(ResolvedConfig {
            schema_version,
            endpoint: non_blank(config.endpoint).unwrap_or_else(|| WIKIDATA_ENDPOINT.to_string()),
            query_dir: Utf8PathBuf::from(
                non_blank(config.query_dir).unwrap_or_else(|| "queries".to_string()),
            ),
            output_dir: Utf8PathBuf::from(
                non_blank(config.output_dir).unwrap_or_else(|| "output".to_string()),
            ),
            timeout: config
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            datasets: config.datasets,
        })
    }
}

impl ResolvedConfig {
    pub fn settings(&self, profile: Profile) -> DatasetSettings {
        let definition = profile.definition();
        let entry = self.datasets.get(&profile).cloned().unwrap_or_default();

        let source_path = match (&definition.source, non_blank(entry.source)) {
            (_, Some(path)) => Utf8PathBuf::from(path),
            (SourceKind::Sparql { query }, None) => self.query_dir.join(query),
            (SourceKind::Tsv { path, .. }, None) => Utf8PathBuf::from(*path),
        };

        DatasetSettings {
            output_file: non_blank(entry.output_file)
                .unwrap_or_else(|| definition.output_file.to_string()),
            data_type: non_blank(entry.data_type)
                .unwrap_or_else(|| definition.data_type.to_string()),
            source_version: non_blank(entry.source_version)
                .unwrap_or_else(|| DEFAULT_SOURCE_VERSION.to_string()),
            old_db: non_blank(entry.old_db).map(|value| PriorRelease::parse(&value)),
            source_path,
            definition,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
