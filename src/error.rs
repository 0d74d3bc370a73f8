use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BridgeError {
    #[error("unknown dataset profile: {0}")]
    UnknownProfile(String),

    #[error("unknown data source system code: {0}")]
    UnknownDataSource(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read query file at {0}")]
    QueryRead(PathBuf),

    #[error("SPARQL request failed: {0}")]
    SparqlHttp(String),

    #[error("SPARQL endpoint returned status {status}: {message}")]
    SparqlStatus { status: u16, message: String },

    #[error("failed to parse SPARQL results: {0}")]
    SparqlParse(String),

    #[error("failed to read source file {path}: {message}")]
    SourceRead { path: PathBuf, message: String },

    #[error("row {row} has no value for primary field '{field}'")]
    #[diagnostic(help("every row must carry the primary identifier; fix the source and re-run"))]
    MissingPrimary { row: usize, field: String },

    #[error("store operation '{operation}' failed: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },

    #[error("failed to fetch previous release: {0}")]
    ReleaseFetch(String),

    #[error("previous release returned status {status}: {message}")]
    ReleaseStatus { status: u16, message: String },

    #[error("quality control failed: {0}")]
    QualityControl(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl BridgeError {
    pub(crate) fn store(operation: &'static str, err: impl std::fmt::Display) -> Self {
        BridgeError::Store {
            operation,
            message: err.to_string(),
        }
    }
}
