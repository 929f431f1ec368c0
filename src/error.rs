use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("source not found: {path}: {source}")]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema mismatch in '{set}': {detail}")]
    SchemaMismatch { set: String, detail: String },

    #[error("ambiguous join: key '{key}' matches {count} records in '{right}'")]
    AmbiguousJoin {
        key: String,
        count: usize,
        right: String,
    },

    #[error("schema conflict on table '{table}': existing columns {existing:?}, incoming columns {incoming:?}")]
    SchemaConflict {
        table: String,
        existing: Vec<String>,
        incoming: Vec<String>,
    },

    #[error("destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("endpoint rejected request with status {status}: {body}")]
    EndpointRejected { status: u16, body: String },

    #[error("unexpected query results: {0}")]
    UnexpectedResults(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    pub fn schema(set: impl Into<String>, detail: impl Into<String>) -> Self {
        LoaderError::SchemaMismatch {
            set: set.into(),
            detail: detail.into(),
        }
    }

    /// Attach the stage the error surfaced in.
    pub fn at(self, stage: Stage) -> PipelineError {
        PipelineError {
            stage,
            source: self,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Identify,
    Join,
    Persist,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Identify => "identify",
            Stage::Join => "join",
            Stage::Persist => "persist",
            Stage::Verify => "verify",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: LoaderError,
}
