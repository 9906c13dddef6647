use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed field {field} on line {line}: {value:?}")]
    MalformedField {
        field: String,
        value: String,
        line: u64,
    },

    #[error("required column missing from header: {0}")]
    MissingColumn(String),

    #[error("failed to read delimited file: {0}")]
    Csv(String),

    #[error("failed to read FASTA input: {0}")]
    Fasta(String),

    #[error("download failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("uniprot request failed: {0}")]
    UniprotHttp(String),

    #[error("uniprot returned status {status}: {message}")]
    UniprotStatus { status: u16, message: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    #[diagnostic(help("the remote service may be down; rerun once it is reachable"))]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("duplicate record key: {0}")]
    DuplicateKey(String),

    #[error("prepared dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl IngestError {
    /// Whether the error came from talking to a remote service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            IngestError::DownloadHttp(_)
                | IngestError::DownloadStatus { .. }
                | IngestError::UniprotHttp(_)
                | IngestError::UniprotStatus { .. }
                | IngestError::RetriesExhausted { .. }
        )
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::Csv(err.to_string())
    }
}
