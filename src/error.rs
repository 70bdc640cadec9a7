use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EnrichError {
    #[error("invalid protein identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid locus tag: {0:?}")]
    InvalidLocusTag(String),

    #[error("invalid UniProt accession: {0:?}")]
    InvalidAccession(String),

    #[error("invalid protein record: {0}")]
    InvalidRecord(String),

    #[error("invalid record range {start}-{end} (total records: {total})")]
    #[diagnostic(help("start and end are 1-based and inclusive; use `all` to run to the last record"))]
    InvalidRange {
        start: usize,
        end: usize,
        total: usize,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build {service} HTTP client: {message}")]
    HttpClient { service: String, message: String },

    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} request failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        service: String,
        attempts: u32,
        message: String,
    },

    #[error("{service} returned status {status}: {message}")]
    RemoteStatus {
        service: String,
        status: u16,
        message: String,
    },

    #[error("unexpected {service} response: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("{service} transfer interrupted: {message}")]
    TransferInterrupted { service: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read FASTA input: {0}")]
    Fasta(String),

    #[error("failed to write report: {0}")]
    Report(String),

    #[error("console error: {0}")]
    Console(String),
}

impl EnrichError {
    /// Whether running the same request again later could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EnrichError::RetriesExhausted { .. } | EnrichError::TransferInterrupted { .. }
        )
    }

    /// The remote service answered that it has nothing under the requested key.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EnrichError::RemoteStatus {
                status: 404 | 410,
                ..
            }
        )
    }

    /// Errors that abort a run before any record is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EnrichError::InvalidRange { .. }
                | EnrichError::InvalidConfig(_)
                | EnrichError::ConfigRead(_)
                | EnrichError::ConfigParse(_)
        )
    }
}
