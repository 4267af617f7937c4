/*!
Error taxonomy for the auditor
*/

use std::path::PathBuf;

use iot_audit_trail::{ContractError, TrailError};
use thiserror::Error;

/// Per-line ingestion failures. Recovered locally: the line is skipped and the
/// stream keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestionErrorKind {
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

impl From<ContractError> for IngestionErrorKind {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Malformed(reason) => IngestionErrorKind::MalformedRecord(reason),
            ContractError::MissingField(field) => IngestionErrorKind::MissingField(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("input line {line}: {kind}")]
pub struct IngestionError {
    /// 1-based line number in the input stream
    pub line: u64,
    pub kind: IngestionErrorKind,
}

/// Conditions that stop the auditor
#[derive(Debug, Error)]
pub enum AuditorError {
    /// The trail cannot be opened, locked or appended to. Records must never be
    /// dropped silently, so this is always fatal.
    #[error("audit trail {} unavailable: {source}", .path.display())]
    TrailUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input source unavailable: {0}")]
    Input(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("output handler {handler} failed: {source}")]
    Output {
        handler: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode audit record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Report(#[from] TrailError),
}

impl AuditorError {
    pub fn trail(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditorError::TrailUnavailable {
            path: path.into(),
            source,
        }
    }
}
