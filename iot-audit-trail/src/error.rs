/*!
Errors raised while decoding telemetry or reading the audit trail
*/

use std::path::PathBuf;
use thiserror::Error;

/// Why a telemetry line could not be turned into a [`crate::DeviceEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// Not UTF-8, not JSON, not an object, or a required field has the wrong type
    #[error("malformed record: {0}")]
    Malformed(String),
    /// The record parsed but a required field is absent or null
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum TrailError {
    #[error("audit trail {} could not be read: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report output {} could not be written: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
