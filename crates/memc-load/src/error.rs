//! Per-record failure taxonomy
//!
//! None of these abort a job. Each one is logged where it happens and counted
//! as an error in the owning job's statistics.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// The line's category has no configured store
    #[error("Unknown device type: {0}")]
    UnknownCategory(String),

    /// Too few fields, or an empty category/id
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// A coordinate or app id could not be parsed; the record is kept
    #[error("Invalid {field} value `{value}`")]
    InvalidNumericField { field: &'static str, value: String },

    /// Retries were exhausted or the store raised an error
    #[error("Cannot write `{key}` to {addr}: {reason}")]
    StoreWriteFailure {
        key: String,
        addr: String,
        reason: String,
    },
}

impl RecordError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RecordError::MalformedRecord {
            reason: reason.into(),
        }
    }
}
