//! Typed failures reported by the case store and conversation log.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Result alias for case registry operations.
pub type CaseRes<T> = Result<T, CaseError>;

/// Failures surfaced by the case registry.
///
/// None of these are meant for an end user directly; the calling layer translates them.
#[derive(Debug, Error)]
pub enum CaseError {
    /// The backing location could not be read or written (including timeouts).
    ///
    /// Existing durable state is left untouched, so the caller may retry.
    #[error("storage unavailable at `{}`: {source}", .path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The persisted collection exists but does not parse.
    #[error("malformed case store at `{}`: {source}", .path.display())]
    MalformedStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No case carries the given `conversation_id`.
    #[error("case {0} not found")]
    NotFound(u64),

    /// The update named an unknown or read-only field, or the value has the wrong type.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    /// A case with the given `conversation_id` already exists.
    #[error("case {0} already exists")]
    DuplicateId(u64),

    /// The largest id is in use, so no further id can be assigned.
    #[error("no conversation id left after {0}")]
    IdsExhausted(u64),
}

impl CaseError {
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageUnavailable { path: path.into(), source }
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}
