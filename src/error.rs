use std::time::Duration;

use crate::models::SessionRecord;

/// Errors surfaced by the recorder's boundary operations.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("no active recording session")]
    NoActiveSession,

    #[error("a recording session is already active: {active}")]
    SessionConflict { active: String },

    #[error("session {id} is not a manual recording")]
    WrongSessionKind { id: String },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("replay speed must be a positive number, got {0}")]
    InvalidSpeed(f64),

    #[error("recording not found: {0}")]
    RecordNotFound(String),

    #[error("{action} failed: {reason}")]
    ActuationFailure { action: &'static str, reason: String },

    /// `unsaved` carries a stopped session that could not be persisted.
    #[error("storage failure: {reason}")]
    StoreFailure {
        reason: String,
        unsaved: Option<Box<SessionRecord>>,
    },
}

impl RecorderError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        RecorderError::StoreFailure {
            reason: err.to_string(),
            unsaved: None,
        }
    }
}

/// A state query that could not produce a fresh value.
#[derive(Debug, thiserror::Error)]
pub enum ProbeDegraded {
    #[error("{probe} probe timed out after {after:?}")]
    TimedOut { probe: &'static str, after: Duration },

    #[error("{probe} probe failed: {source:#}")]
    Failed {
        probe: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
