// Recovery error types

use std::time::Duration;

use crate::integrations::TmuxError;
use crate::persistence::PersistenceError;

/// Errors surfaced by the collector, the restore orchestrator and the service
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("tmux: {0}")]
    Tmux(#[from] TmuxError),

    #[error("store: {0}")]
    Store(#[from] PersistenceError),

    #[error("boot identity unavailable: {0}")]
    BootIdentity(String),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(i64),

    #[error("snapshot {0} has an unreadable payload: {1}")]
    CorruptSnapshot(i64, String),

    #[error("restore job {0} not found")]
    JobNotFound(i64),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} already exists")]
    TargetExists(String),

    #[error("no free restore name for {0} (tried -restored-01 through -restored-99)")]
    NoFreeRestoreName(String),

    #[error("snapshot has no windows")]
    EmptySnapshot,

    #[error("session {name} is {state}; cannot {action}")]
    InvalidTransition {
        name: String,
        state: String,
        action: &'static str,
    },

    #[error("recovery service is shutting down")]
    ShuttingDown,

    #[error("restore timed out after {0:?}")]
    TimedOut(Duration),

    #[error("restore cancelled")]
    Cancelled,
}

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;
