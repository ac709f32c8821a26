// Repository interfaces
//
// The collector and the restore orchestrator reach storage only through
// these traits. Each one stays small so test fakes are trivial; the
// in-memory and PostgreSQL stores implement all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lazarus_utils::recovery::{
    JobStatus, NewJob, NewSnapshot, RecoveryJob, RecoverySession, RecoverySnapshot, SessionState,
    UpsertOutcome,
};

use super::error::PersistenceResult;
use crate::integrations::{LivePane, LiveSession, LiveWindow};

/// Runtime key holding the last observed boot identity
pub const KEY_BOOT_ID: &str = "recovery.boot_id";
/// Runtime key holding the RFC 3339 time of the last collector cycle
pub const KEY_LAST_COLLECT_AT: &str = "recovery.last_collect_at";
/// Runtime key holding the sorted live session names as a JSON array
pub const KEY_LIVE_SESSIONS: &str = "recovery.live_sessions";

/// Small key/value table for collector bookkeeping.
#[async_trait]
pub trait RuntimeStore: Send + Sync {
    async fn get_runtime(&self, key: &str) -> PersistenceResult<Option<String>>;

    async fn set_runtime(&self, key: &str, value: &str) -> PersistenceResult<()>;
}

/// Append-only snapshot journal.
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    /// Insert `snapshot` unless its hash equals the newest row for the
    /// session, and record the session as seen (state `running` unless it is
    /// mid-restore or freshly restored).
    async fn upsert_snapshot(&self, snapshot: &NewSnapshot) -> PersistenceResult<UpsertOutcome>;

    async fn get_snapshot(&self, id: i64) -> PersistenceResult<Option<RecoverySnapshot>>;

    /// Newest first.
    async fn list_snapshots(
        &self,
        session: &str,
        limit: usize,
    ) -> PersistenceResult<Vec<RecoverySnapshot>>;

    async fn latest_snapshot(&self, session: &str) -> PersistenceResult<Option<RecoverySnapshot>>;

    /// Keep only the newest `keep` rows per session; returns rows removed.
    async fn trim_snapshots(&self, keep: usize) -> PersistenceResult<u64>;
}

/// Session lookups.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn get_session(&self, name: &str) -> PersistenceResult<Option<RecoverySession>>;

    async fn list_sessions(&self) -> PersistenceResult<Vec<RecoverySession>>;

    async fn list_sessions_by_state(
        &self,
        states: &[SessionState],
    ) -> PersistenceResult<Vec<RecoverySession>>;
}

/// Session lifecycle transitions.
#[async_trait]
pub trait SessionTransitions: Send + Sync {
    async fn mark_killed(
        &self,
        name: &str,
        boot_id: &str,
        at: DateTime<Utc>,
    ) -> PersistenceResult<()>;

    async fn mark_restoring(&self, name: &str) -> PersistenceResult<()>;

    async fn mark_restored(&self, name: &str) -> PersistenceResult<()>;

    /// Back to `killed` with the failure attached.
    async fn mark_restore_failed(&self, name: &str, error: &str) -> PersistenceResult<()>;

    async fn mark_archived(&self, name: &str) -> PersistenceResult<()>;
}

/// Restore job rows.
#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Create a job in `queued` state.
    async fn create_job(&self, job: &NewJob) -> PersistenceResult<RecoveryJob>;

    async fn get_job(&self, id: i64) -> PersistenceResult<Option<RecoveryJob>>;

    /// Newest first.
    async fn list_jobs(&self, limit: usize) -> PersistenceResult<Vec<RecoveryJob>>;

    /// Jobs still `queued` or `running`.
    async fn list_unfinished_jobs(&self) -> PersistenceResult<Vec<RecoveryJob>>;
}

/// Restore job progress. Terminal jobs are never modified.
#[async_trait]
pub trait JobProgress: Send + Sync {
    async fn set_job_running(&self, id: i64) -> PersistenceResult<RecoveryJob>;

    async fn update_job_progress(
        &self,
        id: i64,
        completed_steps: i32,
        current_step: &str,
    ) -> PersistenceResult<()>;

    async fn update_job_target(&self, id: i64, target_session: &str) -> PersistenceResult<()>;

    /// Move the job to a terminal status; a job already terminal is returned unchanged.
    async fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> PersistenceResult<RecoveryJob>;
}

/// Everything the recovery core persists.
pub trait RecoveryStore:
    RuntimeStore + SnapshotRepo + SessionRepo + SessionTransitions + JobRepo + JobProgress
{
}

impl<T> RecoveryStore for T where
    T: RuntimeStore + SnapshotRepo + SessionRepo + SessionTransitions + JobRepo + JobProgress
{
}

/// Read-optimized view of live tmux state maintained elsewhere.
///
/// The collector prefers it over querying tmux; an absent or empty entry
/// sends it back to tmux.
#[async_trait]
pub trait ProjectionReader: Send + Sync {
    async fn projected_session(&self, name: &str) -> PersistenceResult<Option<LiveSession>>;

    async fn projected_windows(&self, session: &str) -> PersistenceResult<Vec<LiveWindow>>;

    async fn projected_panes(&self, session: &str) -> PersistenceResult<Vec<LivePane>>;
}
