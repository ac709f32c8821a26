// Database record models
//
// Raw rows as PostgreSQL returns them. Enum columns are TEXT and get
// validated on the way into the domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use lazarus_utils::recovery::{RecoveryJob, RecoverySession, RecoverySnapshot};

use super::error::PersistenceError;

/// Row from `recovery_sessions`
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub name: String,
    pub state: String,
    pub latest_snapshot_id: Option<i64>,
    pub boot_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub killed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub restore_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRecord> for RecoverySession {
    type Error = PersistenceError;

    fn try_from(row: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            state: row.state.parse()?,
            name: row.name,
            latest_snapshot_id: row.latest_snapshot_id,
            boot_id: row.boot_id,
            last_seen_at: row.last_seen_at,
            killed_at: row.killed_at,
            archived_at: row.archived_at,
            restore_error: row.restore_error,
            updated_at: row.updated_at,
        })
    }
}

/// Row from `recovery_snapshots`, payload selected as text
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRecord {
    pub id: i64,
    pub session_name: String,
    pub boot_id: String,
    pub state_hash: String,
    pub captured_at: DateTime<Utc>,
    pub active_window: i32,
    pub active_pane_id: String,
    pub window_count: i32,
    pub pane_count: i32,
    pub payload_json: String,
}

impl From<SnapshotRecord> for RecoverySnapshot {
    fn from(row: SnapshotRecord) -> Self {
        Self {
            id: row.id,
            session_name: row.session_name,
            boot_id: row.boot_id,
            state_hash: row.state_hash,
            captured_at: row.captured_at,
            active_window: row.active_window,
            active_pane_id: row.active_pane_id,
            window_count: row.window_count,
            pane_count: row.pane_count,
            payload_json: row.payload_json,
        }
    }
}

/// Row from `recovery_jobs`
#[derive(Debug, Clone, FromRow)]
pub struct JobRecord {
    pub id: i64,
    pub session_name: String,
    pub target_session: String,
    pub snapshot_id: i64,
    pub mode: String,
    pub conflict_policy: String,
    pub status: String,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub current_step: String,
    pub triggered_by: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRecord> for RecoveryJob {
    type Error = PersistenceError;

    fn try_from(row: JobRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            mode: row.mode.parse()?,
            conflict_policy: row.conflict_policy.parse()?,
            status: row.status.parse()?,
            id: row.id,
            session_name: row.session_name,
            target_session: row.target_session,
            snapshot_id: row.snapshot_id,
            total_steps: row.total_steps,
            completed_steps: row.completed_steps,
            current_step: row.current_step,
            triggered_by: row.triggered_by,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

pub(crate) fn sessions_from_rows(
    rows: Vec<SessionRecord>,
) -> Result<Vec<RecoverySession>, PersistenceError> {
    rows.into_iter().map(RecoverySession::try_from).collect()
}

pub(crate) fn jobs_from_rows(rows: Vec<JobRecord>) -> Result<Vec<RecoveryJob>, PersistenceError> {
    rows.into_iter().map(RecoveryJob::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarus_utils::recovery::{JobStatus, ReplayMode, SessionState};

    fn session_row(state: &str) -> SessionRecord {
        SessionRecord {
            name: "dev".to_string(),
            state: state.to_string(),
            latest_snapshot_id: Some(3),
            boot_id: "b".to_string(),
            last_seen_at: Utc::now(),
            killed_at: None,
            archived_at: None,
            restore_error: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_row_converts() {
        let session = RecoverySession::try_from(session_row("killed")).unwrap();
        assert_eq!(session.state, SessionState::Killed);
        assert_eq!(session.latest_snapshot_id, Some(3));
    }

    #[test]
    fn test_unknown_state_is_corrupt_row() {
        let err = RecoverySession::try_from(session_row("zombie")).unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptRow(_)));
    }

    #[test]
    fn test_job_row_converts() {
        let row = JobRecord {
            id: 9,
            session_name: "dev".to_string(),
            target_session: "dev-restored-01".to_string(),
            snapshot_id: 4,
            mode: "full".to_string(),
            conflict_policy: "rename".to_string(),
            status: "running".to_string(),
            total_steps: 6,
            completed_steps: 2,
            current_step: "window 0".to_string(),
            triggered_by: "boot".to_string(),
            error: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        let job = RecoveryJob::try_from(row).unwrap();
        assert_eq!(job.mode, ReplayMode::Full);
        assert_eq!(job.status, JobStatus::Running);
    }
}
