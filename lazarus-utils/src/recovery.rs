// Lazarus Recovery Records
//
// Persisted lifecycle rows (sessions, snapshots, restore jobs) and the
// options that steer a restore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::snapshot::SessionSnapshot;

/// Lifecycle of a tracked session name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Killed,
    Restoring,
    Restored,
    Archived,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Killed => "killed",
            SessionState::Restoring => "restoring",
            SessionState::Restored => "restored",
            SessionState::Archived => "archived",
        }
    }

    /// States that a reboot can take away.
    pub fn is_tracked_live(&self) -> bool {
        matches!(
            self,
            SessionState::Running | SessionState::Restoring | SessionState::Restored
        )
    }
}

/// Restore job status. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// How much runtime state a restore reproduces: safe < confirm < full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Rebuild structure and pane titles only
    Safe,
    /// Also change into each pane's recorded directory
    Confirm,
    /// Also re-run each pane's last known command
    Full,
}

impl ReplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayMode::Safe => "safe",
            ReplayMode::Confirm => "confirm",
            ReplayMode::Full => "full",
        }
    }

    pub fn changes_directory(&self) -> bool {
        *self >= ReplayMode::Confirm
    }

    pub fn runs_commands(&self) -> bool {
        *self == ReplayMode::Full
    }
}

/// What to do when the target session name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Pick the first free `<name>-restored-NN`
    Rename,
    /// Kill the existing session first
    Replace,
    /// Fail the job
    Skip,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Rename => "rename",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Skip => "skip",
        }
    }
}

/// Error returned when a stored or user-provided enum value is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! str_enum {
    ($ty:ident, $kind:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_lowercase();
                $(
                    if lowered == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(SessionState, "session state", [Running, Killed, Restoring, Restored, Archived]);
str_enum!(JobStatus, "job status", [Queued, Running, Succeeded, Failed]);
str_enum!(ReplayMode, "replay mode", [Safe, Confirm, Full]);
str_enum!(ConflictPolicy, "conflict policy", [Rename, Replace, Skip]);

/// Caller-supplied restore options before normalization.
///
/// Mode and policy arrive as free text from the API layer; anything empty or
/// unknown falls back to `confirm` / `rename`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub conflict_policy: String,
    #[serde(default)]
    pub target_session: String,
    #[serde(default)]
    pub triggered_by: String,
}

/// Validated restore options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub mode: ReplayMode,
    pub conflict_policy: ConflictPolicy,
    pub target_session: String,
    pub triggered_by: String,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            mode: ReplayMode::Confirm,
            conflict_policy: ConflictPolicy::Rename,
            target_session: String::new(),
            triggered_by: "manual".to_string(),
        }
    }
}

impl RestoreRequest {
    pub fn normalize(&self) -> RestoreOptions {
        let defaults = RestoreOptions::default();
        let triggered_by = self.triggered_by.trim();
        RestoreOptions {
            mode: self.mode.parse().unwrap_or(defaults.mode),
            conflict_policy: self
                .conflict_policy
                .parse()
                .unwrap_or(defaults.conflict_policy),
            target_session: self.target_session.trim().to_string(),
            triggered_by: if triggered_by.is_empty() {
                defaults.triggered_by
            } else {
                triggered_by.to_string()
            },
        }
    }
}

/// One row per session name ever observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySession {
    pub name: String,
    pub state: SessionState,
    pub latest_snapshot_id: Option<i64>,
    pub boot_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub killed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub restore_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted snapshot row; `payload_json` holds the full [`SessionSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySnapshot {
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

impl RecoverySnapshot {
    pub fn payload(&self) -> Result<SessionSnapshot, serde_json::Error> {
        serde_json::from_str(&self.payload_json)
    }
}

/// Snapshot about to be written; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
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

impl NewSnapshot {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Result<Self, serde_json::Error> {
        Ok(Self {
            session_name: snapshot.session_name.clone(),
            boot_id: snapshot.boot_id.clone(),
            state_hash: snapshot.state_hash(),
            captured_at: snapshot.captured_at,
            active_window: snapshot.active_window,
            active_pane_id: snapshot.active_pane_id.clone(),
            window_count: snapshot.window_count() as i32,
            pane_count: snapshot.pane_count() as i32,
            payload_json: serde_json::to_string(snapshot)?,
        })
    }
}

/// Result of a content-addressed snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Id of the newest row for the session after the write
    pub snapshot_id: i64,
    /// Whether a new row was written
    pub changed: bool,
}

/// One restore attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryJob {
    pub id: i64,
    pub session_name: String,
    pub target_session: String,
    pub snapshot_id: i64,
    pub mode: ReplayMode,
    pub conflict_policy: ConflictPolicy,
    pub status: JobStatus,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub current_step: String,
    pub triggered_by: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Job about to be created in `queued` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub session_name: String,
    pub target_session: String,
    pub snapshot_id: i64,
    pub mode: ReplayMode,
    pub conflict_policy: ConflictPolicy,
    pub total_steps: i32,
    pub triggered_by: String,
}

/// Coarse progress denominator: session create, two steps per window, one per pane.
pub fn total_restore_steps(window_count: usize, pane_count: usize) -> i32 {
    (1 + 2 * window_count + pane_count) as i32
}

/// Dashboard summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOverview {
    pub boot_id: Option<String>,
    pub last_collect_at: Option<DateTime<Utc>>,
    pub live_sessions: Vec<String>,
    pub running: usize,
    pub killed: usize,
    pub restoring: usize,
    pub restored: usize,
    pub archived: usize,
    pub active_jobs: usize,
    pub killed_sessions: Vec<RecoverySession>,
    pub recent_jobs: Vec<RecoveryJob>,
}
