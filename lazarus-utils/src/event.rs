// Lazarus Events
//
// Typed change notifications pushed toward observers (dashboard, CLI
// watchers). Payloads stay small: counts, statuses and ids.

use serde::{Deserialize, Serialize};

use crate::recovery::{JobStatus, RecoveryJob};

/// Events published on the event hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RecoveryEvent {
    /// The set of live tmux session names changed
    TmuxSessionsChanged { sessions: Vec<String>, count: usize },

    /// Something the recovery overview shows has changed
    RecoveryOverviewChanged {
        reason: String,
        #[serde(default)]
        changed_snapshots: usize,
        #[serde(default)]
        killed_sessions: Vec<String>,
        #[serde(default)]
        boot_changed: bool,
    },

    /// A restore job moved forward
    RecoveryJobChanged {
        job_id: i64,
        session_name: String,
        target_session: String,
        status: JobStatus,
        completed_steps: i32,
        total_steps: i32,
        #[serde(default)]
        error: Option<String>,
    },
}

impl RecoveryEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            RecoveryEvent::TmuxSessionsChanged { .. } => "tmux-sessions-changed",
            RecoveryEvent::RecoveryOverviewChanged { .. } => "recovery-overview-changed",
            RecoveryEvent::RecoveryJobChanged { .. } => "recovery-job-changed",
        }
    }

    pub fn overview(reason: impl Into<String>) -> Self {
        RecoveryEvent::RecoveryOverviewChanged {
            reason: reason.into(),
            changed_snapshots: 0,
            killed_sessions: Vec::new(),
            boot_changed: false,
        }
    }

    pub fn job(job: &RecoveryJob) -> Self {
        RecoveryEvent::RecoveryJobChanged {
            job_id: job.id,
            session_name: job.session_name.clone(),
            target_session: job.target_session.clone(),
            status: job.status,
            completed_steps: job.completed_steps,
            total_steps: job.total_steps,
            error: job.error.clone(),
        }
    }
}
