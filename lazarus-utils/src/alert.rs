// Lazarus Alerts
//
// Operator-facing alerts raised when a session is lost or a restore fails.
// Alerts are addressed by a dedupe key so repeated raises update one entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Something was lost and needs attention
    Error,
    /// Degraded but recoverable
    Warning,
    /// Informational
    Info,
}

impl AlertSeverity {
    /// Get icon character for this severity
    pub fn icon(&self) -> &'static str {
        match self {
            AlertSeverity::Error => "✗",
            AlertSeverity::Warning => "⚠",
            AlertSeverity::Info => "•",
        }
    }

    /// Parse from CLI string argument
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(AlertSeverity::Error),
            "warning" => Some(AlertSeverity::Warning),
            "info" => Some(AlertSeverity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Error => write!(f, "error"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Info => write!(f, "info"),
        }
    }
}

/// Alert as handed to an alert sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub dedupe_key: String,
    pub severity: AlertSeverity,
    pub source: String,
    pub title: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        dedupe_key: impl Into<String>,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            dedupe_key: dedupe_key.into(),
            severity,
            source: "recovery".to_string(),
            title: title.into(),
            message: message.into(),
            raised_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Alert for a session that disappeared across a reboot
    pub fn session_killed(session_name: &str, boot_id: &str) -> Self {
        Self::new(
            session_killed_key(session_name),
            AlertSeverity::Error,
            format!("Session {} was lost", session_name),
            format!(
                "tmux session '{}' did not survive the reboot (boot {}); a snapshot is available for restore",
                session_name, boot_id
            ),
        )
    }

    /// Alert for a restore job that failed
    pub fn restore_failed(session_name: &str, job_id: i64, error: &str) -> Self {
        Self::new(
            restore_failed_key(session_name),
            AlertSeverity::Error,
            format!("Restore of {} failed", session_name),
            format!("restore job {} failed: {}", job_id, error),
        )
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

pub fn session_killed_key(session_name: &str) -> String {
    format!("recovery:session:{}:killed", session_name)
}

pub fn restore_failed_key(session_name: &str) -> String {
    format!("recovery:session:{}:restore-failed", session_name)
}
