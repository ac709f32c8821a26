// Lazarus Configuration
//
// Runtime knobs shared by the collector, the restore orchestrator and the
// tmux integration. Every field has a default so partial configs load.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::recovery::ReplayMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Seconds between collector cycles
    pub collect_interval_secs: u64,

    /// Snapshot rows retained per session
    pub max_snapshots_per_session: usize,

    /// Upper bound for one restore job
    pub restore_timeout_secs: u64,

    /// Minimum time left for a job's terminal bookkeeping writes
    pub finalize_grace_secs: u64,

    /// Replay mode for automatic restores after a reboot; `None` disables them
    pub boot_restore_mode: Option<ReplayMode>,

    /// Lines of pane content kept as a preview, 0 disables capture
    pub capture_lines: u32,

    /// tmux executable
    pub tmux_binary: String,

    /// Timeout for a single tmux invocation
    pub tmux_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            collect_interval_secs: 30,
            max_snapshots_per_session: 50,
            restore_timeout_secs: 300,
            finalize_grace_secs: 10,
            boot_restore_mode: None,
            capture_lines: 20,
            tmux_binary: "tmux".to_string(),
            tmux_timeout_secs: 10,
        }
    }
}

impl RecoveryConfig {
    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs.max(1))
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_secs.max(1))
    }

    pub fn finalize_grace(&self) -> Duration {
        Duration::from_secs(self.finalize_grace_secs)
    }

    pub fn tmux_timeout(&self) -> Duration {
        Duration::from_secs(self.tmux_timeout_secs.max(1))
    }
}
