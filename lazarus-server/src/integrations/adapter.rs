// Lazarus Integration Layer - tmux Capability Traits
//
// The collector and the restore orchestrator only see tmux through these
// narrow traits. `TmuxCli` implements them against the real binary and
// `MockTmux` implements them in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lazarus_utils::layout::SplitDirection;

use super::error::TmuxResult;

/// A live session as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSession {
    pub name: String,
    pub attached: i32,
    pub window_count: i32,
}

/// A live window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveWindow {
    pub index: i32,
    pub name: String,
    pub active: bool,
    pub pane_count: i32,
    pub layout: String,
}

/// A live pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivePane {
    pub window_index: i32,
    pub pane_index: i32,
    /// Server-wide pane identifier such as `%3`
    pub pane_id: String,
    pub active: bool,
    pub current_path: String,
    pub start_command: String,
    pub current_command: String,
    pub title: String,
}

/// Window created by `new_session` or `new_window`, with its first pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub index: i32,
    pub pane_id: String,
}

/// Read-only topology queries.
#[async_trait]
pub trait TmuxQuery: Send + Sync {
    /// List live sessions. Fails with `TmuxError::NoServer` when nothing runs.
    async fn list_sessions(&self) -> TmuxResult<Vec<LiveSession>>;

    async fn list_windows(&self, session: &str) -> TmuxResult<Vec<LiveWindow>>;

    /// All panes of all windows in the session.
    async fn list_panes(&self, session: &str) -> TmuxResult<Vec<LivePane>>;

    async fn has_session(&self, session: &str) -> TmuxResult<bool>;

    /// Last `lines` lines of visible pane content.
    async fn capture_pane(&self, pane_id: &str, lines: u32) -> TmuxResult<String>;
}

/// Structural changes.
#[async_trait]
pub trait TmuxControl: Send + Sync {
    /// Create a detached session whose first pane starts in `start_dir`.
    async fn new_session(&self, name: &str, start_dir: &str) -> TmuxResult<WindowHandle>;

    /// Create a window at `index` (next free index when `None`).
    async fn new_window(
        &self,
        session: &str,
        index: Option<i32>,
        name: &str,
        start_dir: &str,
    ) -> TmuxResult<WindowHandle>;

    /// Split `pane_id` and return the new pane's identifier.
    async fn split_pane(
        &self,
        pane_id: &str,
        direction: SplitDirection,
        start_dir: &str,
    ) -> TmuxResult<String>;

    async fn rename_window(&self, session: &str, index: i32, name: &str) -> TmuxResult<()>;

    async fn kill_session(&self, session: &str) -> TmuxResult<()>;
}

/// Selection and keyboard input.
#[async_trait]
pub trait TmuxInput: Send + Sync {
    async fn select_layout(&self, session: &str, window: i32, layout: &str) -> TmuxResult<()>;

    async fn select_window(&self, session: &str, window: i32) -> TmuxResult<()>;

    async fn select_pane(&self, pane_id: &str) -> TmuxResult<()>;

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> TmuxResult<()>;

    /// Type `text` into the pane literally, followed by Enter.
    async fn send_line(&self, pane_id: &str, text: &str) -> TmuxResult<()>;
}

/// Everything the recovery core needs from tmux.
pub trait TmuxClient: TmuxQuery + TmuxControl + TmuxInput {}

impl<T: TmuxQuery + TmuxControl + TmuxInput> TmuxClient for T {}

/// Configuration for the tmux CLI adapter
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// tmux executable
    pub binary: String,

    /// Timeout for one-shot calls in seconds
    pub call_timeout_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            call_timeout_secs: 10,
        }
    }
}

impl AdapterConfig {
    pub fn from_recovery_config(config: &lazarus_utils::config::RecoveryConfig) -> Self {
        Self {
            binary: config.tmux_binary.clone(),
            call_timeout_secs: config.tmux_timeout().as_secs(),
        }
    }
}
