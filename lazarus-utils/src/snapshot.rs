// Lazarus Snapshot Model
//
// Point-in-time capture of one tmux session's structure, plus the canonical
// content hash that decides whether a capture is worth persisting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the hex token returned by [`SessionSnapshot::state_hash`].
pub const STATE_HASH_LEN: usize = 16;

/// Captured structure of a single session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_name: String,
    pub captured_at: DateTime<Utc>,
    pub boot_id: String,
    pub attached: i32,
    /// Index of the active window, -1 when unknown
    pub active_window: i32,
    pub active_pane_id: String,
    pub windows: Vec<WindowSnapshot>,
    pub panes: Vec<PaneSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub index: i32,
    pub name: String,
    pub active: bool,
    pub pane_count: i32,
    /// Raw tmux layout descriptor, replayed verbatim on restore
    pub layout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneSnapshot {
    pub window_index: i32,
    pub pane_index: i32,
    pub title: String,
    pub active: bool,
    pub current_path: String,
    pub start_command: String,
    pub current_command: String,
    /// Tail of the visible pane content; never part of the hash
    #[serde(default)]
    pub last_content: String,
}

#[derive(Serialize)]
struct CanonicalSession<'a> {
    session_name: &'a str,
    attached: i32,
    active_window: i32,
    active_pane_id: &'a str,
    windows: Vec<CanonicalWindow<'a>>,
    panes: Vec<CanonicalPane<'a>>,
}

#[derive(Serialize)]
struct CanonicalWindow<'a> {
    index: i32,
    name: &'a str,
    pane_count: i32,
    layout: &'a str,
}

#[derive(Serialize)]
struct CanonicalPane<'a> {
    window_index: i32,
    pane_index: i32,
    title: &'a str,
    current_path: &'a str,
    start_command: &'a str,
    current_command: &'a str,
}

impl SessionSnapshot {
    /// Windows ordered by index.
    pub fn sorted_windows(&self) -> Vec<&WindowSnapshot> {
        let mut windows: Vec<&WindowSnapshot> = self.windows.iter().collect();
        windows.sort_by_key(|w| w.index);
        windows
    }

    /// Panes ordered by (window index, pane index).
    pub fn sorted_panes(&self) -> Vec<&PaneSnapshot> {
        let mut panes: Vec<&PaneSnapshot> = self.panes.iter().collect();
        panes.sort_by_key(|p| (p.window_index, p.pane_index));
        panes
    }

    /// Panes of one window ordered by pane index.
    pub fn panes_in_window(&self, window_index: i32) -> Vec<&PaneSnapshot> {
        let mut panes: Vec<&PaneSnapshot> = self
            .panes
            .iter()
            .filter(|p| p.window_index == window_index)
            .collect();
        panes.sort_by_key(|p| p.pane_index);
        panes
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    /// Content token over the fields that shape the restored session.
    ///
    /// Capture time, boot id, active flags of individual windows/panes and
    /// the content preview are left out, so two captures of an unchanged
    /// session always agree.
    pub fn state_hash(&self) -> String {
        let canonical = CanonicalSession {
            session_name: &self.session_name,
            attached: self.attached,
            active_window: self.active_window,
            active_pane_id: &self.active_pane_id,
            windows: self
                .sorted_windows()
                .into_iter()
                .map(|w| CanonicalWindow {
                    index: w.index,
                    name: &w.name,
                    pane_count: w.pane_count,
                    layout: &w.layout,
                })
                .collect(),
            panes: self
                .sorted_panes()
                .into_iter()
                .map(|p| CanonicalPane {
                    window_index: p.window_index,
                    pane_index: p.pane_index,
                    title: &p.title,
                    current_path: &p.current_path,
                    start_command: &p.start_command,
                    current_command: &p.current_command,
                })
                .collect(),
        };

        // Serializing plain structs of strings and integers cannot fail.
        let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        let mut token = hex::encode(digest);
        token.truncate(STATE_HASH_LEN);
        token
    }
}
