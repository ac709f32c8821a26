// Lazarus Integration Layer - Mock tmux
//
// In-memory tmux server implementing the capability traits for unit tests.
// It keeps real session/window/pane structure (new panes are inserted after
// the pane they split, like tmux) and records every mutating call so tests
// can assert on splits, keystrokes and selections.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use lazarus_utils::layout::SplitDirection;

use super::adapter::{
    LivePane, LiveSession, LiveWindow, TmuxControl, TmuxInput, TmuxQuery, WindowHandle,
};
use super::error::{TmuxError, TmuxResult};

/// A mutating call observed by the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    NewSession {
        name: String,
        start_dir: String,
    },
    NewWindow {
        session: String,
        index: i32,
        name: String,
        start_dir: String,
    },
    Split {
        target: String,
        direction: SplitDirection,
        start_dir: String,
        new_pane: String,
    },
    RenameWindow {
        session: String,
        index: i32,
        name: String,
    },
    KillSession(String),
    SelectLayout {
        session: String,
        window: i32,
        layout: String,
    },
    SelectWindow {
        session: String,
        window: i32,
    },
    SelectPane(String),
    SetPaneTitle {
        pane_id: String,
        title: String,
    },
    SendLine {
        pane_id: String,
        text: String,
    },
}

#[derive(Debug, Clone)]
struct MockPane {
    id: String,
    title: String,
    current_path: String,
    start_command: String,
    current_command: String,
    content: String,
}

#[derive(Debug, Clone)]
struct MockWindow {
    index: i32,
    name: String,
    layout: Option<String>,
    panes: Vec<MockPane>,
    active_pane: usize,
}

#[derive(Debug, Clone)]
struct MockSession {
    name: String,
    attached: i32,
    windows: Vec<MockWindow>,
    active_window: i32,
}

#[derive(Debug, Default)]
struct MockState {
    sessions: Vec<MockSession>,
    next_pane: u32,
    no_server: bool,
    calls: Vec<MockCall>,
    failures: HashMap<String, TmuxError>,
    stalled: HashSet<String>,
}

impl MockState {
    fn fail_if_configured(&self, operation: &str) -> TmuxResult<()> {
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn alloc_pane(&mut self, start_dir: &str) -> MockPane {
        let id = format!("%{}", self.next_pane);
        self.next_pane += 1;
        MockPane {
            id,
            title: String::new(),
            current_path: start_dir.to_string(),
            start_command: String::new(),
            current_command: "zsh".to_string(),
            content: String::new(),
        }
    }

    fn session(&self, name: &str) -> TmuxResult<&MockSession> {
        if self.no_server {
            return Err(TmuxError::NoServer);
        }
        self.sessions
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| TmuxError::SessionNotFound(name.to_string()))
    }

    fn session_mut(&mut self, name: &str) -> TmuxResult<&mut MockSession> {
        if self.no_server {
            return Err(TmuxError::NoServer);
        }
        self.sessions
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| TmuxError::SessionNotFound(name.to_string()))
    }

    fn window_mut(&mut self, session: &str, index: i32) -> TmuxResult<&mut MockWindow> {
        self.session_mut(session)?
            .windows
            .iter_mut()
            .find(|w| w.index == index)
            .ok_or_else(|| TmuxError::ProcessExited {
                code: 1,
                stderr: format!("can't find window: {}", index),
            })
    }

    /// (session position, window position, pane position) of a pane id.
    fn locate_pane(&self, pane_id: &str) -> TmuxResult<(usize, usize, usize)> {
        for (si, session) in self.sessions.iter().enumerate() {
            for (wi, window) in session.windows.iter().enumerate() {
                if let Some(pi) = window.panes.iter().position(|p| p.id == pane_id) {
                    return Ok((si, wi, pi));
                }
            }
        }
        Err(TmuxError::PaneNotFound(pane_id.to_string()))
    }

    fn pane_mut(&mut self, pane_id: &str) -> TmuxResult<&mut MockPane> {
        let (si, wi, pi) = self.locate_pane(pane_id)?;
        Ok(&mut self.sessions[si].windows[wi].panes[pi])
    }
}

/// Synthetic layout string for windows that never had one applied.
fn synthetic_layout(window: &MockWindow) -> String {
    let numbers: Vec<String> = window
        .panes
        .iter()
        .map(|p| p.id.trim_start_matches('%').to_string())
        .collect();
    if numbers.len() == 1 {
        return format!("0000,80x24,0,0,{}", numbers[0]);
    }
    let cells: Vec<String> = numbers
        .iter()
        .enumerate()
        .map(|(i, n)| format!("10x24,{},0,{}", i * 11, n))
        .collect();
    format!("0000,80x24,0,0{{{}}}", cells.join(","))
}

/// Mock tmux server for testing the collector and restore paths.
#[derive(Debug, Default)]
pub struct MockTmux {
    state: Mutex<MockState>,
}

impl MockTmux {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a one-window, one-pane session running `command` in `path`.
    /// Returns the pane id.
    pub fn spawn_session(&self, name: &str, path: &str, command: &str) -> String {
        let mut state = self.state();
        let mut pane = state.alloc_pane(path);
        pane.current_command = command.to_string();
        let id = pane.id.clone();
        state.sessions.push(MockSession {
            name: name.to_string(),
            attached: 0,
            windows: vec![MockWindow {
                index: 0,
                name: command.to_string(),
                layout: None,
                panes: vec![pane],
                active_pane: 0,
            }],
            active_window: 0,
        });
        id
    }

    /// Change what a pane reports as its directory and running command.
    pub fn set_pane_state(&self, pane_id: &str, path: &str, command: &str) {
        let mut state = self.state();
        if let Ok(pane) = state.pane_mut(pane_id) {
            pane.current_path = path.to_string();
            pane.current_command = command.to_string();
        }
    }

    /// Set the visible content returned by `capture_pane`.
    pub fn set_pane_content(&self, pane_id: &str, content: &str) {
        let mut state = self.state();
        if let Ok(pane) = state.pane_mut(pane_id) {
            pane.content = content.to_string();
        }
    }

    /// Drop every session, as a reboot would.
    pub fn reboot(&self) {
        self.state().sessions.clear();
    }

    /// Simulate the tmux server not running at all.
    pub fn set_no_server(&self, no_server: bool) {
        self.state().no_server = no_server;
    }

    /// Make `operation` (trait method name) fail with `error` until cleared.
    pub fn fail_operation(&self, operation: &str, error: TmuxError) {
        self.state().failures.insert(operation.to_string(), error);
    }

    /// Make `operation` never complete, like a wedged tmux server.
    pub fn stall_operation(&self, operation: &str) {
        self.state().stalled.insert(operation.to_string());
    }

    async fn stall_if_configured(&self, operation: &str) {
        let stalled = self.state().stalled.contains(operation);
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.stalled.clear();
    }

    /// Every mutating call so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Text sent to panes via `send_line`, as (pane id, text).
    pub fn sent_lines(&self) -> Vec<(String, String)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::SendLine { pane_id, text } => Some((pane_id.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.state().sessions.iter().map(|s| s.name.clone()).collect()
    }

    /// Pane ids of a window in pane-index order.
    pub fn pane_ids(&self, session: &str, window: i32) -> Vec<String> {
        let state = self.state();
        state
            .session(session)
            .ok()
            .and_then(|s| s.windows.iter().find(|w| w.index == window))
            .map(|w| w.panes.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl TmuxQuery for MockTmux {
    async fn list_sessions(&self) -> TmuxResult<Vec<LiveSession>> {
        let state = self.state();
        state.fail_if_configured("list_sessions")?;
        if state.no_server {
            return Err(TmuxError::NoServer);
        }
        Ok(state
            .sessions
            .iter()
            .map(|s| LiveSession {
                name: s.name.clone(),
                attached: s.attached,
                window_count: s.windows.len() as i32,
            })
            .collect())
    }

    async fn list_windows(&self, session: &str) -> TmuxResult<Vec<LiveWindow>> {
        let state = self.state();
        state.fail_if_configured("list_windows")?;
        let session = state.session(session)?;
        Ok(session
            .windows
            .iter()
            .map(|w| LiveWindow {
                index: w.index,
                name: w.name.clone(),
                active: w.index == session.active_window,
                pane_count: w.panes.len() as i32,
                layout: w.layout.clone().unwrap_or_else(|| synthetic_layout(w)),
            })
            .collect())
    }

    async fn list_panes(&self, session: &str) -> TmuxResult<Vec<LivePane>> {
        let state = self.state();
        state.fail_if_configured("list_panes")?;
        let session = state.session(session)?;
        let mut panes = Vec::new();
        for window in &session.windows {
            for (i, pane) in window.panes.iter().enumerate() {
                panes.push(LivePane {
                    window_index: window.index,
                    pane_index: i as i32,
                    pane_id: pane.id.clone(),
                    active: i == window.active_pane,
                    current_path: pane.current_path.clone(),
                    start_command: pane.start_command.clone(),
                    current_command: pane.current_command.clone(),
                    title: pane.title.clone(),
                });
            }
        }
        Ok(panes)
    }

    async fn has_session(&self, session: &str) -> TmuxResult<bool> {
        let state = self.state();
        state.fail_if_configured("has_session")?;
        if state.no_server {
            return Ok(false);
        }
        Ok(state.sessions.iter().any(|s| s.name == session))
    }

    async fn capture_pane(&self, pane_id: &str, _lines: u32) -> TmuxResult<String> {
        let state = self.state();
        state.fail_if_configured("capture_pane")?;
        let (si, wi, pi) = state.locate_pane(pane_id)?;
        Ok(state.sessions[si].windows[wi].panes[pi].content.clone())
    }
}

#[async_trait]
impl TmuxControl for MockTmux {
    async fn new_session(&self, name: &str, start_dir: &str) -> TmuxResult<WindowHandle> {
        self.stall_if_configured("new_session").await;
        let mut state = self.state();
        state.fail_if_configured("new_session")?;
        if state.sessions.iter().any(|s| s.name == name) {
            return Err(TmuxError::ProcessExited {
                code: 1,
                stderr: format!("duplicate session: {}", name),
            });
        }
        state.no_server = false;
        let pane = state.alloc_pane(start_dir);
        let pane_id = pane.id.clone();
        state.sessions.push(MockSession {
            name: name.to_string(),
            attached: 0,
            windows: vec![MockWindow {
                index: 0,
                name: String::new(),
                layout: None,
                panes: vec![pane],
                active_pane: 0,
            }],
            active_window: 0,
        });
        state.calls.push(MockCall::NewSession {
            name: name.to_string(),
            start_dir: start_dir.to_string(),
        });
        Ok(WindowHandle { index: 0, pane_id })
    }

    async fn new_window(
        &self,
        session: &str,
        index: Option<i32>,
        name: &str,
        start_dir: &str,
    ) -> TmuxResult<WindowHandle> {
        let mut state = self.state();
        state.fail_if_configured("new_window")?;
        let pane = state.alloc_pane(start_dir);
        let pane_id = pane.id.clone();
        let target = state.session_mut(session)?;
        let index = match index {
            Some(index) => {
                if target.windows.iter().any(|w| w.index == index) {
                    return Err(TmuxError::ProcessExited {
                        code: 1,
                        stderr: format!("index {} in use", index),
                    });
                }
                index
            }
            None => target.windows.iter().map(|w| w.index + 1).max().unwrap_or(0),
        };
        target.windows.push(MockWindow {
            index,
            name: name.to_string(),
            layout: None,
            panes: vec![pane],
            active_pane: 0,
        });
        target.windows.sort_by_key(|w| w.index);
        state.calls.push(MockCall::NewWindow {
            session: session.to_string(),
            index,
            name: name.to_string(),
            start_dir: start_dir.to_string(),
        });
        Ok(WindowHandle { index, pane_id })
    }

    async fn split_pane(
        &self,
        pane_id: &str,
        direction: SplitDirection,
        start_dir: &str,
    ) -> TmuxResult<String> {
        let mut state = self.state();
        state.fail_if_configured("split_pane")?;
        let (si, wi, pi) = state.locate_pane(pane_id)?;
        let pane = state.alloc_pane(start_dir);
        let new_pane = pane.id.clone();
        let window = &mut state.sessions[si].windows[wi];
        window.panes.insert(pi + 1, pane);
        window.layout = None;
        state.calls.push(MockCall::Split {
            target: pane_id.to_string(),
            direction,
            start_dir: start_dir.to_string(),
            new_pane: new_pane.clone(),
        });
        Ok(new_pane)
    }

    async fn rename_window(&self, session: &str, index: i32, name: &str) -> TmuxResult<()> {
        let mut state = self.state();
        state.fail_if_configured("rename_window")?;
        state.window_mut(session, index)?.name = name.to_string();
        state.calls.push(MockCall::RenameWindow {
            session: session.to_string(),
            index,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> TmuxResult<()> {
        let mut state = self.state();
        state.fail_if_configured("kill_session")?;
        state.session(session)?;
        state.sessions.retain(|s| s.name != session);
        state.calls.push(MockCall::KillSession(session.to_string()));
        Ok(())
    }
}

#[async_trait]
impl TmuxInput for MockTmux {
    async fn select_layout(&self, session: &str, window: i32, layout: &str) -> TmuxResult<()> {
        let mut state = self.state();
        state.fail_if_configured("select_layout")?;
        state.window_mut(session, window)?.layout = Some(layout.to_string());
        state.calls.push(MockCall::SelectLayout {
            session: session.to_string(),
            window,
            layout: layout.to_string(),
        });
        Ok(())
    }

    async fn select_window(&self, session: &str, window: i32) -> TmuxResult<()> {
        let mut state = self.state();
        state.fail_if_configured("select_window")?;
        state.window_mut(session, window)?;
        state.session_mut(session)?.active_window = window;
        state.calls.push(MockCall::SelectWindow {
            session: session.to_string(),
            window,
        });
        Ok(())
    }

    async fn select_pane(&self, pane_id: &str) -> TmuxResult<()> {
        let mut state = self.state();
        state.fail_if_configured("select_pane")?;
        let (si, wi, pi) = state.locate_pane(pane_id)?;
        state.sessions[si].windows[wi].active_pane = pi;
        state.calls.push(MockCall::SelectPane(pane_id.to_string()));
        Ok(())
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> TmuxResult<()> {
        let mut state = self.state();
        state.fail_if_configured("set_pane_title")?;
        state.pane_mut(pane_id)?.title = title.to_string();
        state.calls.push(MockCall::SetPaneTitle {
            pane_id: pane_id.to_string(),
            title: title.to_string(),
        });
        Ok(())
    }

    async fn send_line(&self, pane_id: &str, text: &str) -> TmuxResult<()> {
        self.stall_if_configured("send_line").await;
        let mut state = self.state();
        state.fail_if_configured("send_line")?;
        state.pane_mut(pane_id)?;
        state.calls.push(MockCall::SendLine {
            pane_id: pane_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
