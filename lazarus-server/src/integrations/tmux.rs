// Lazarus Integration Layer - tmux CLI Adapter
//
// Implements the tmux capability traits by shelling out to the tmux binary
// through `CommandRunner`. Listing commands use tab-separated `-F` formats;
// free-text fields (names, titles) go last so embedded tabs survive.

use async_trait::async_trait;

use lazarus_utils::layout::SplitDirection;

use super::adapter::{
    AdapterConfig, LivePane, LiveSession, LiveWindow, TmuxControl, TmuxInput, TmuxQuery,
    WindowHandle,
};
use super::error::{TmuxError, TmuxResult};
use super::subprocess::CommandRunner;

const SESSION_FORMAT: &str = "#{session_name}\t#{session_attached}\t#{session_windows}";
const WINDOW_FORMAT: &str =
    "#{window_index}\t#{window_active}\t#{window_panes}\t#{window_layout}\t#{window_name}";
const PANE_FORMAT: &str = "#{window_index}\t#{pane_index}\t#{pane_id}\t#{pane_active}\t#{pane_current_path}\t#{pane_current_command}\t#{pane_start_command}\t#{pane_title}";
const HANDLE_FORMAT: &str = "#{window_index}\t#{pane_id}";

/// tmux client backed by the tmux executable.
#[derive(Debug, Clone)]
pub struct TmuxCli {
    runner: CommandRunner,
}

impl TmuxCli {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            runner: CommandRunner::new(config),
        }
    }
}

/// Exact-match session target, so `dev` never resolves to `dev-old`.
fn session_target(session: &str) -> String {
    format!("={}", session)
}

fn window_target(session: &str, index: i32) -> String {
    format!("={}:{}", session, index)
}

fn parse_int(field: &str, what: &str) -> TmuxResult<i32> {
    field
        .trim()
        .parse()
        .map_err(|_| TmuxError::ParseError(format!("bad {} '{}'", what, field)))
}

fn parse_flag(field: &str) -> bool {
    field.trim() == "1"
}

fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().filter(|l| !l.trim().is_empty())
}

pub(crate) fn parse_sessions(output: &str) -> TmuxResult<Vec<LiveSession>> {
    lines(output)
        .map(|line| {
            let fields: Vec<&str> = line.splitn(3, '\t').collect();
            if fields.len() != 3 {
                return Err(TmuxError::ParseError(format!("session line '{}'", line)));
            }
            Ok(LiveSession {
                name: fields[0].to_string(),
                attached: parse_int(fields[1], "session_attached")?,
                window_count: parse_int(fields[2], "session_windows")?,
            })
        })
        .collect()
}

pub(crate) fn parse_windows(output: &str) -> TmuxResult<Vec<LiveWindow>> {
    lines(output)
        .map(|line| {
            let fields: Vec<&str> = line.splitn(5, '\t').collect();
            if fields.len() != 5 {
                return Err(TmuxError::ParseError(format!("window line '{}'", line)));
            }
            Ok(LiveWindow {
                index: parse_int(fields[0], "window_index")?,
                active: parse_flag(fields[1]),
                pane_count: parse_int(fields[2], "window_panes")?,
                layout: fields[3].to_string(),
                name: fields[4].to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_panes(output: &str) -> TmuxResult<Vec<LivePane>> {
    lines(output)
        .map(|line| {
            let fields: Vec<&str> = line.splitn(8, '\t').collect();
            if fields.len() != 8 {
                return Err(TmuxError::ParseError(format!("pane line '{}'", line)));
            }
            Ok(LivePane {
                window_index: parse_int(fields[0], "window_index")?,
                pane_index: parse_int(fields[1], "pane_index")?,
                pane_id: fields[2].to_string(),
                active: parse_flag(fields[3]),
                current_path: fields[4].to_string(),
                current_command: fields[5].to_string(),
                start_command: fields[6].to_string(),
                title: fields[7].to_string(),
            })
        })
        .collect()
}

pub(crate) fn parse_handle(output: &str) -> TmuxResult<WindowHandle> {
    let line = output.trim();
    let (index, pane_id) = line
        .split_once('\t')
        .ok_or_else(|| TmuxError::ParseError(format!("handle '{}'", line)))?;
    Ok(WindowHandle {
        index: parse_int(index, "window_index")?,
        pane_id: pane_id.trim().to_string(),
    })
}

/// Keep the last `lines` non-empty-tail lines of captured content.
pub(crate) fn tail_lines(content: &str, lines: u32) -> String {
    let trimmed = content.trim_end();
    let all: Vec<&str> = trimmed.lines().collect();
    let start = all.len().saturating_sub(lines as usize);
    all[start..].join("\n")
}

#[async_trait]
impl TmuxQuery for TmuxCli {
    async fn list_sessions(&self) -> TmuxResult<Vec<LiveSession>> {
        let output = self.runner.call(&["list-sessions", "-F", SESSION_FORMAT]).await?;
        parse_sessions(&output)
    }

    async fn list_windows(&self, session: &str) -> TmuxResult<Vec<LiveWindow>> {
        let target = session_target(session);
        let output = self
            .runner
            .call(&["list-windows", "-t", target.as_str(), "-F", WINDOW_FORMAT])
            .await?;
        parse_windows(&output)
    }

    async fn list_panes(&self, session: &str) -> TmuxResult<Vec<LivePane>> {
        let target = session_target(session);
        let output = self
            .runner
            .call(&["list-panes", "-s", "-t", target.as_str(), "-F", PANE_FORMAT])
            .await?;
        parse_panes(&output)
    }

    async fn has_session(&self, session: &str) -> TmuxResult<bool> {
        let target = session_target(session);
        match self.runner.call(&["has-session", "-t", target.as_str()]).await {
            Ok(_) => Ok(true),
            Err(TmuxError::NoServer) | Err(TmuxError::SessionNotFound(_)) => Ok(false),
            Err(TmuxError::ProcessExited { code: 1, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn capture_pane(&self, pane_id: &str, lines: u32) -> TmuxResult<String> {
        let start = format!("-{}", lines);
        let output = self
            .runner
            .call(&["capture-pane", "-p", "-J", "-t", pane_id, "-S", start.as_str()])
            .await?;
        Ok(tail_lines(&output, lines))
    }
}

#[async_trait]
impl TmuxControl for TmuxCli {
    async fn new_session(&self, name: &str, start_dir: &str) -> TmuxResult<WindowHandle> {
        let mut args = vec!["new-session", "-d", "-s", name, "-P", "-F", HANDLE_FORMAT];
        if !start_dir.is_empty() {
            args.extend(["-c", start_dir]);
        }
        let output = self.runner.call(&args).await?;
        parse_handle(&output)
    }

    async fn new_window(
        &self,
        session: &str,
        index: Option<i32>,
        name: &str,
        start_dir: &str,
    ) -> TmuxResult<WindowHandle> {
        let target = match index {
            Some(index) => window_target(session, index),
            None => format!("={}:", session),
        };
        let mut args = vec!["new-window", "-d", "-t", target.as_str(), "-P", "-F", HANDLE_FORMAT];
        if !name.is_empty() {
            args.extend(["-n", name]);
        }
        if !start_dir.is_empty() {
            args.extend(["-c", start_dir]);
        }
        let output = self.runner.call(&args).await?;
        parse_handle(&output)
    }

    async fn split_pane(
        &self,
        pane_id: &str,
        direction: SplitDirection,
        start_dir: &str,
    ) -> TmuxResult<String> {
        let mut args = vec![
            "split-window",
            "-d",
            direction.tmux_flag(),
            "-t",
            pane_id,
            "-P",
            "-F",
            "#{pane_id}",
        ];
        if !start_dir.is_empty() {
            args.extend(["-c", start_dir]);
        }
        let output = self.runner.call(&args).await?;
        let new_pane = output.trim();
        if new_pane.is_empty() {
            return Err(TmuxError::ParseError("split-window printed no pane id".to_string()));
        }
        Ok(new_pane.to_string())
    }

    async fn rename_window(&self, session: &str, index: i32, name: &str) -> TmuxResult<()> {
        let target = window_target(session, index);
        self.runner
            .call(&["rename-window", "-t", target.as_str(), name])
            .await
            .map(|_| ())
    }

    async fn kill_session(&self, session: &str) -> TmuxResult<()> {
        let target = session_target(session);
        self.runner
            .call(&["kill-session", "-t", target.as_str()])
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl TmuxInput for TmuxCli {
    async fn select_layout(&self, session: &str, window: i32, layout: &str) -> TmuxResult<()> {
        let target = window_target(session, window);
        self.runner
            .call(&["select-layout", "-t", target.as_str(), layout])
            .await
            .map(|_| ())
    }

    async fn select_window(&self, session: &str, window: i32) -> TmuxResult<()> {
        let target = window_target(session, window);
        self.runner
            .call(&["select-window", "-t", target.as_str()])
            .await
            .map(|_| ())
    }

    async fn select_pane(&self, pane_id: &str) -> TmuxResult<()> {
        self.runner
            .call(&["select-pane", "-t", pane_id])
            .await
            .map(|_| ())
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> TmuxResult<()> {
        self.runner
            .call(&["select-pane", "-t", pane_id, "-T", title])
            .await
            .map(|_| ())
    }

    async fn send_line(&self, pane_id: &str, text: &str) -> TmuxResult<()> {
        self.runner
            .call(&["send-keys", "-t", pane_id, "-l", "--", text])
            .await?;
        self.runner
            .call(&["send-keys", "-t", pane_id, "Enter"])
            .await
            .map(|_| ())
    }
}
