// Session replay
//
// Rebuilds a snapshot inside a fresh tmux session: windows in index order,
// panes recreated by walking the parsed layout tree (or by plain sequential
// splits when the layout is unusable), then pane state replayed at the
// requested fidelity.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

use lazarus_utils::layout::{self, LayoutNode, SplitDirection};
use lazarus_utils::recovery::ReplayMode;
use lazarus_utils::snapshot::{PaneSnapshot, SessionSnapshot, WindowSnapshot};

use crate::error::{RecoveryError, RecoveryResult};
use crate::integrations::{TmuxClient, TmuxControl, TmuxInput};

/// Interactive shells; a pane whose command is one of these has nothing to re-run.
const SHELLS: &[&str] = &[
    "bash", "zsh", "fish", "sh", "dash", "ksh", "tcsh", "csh", "nu",
];

/// Receives one call per completed restore step.
#[async_trait]
pub trait RestoreProgress: Send + Sync {
    async fn step(&self, label: &str) -> RecoveryResult<()>;
}

/// Recreate `snapshot` as session `target`.
pub async fn restore_session(
    tmux: &dyn TmuxClient,
    snapshot: &SessionSnapshot,
    target: &str,
    mode: ReplayMode,
    progress: &dyn RestoreProgress,
) -> RecoveryResult<()> {
    let windows = snapshot.sorted_windows();
    if windows.is_empty() {
        return Err(RecoveryError::EmptySnapshot);
    }

    let seed_dir = snapshot
        .sorted_panes()
        .first()
        .map(|p| p.current_path.clone())
        .unwrap_or_default();
    let first_handle = tmux.new_session(target, &seed_dir).await?;
    progress.step("create session").await?;

    let mut actual_index: HashMap<i32, i32> = HashMap::new();
    let mut used: HashSet<i32> = HashSet::new();

    for (position, window) in windows.iter().enumerate() {
        let panes = snapshot.panes_in_window(window.index);
        let window_dir = panes
            .first()
            .map(|p| p.current_path.as_str())
            .unwrap_or(seed_dir.as_str());

        let handle = if position == 0 {
            if !window.name.is_empty() {
                tmux.rename_window(target, first_handle.index, &window.name)
                    .await?;
            }
            first_handle.clone()
        } else {
            let index = (!used.contains(&window.index)).then_some(window.index);
            tmux.new_window(target, index, &window.name, window_dir)
                .await?
        };
        used.insert(handle.index);
        actual_index.insert(window.index, handle.index);
        progress.step(&format!("window {}", window.index)).await?;

        let pane_ids = build_panes(tmux, window, &panes, &handle.pane_id).await?;
        if !window.layout.is_empty() {
            if let Err(e) = tmux.select_layout(target, handle.index, &window.layout).await {
                warn!(
                    "Lazarus: layout hint for {}:{} not applied: {}",
                    target, handle.index, e
                );
            }
        }
        progress.step(&format!("layout {}", window.index)).await?;

        for (pane, pane_id) in panes.iter().zip(pane_ids.iter()) {
            replay_pane(tmux, pane, pane_id, mode).await?;
            progress
                .step(&format!("pane {}.{}", window.index, pane.pane_index))
                .await?;
        }
        if let Some(active) = panes.iter().position(|p| p.active) {
            if let Some(pane_id) = pane_ids.get(active) {
                tmux.select_pane(pane_id).await?;
            }
        }
    }

    if let Some(index) = active_window(snapshot, &windows).and_then(|i| actual_index.get(&i)) {
        tmux.select_window(target, *index).await?;
    }
    Ok(())
}

/// Create the panes of one window; returns pane ids in pane-index order.
async fn build_panes(
    tmux: &dyn TmuxClient,
    window: &WindowSnapshot,
    panes: &[&PaneSnapshot],
    first_pane: &str,
) -> RecoveryResult<Vec<String>> {
    let wanted = panes.len().max(1);
    let recorded = usize::try_from(window.pane_count).unwrap_or(0);
    let dirs: Vec<&str> = panes.iter().map(|p| p.current_path.as_str()).collect();

    match layout::parse(&window.layout) {
        Some(tree) if recorded == panes.len() && tree.leaf_count() == recorded => {
            debug!(
                "Lazarus: window {} restored from layout tree ({} panes)",
                window.index, wanted
            );
            split_by_layout(tmux, &tree, first_pane, &dirs).await
        }
        _ => {
            if recorded != panes.len() {
                warn!(
                    "Lazarus: window {} records {} panes but {} were captured",
                    window.index,
                    window.pane_count,
                    panes.len()
                );
            }
            split_sequentially(tmux, first_pane, &dirs, wanted).await
        }
    }
}

/// Walk `tree` depth first, splitting existing panes to match each split cell.
///
/// A cell with n children splits its pane n-1 times, each split targeting the
/// pane created by the previous one, so the new panes line up left to right
/// (or top to bottom). tmux inserts a split pane right after its target,
/// which keeps the final pane order equal to the tree's leaf order.
async fn split_by_layout(
    tmux: &dyn TmuxClient,
    tree: &LayoutNode,
    first_pane: &str,
    dirs: &[&str],
) -> RecoveryResult<Vec<String>> {
    let mut leaves: Vec<Option<String>> = vec![None; tree.leaf_count()];
    let mut stack: Vec<(&LayoutNode, String, usize)> = vec![(tree, first_pane.to_string(), 0)];

    while let Some((node, pane_id, offset)) = stack.pop() {
        let direction = match node.split.direction() {
            Some(direction) if !node.children.is_empty() => direction,
            _ => {
                if let Some(slot) = leaves.get_mut(offset) {
                    *slot = Some(pane_id);
                }
                continue;
            }
        };

        let mut assigned = Vec::with_capacity(node.children.len());
        let mut child_offset = offset;
        let mut previous = pane_id;
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                let dir = dirs.get(child_offset).copied().unwrap_or_default();
                previous = tmux.split_pane(&previous, direction, dir).await?;
            }
            assigned.push((child, previous.clone(), child_offset));
            child_offset += child.leaf_count();
        }
        // Reverse so children pop in left-to-right order
        stack.extend(assigned.into_iter().rev());
    }

    Ok(leaves.into_iter().flatten().collect())
}

/// Split the newest pane, alternating direction, until `wanted` panes exist.
async fn split_sequentially(
    tmux: &dyn TmuxClient,
    first_pane: &str,
    dirs: &[&str],
    wanted: usize,
) -> RecoveryResult<Vec<String>> {
    let mut pane_ids = vec![first_pane.to_string()];
    while pane_ids.len() < wanted {
        let position = pane_ids.len();
        let direction = if position % 2 == 1 {
            SplitDirection::Horizontal
        } else {
            SplitDirection::Vertical
        };
        let dir = dirs.get(position).copied().unwrap_or_default();
        let last = pane_ids[position - 1].clone();
        pane_ids.push(tmux.split_pane(&last, direction, dir).await?);
    }
    Ok(pane_ids)
}

async fn replay_pane(
    tmux: &dyn TmuxClient,
    pane: &PaneSnapshot,
    pane_id: &str,
    mode: ReplayMode,
) -> RecoveryResult<()> {
    if !pane.title.is_empty() {
        tmux.set_pane_title(pane_id, &pane.title).await?;
    }
    if mode.changes_directory() && !pane.current_path.is_empty() {
        tmux.send_line(pane_id, &format!("cd {}", shell_quote(&pane.current_path)))
            .await?;
    }
    if mode.runs_commands() {
        if let Some(command) = replay_command(pane) {
            tmux.send_line(pane_id, command).await?;
        }
    }
    Ok(())
}

fn active_window(snapshot: &SessionSnapshot, windows: &[&WindowSnapshot]) -> Option<i32> {
    if snapshot.active_window >= 0 {
        return Some(snapshot.active_window);
    }
    windows.iter().find(|w| w.active).map(|w| w.index)
}

/// Command worth re-running in a pane: the foreground command unless it is
/// just the shell, else the command the pane was started with.
pub fn replay_command(pane: &PaneSnapshot) -> Option<&str> {
    [pane.current_command.as_str(), pane.start_command.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|command| !command.is_empty() && !is_shell(command))
}

fn is_shell(command: &str) -> bool {
    let program = command.split_whitespace().next().unwrap_or_default();
    let name = program.rsplit('/').next().unwrap_or(program);
    SHELLS.contains(&name.trim_start_matches('-'))
}

/// Quote `value` for a POSIX shell when it holds anything beyond a safe set.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{MockCall, MockTmux, TmuxQuery};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProgress {
        steps: AtomicUsize,
    }

    #[async_trait]
    impl RestoreProgress for CountingProgress {
        async fn step(&self, _label: &str) -> RecoveryResult<()> {
            self.steps.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pane(window: i32, index: i32, path: &str, command: &str) -> PaneSnapshot {
        PaneSnapshot {
            window_index: window,
            pane_index: index,
            title: String::new(),
            active: index == 0,
            current_path: path.to_string(),
            start_command: String::new(),
            current_command: command.to_string(),
            last_content: String::new(),
        }
    }

    fn snapshot(windows: Vec<WindowSnapshot>, panes: Vec<PaneSnapshot>) -> SessionSnapshot {
        SessionSnapshot {
            session_name: "dev".to_string(),
            captured_at: Utc::now(),
            boot_id: "boot".to_string(),
            attached: 0,
            active_window: 0,
            active_pane_id: "%0".to_string(),
            windows,
            panes,
        }
    }

    fn window(index: i32, name: &str, pane_count: i32, layout: &str) -> WindowSnapshot {
        WindowSnapshot {
            index,
            name: name.to_string(),
            active: index == 0,
            pane_count,
            layout: layout.to_string(),
        }
    }

    fn splits(mock: &MockTmux) -> Vec<(String, SplitDirection, String)> {
        mock.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Split {
                    target,
                    direction,
                    start_dir,
                    ..
                } => Some((target, direction, start_dir)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/dev"), "/tmp/dev");
        assert_eq!(shell_quote("/tmp/my dir"), "'/tmp/my dir'");
        assert_eq!(shell_quote("/tmp/it's"), r"'/tmp/it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_replay_command_skips_shells() {
        let mut p = pane(0, 0, "/", "zsh");
        assert_eq!(replay_command(&p), None);

        p.start_command = "htop".to_string();
        assert_eq!(replay_command(&p), Some("htop"));

        p.current_command = "nvim".to_string();
        assert_eq!(replay_command(&p), Some("nvim"));

        p.current_command = "-bash".to_string();
        p.start_command = "/usr/bin/fish".to_string();
        assert_eq!(replay_command(&p), None);
    }

    #[tokio::test]
    async fn test_side_by_side_layout_splits_horizontally() {
        let mock = MockTmux::new();
        let progress = CountingProgress::default();
        let snap = snapshot(
            vec![window(0, "code", 2, "5e2f,80x24,0,0{40x24,0,0,1,39x24,41,0,2}")],
            vec![pane(0, 0, "/left", "zsh"), pane(0, 1, "/right", "zsh")],
        );

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &progress)
            .await
            .unwrap();

        let splits = splits(&mock);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].1, SplitDirection::Horizontal);
        assert_eq!(splits[0].2, "/right");

        let panes = mock.list_panes("dev").await.unwrap();
        let paths: Vec<&str> = panes.iter().map(|p| p.current_path.as_str()).collect();
        assert_eq!(paths, vec!["/left", "/right"]);
        assert_eq!(progress.steps.load(Ordering::SeqCst), 1 + 2 + 2);
    }

    #[tokio::test]
    async fn test_nested_layout_preserves_pane_order() {
        // Left column, right column stacked in two rows
        let layout = "aaaa,80x24,0,0{40x24,0,0,1,39x24,41,0[39x12,41,0,2,39x11,41,13,3]}";
        let mock = MockTmux::new();
        let snap = snapshot(
            vec![window(0, "", 3, layout)],
            vec![
                pane(0, 0, "/a", "zsh"),
                pane(0, 1, "/b", "zsh"),
                pane(0, 2, "/c", "zsh"),
            ],
        );

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap();

        let directions: Vec<SplitDirection> = splits(&mock).into_iter().map(|s| s.1).collect();
        assert_eq!(
            directions,
            vec![SplitDirection::Horizontal, SplitDirection::Vertical]
        );
        let panes = mock.list_panes("dev").await.unwrap();
        let paths: Vec<&str> = panes.iter().map(|p| p.current_path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn test_inconsistent_pane_count_ignores_layout() {
        // Stacked layout with two cells, but the window claims three panes
        let mock = MockTmux::new();
        let snap = snapshot(
            vec![window(0, "", 3, "a1b2,80x24,0,0[80x12,0,0,1,80x11,0,13,2]")],
            vec![pane(0, 0, "/a", "zsh"), pane(0, 1, "/b", "zsh")],
        );

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap();

        let directions: Vec<SplitDirection> = splits(&mock).into_iter().map(|s| s.1).collect();
        assert_eq!(directions, vec![SplitDirection::Horizontal]);
        assert_eq!(mock.list_panes("dev").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_consistent_stacked_layout_splits_vertically() {
        let mock = MockTmux::new();
        let snap = snapshot(
            vec![window(0, "", 2, "a1b2,80x24,0,0[80x12,0,0,1,80x11,0,13,2]")],
            vec![pane(0, 0, "/a", "zsh"), pane(0, 1, "/b", "zsh")],
        );

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap();

        let directions: Vec<SplitDirection> = splits(&mock).into_iter().map(|s| s.1).collect();
        assert_eq!(directions, vec![SplitDirection::Vertical]);
    }

    #[tokio::test]
    async fn test_mismatched_layout_falls_back_to_sequential() {
        let mock = MockTmux::new();
        let snap = snapshot(
            vec![window(0, "", 3, "garbage")],
            vec![
                pane(0, 0, "/a", "zsh"),
                pane(0, 1, "/b", "zsh"),
                pane(0, 2, "/c", "zsh"),
            ],
        );

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap();

        let directions: Vec<SplitDirection> = splits(&mock).into_iter().map(|s| s.1).collect();
        assert_eq!(
            directions,
            vec![SplitDirection::Horizontal, SplitDirection::Vertical]
        );
        assert_eq!(mock.list_panes("dev").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_windows_keep_indices_and_names() {
        let mock = MockTmux::new();
        let mut snap = snapshot(
            vec![window(1, "editor", 1, ""), window(3, "logs", 1, "")],
            vec![pane(1, 0, "/src", "nvim"), pane(3, 0, "/var/log", "tail")],
        );
        snap.active_window = 3;

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap();

        let windows = mock.list_windows("dev").await.unwrap();
        let names: Vec<(i32, &str)> = windows.iter().map(|w| (w.index, w.name.as_str())).collect();
        assert_eq!(names, vec![(0, "editor"), (3, "logs")]);
        assert!(windows.iter().any(|w| w.index == 3 && w.active));
    }

    #[tokio::test]
    async fn test_layout_hint_failure_is_not_fatal() {
        let mock = MockTmux::new();
        mock.fail_operation(
            "select_layout",
            crate::integrations::TmuxError::ProcessExited {
                code: 1,
                stderr: "invalid layout".to_string(),
            },
        );
        let snap = snapshot(
            vec![window(0, "", 1, "b25d,80x24,0,0,0")],
            vec![pane(0, 0, "/a", "zsh")],
        );

        restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap();
        assert!(mock.session_names().contains(&"dev".to_string()));
    }

    #[tokio::test]
    async fn test_empty_snapshot_rejected() {
        let mock = MockTmux::new();
        let snap = snapshot(Vec::new(), Vec::new());
        let err = restore_session(&mock, &snap, "dev", ReplayMode::Safe, &CountingProgress::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::EmptySnapshot));
        assert!(mock.session_names().is_empty());
    }
}
