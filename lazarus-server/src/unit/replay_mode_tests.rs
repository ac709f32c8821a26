use lazarus_utils::recovery::{JobStatus, ReplayMode};

use super::fixture;
use crate::integrations::MockCall;

fn sent_text(lines: Vec<(String, String)>) -> Vec<String> {
    lines.into_iter().map(|(_, text)| text).collect()
}

fn selected_a_pane(calls: &[MockCall]) -> bool {
    calls.iter().any(|c| matches!(c, MockCall::SelectPane(_)))
}

#[tokio::test]
async fn test_safe_mode_sends_nothing() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.capture_then_reboot().await;

    let job = f.restore("dev", "safe", "rename").await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.mode, ReplayMode::Safe);
    assert!(f.mock.sent_lines().is_empty());
    assert!(selected_a_pane(&f.mock.calls()));
}

#[tokio::test]
async fn test_confirm_mode_only_changes_directory() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.capture_then_reboot().await;

    let job = f.restore("dev", "confirm", "rename").await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(sent_text(f.mock.sent_lines()), vec!["cd /tmp/dev"]);
    assert!(selected_a_pane(&f.mock.calls()));
}

#[tokio::test]
async fn test_full_mode_reruns_command() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.capture_then_reboot().await;

    let job = f.restore("dev", "full", "rename").await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(sent_text(f.mock.sent_lines()), vec!["cd /tmp/dev", "nvim"]);
    assert!(selected_a_pane(&f.mock.calls()));
}

#[tokio::test]
async fn test_full_mode_leaves_bare_shells_alone() {
    let f = fixture();
    f.mock.spawn_session("notes", "/home/me/My Notes", "zsh");
    f.capture_then_reboot().await;

    f.restore("notes", "full", "rename").await;

    assert_eq!(
        sent_text(f.mock.sent_lines()),
        vec!["cd '/home/me/My Notes'"]
    );
}

#[tokio::test]
async fn test_empty_mode_defaults_to_confirm() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.capture_then_reboot().await;

    let job = f.restore("dev", "", "").await;

    assert_eq!(job.mode, ReplayMode::Confirm);
    assert_eq!(sent_text(f.mock.sent_lines()), vec!["cd /tmp/dev"]);
}
