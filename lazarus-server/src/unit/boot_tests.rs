use lazarus_utils::alert::session_killed_key;
use lazarus_utils::config::RecoveryConfig;
use lazarus_utils::event::RecoveryEvent;
use lazarus_utils::recovery::{JobStatus, ReplayMode, SessionState};

use super::{fixture, fixture_with};
use crate::persistence::SessionRepo;

#[tokio::test]
async fn test_boot_change_marks_only_missing_sessions_killed() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.mock.spawn_session("ops", "/srv", "htop");
    f.service.collect().await.unwrap();

    f.mock.reboot();
    f.mock.spawn_session("ops", "/srv", "htop");
    f.boot.set("boot-2");
    let report = f.service.collect().await.unwrap();

    assert!(report.boot_changed);
    let killed: Vec<&str> = report.killed.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(killed, vec!["dev"]);

    let dev = f.store.get_session("dev").await.unwrap().unwrap();
    assert_eq!(dev.state, SessionState::Killed);
    assert!(dev.killed_at.is_some());
    assert_eq!(dev.boot_id, "boot-2");

    let ops = f.store.get_session("ops").await.unwrap().unwrap();
    assert_eq!(ops.state, SessionState::Running);

    let alert = f.alerts.get(&session_killed_key("dev")).unwrap();
    assert!(alert.is_open());
    assert!(f.alerts.get(&session_killed_key("ops")).is_none());
}

#[tokio::test]
async fn test_killed_alert_clears_when_session_returns() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();
    f.mock.reboot();
    f.boot.set("boot-2");
    f.service.collect().await.unwrap();
    assert!(f.alerts.get(&session_killed_key("dev")).unwrap().is_open());

    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();

    let dev = f.store.get_session("dev").await.unwrap().unwrap();
    assert_eq!(dev.state, SessionState::Running);
    assert!(!f.alerts.get(&session_killed_key("dev")).unwrap().is_open());
    assert!(f.alerts.open_alerts().is_empty());
}

#[tokio::test]
async fn test_same_boot_never_kills() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();

    f.mock.reboot();
    let report = f.service.collect().await.unwrap();

    assert!(!report.boot_changed);
    assert!(report.killed.is_empty());
    let dev = f.store.get_session("dev").await.unwrap().unwrap();
    assert_eq!(dev.state, SessionState::Running);
    assert!(f.alerts.open_alerts().is_empty());
}

#[tokio::test]
async fn test_first_collect_is_not_a_boot_change() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");

    let report = f.service.collect().await.unwrap();

    assert!(!report.boot_changed);
    assert_eq!(report.boot_id, "boot-1");
    let overview = f.service.overview().await.unwrap();
    assert_eq!(overview.boot_id.as_deref(), Some("boot-1"));
    assert_eq!(overview.running, 1);
}

#[tokio::test]
async fn test_unchanged_session_is_not_snapshotted_twice() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");

    let first = f.service.collect().await.unwrap();
    let second = f.service.collect().await.unwrap();

    assert_eq!(first.changed_snapshots, 1);
    assert_eq!(second.changed_snapshots, 0);
    assert_eq!(f.store.snapshot_count("dev"), 1);
}

#[tokio::test]
async fn test_boot_change_is_announced() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();

    let mut events = f.service.subscribe();
    f.mock.reboot();
    f.boot.set("boot-2");
    f.service.collect().await.unwrap();

    let mut overview = None;
    while let Ok(event) = events.try_recv() {
        if let RecoveryEvent::RecoveryOverviewChanged { .. } = event {
            overview = Some(event);
        }
    }
    match overview {
        Some(RecoveryEvent::RecoveryOverviewChanged {
            reason,
            killed_sessions,
            boot_changed,
            ..
        }) => {
            assert_eq!(reason, "collect");
            assert!(boot_changed);
            assert_eq!(killed_sessions, vec!["dev".to_string()]);
        }
        other => panic!("expected an overview event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_boot_restore_mode_queues_restores() {
    let f = fixture_with(RecoveryConfig {
        boot_restore_mode: Some(ReplayMode::Full),
        ..Default::default()
    });
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();

    f.mock.reboot();
    f.mock.reset_calls();
    f.boot.set("boot-2");
    let report = f.service.collect().await.unwrap();
    assert_eq!(report.killed.len(), 1);

    let queued = f.service.list_jobs(10).await.unwrap();
    assert_eq!(queued.len(), 1);
    let job = f.wait_for_job(queued[0].id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.triggered_by, "boot");
    assert_eq!(job.mode, ReplayMode::Full);
    assert_eq!(job.target_session, "dev");

    let lines: Vec<String> = f.mock.sent_lines().into_iter().map(|(_, text)| text).collect();
    assert_eq!(lines, vec!["cd /tmp/dev".to_string(), "nvim".to_string()]);

    let dev = f.store.get_session("dev").await.unwrap().unwrap();
    assert_eq!(dev.state, SessionState::Restored);
    assert!(!f.alerts.get(&session_killed_key("dev")).unwrap().is_open());
}
