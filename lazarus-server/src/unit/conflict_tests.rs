use lazarus_utils::alert::restore_failed_key;
use lazarus_utils::recovery::{ConflictPolicy, JobStatus, RestoreRequest, SessionState};

use super::fixture;
use crate::integrations::MockCall;
use crate::persistence::SessionRepo;

#[tokio::test]
async fn test_rename_picks_first_free_suffix() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();
    f.mock.reset_calls();

    let job = f.restore("dev", "safe", "rename").await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.conflict_policy, ConflictPolicy::Rename);
    assert_eq!(job.target_session, "dev-restored-01");
    let mut names = f.mock.session_names();
    names.sort();
    assert_eq!(names, vec!["dev", "dev-restored-01"]);
    assert!(!f
        .mock
        .calls()
        .iter()
        .any(|c| matches!(c, MockCall::KillSession(_))));
}

#[tokio::test]
async fn test_skip_fails_when_target_exists() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();
    f.mock.reset_calls();

    let job = f.restore("dev", "full", "skip").await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("already exists"));
    assert!(!f
        .mock
        .calls()
        .iter()
        .any(|c| matches!(c, MockCall::NewSession { .. })));
    assert!(f.mock.sent_lines().is_empty());

    let dev = f.store.get_session("dev").await.unwrap().unwrap();
    assert_eq!(dev.state, SessionState::Killed);
    assert!(dev.restore_error.unwrap().contains("already exists"));
    assert!(f.alerts.get(&restore_failed_key("dev")).unwrap().is_open());
}

#[tokio::test]
async fn test_replace_kills_then_recreates() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();
    f.mock.reset_calls();

    let job = f.restore("dev", "safe", "replace").await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.target_session, "dev");
    assert_eq!(f.mock.session_names(), vec!["dev"]);

    let calls = f.mock.calls();
    let killed = calls
        .iter()
        .position(|c| *c == MockCall::KillSession("dev".to_string()))
        .unwrap();
    let created = calls
        .iter()
        .position(|c| matches!(c, MockCall::NewSession { name, .. } if name == "dev"))
        .unwrap();
    assert!(killed < created);
}

#[tokio::test]
async fn test_explicit_target_name() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();

    let snapshot_id = f.latest_snapshot_id("dev").await;
    let request = RestoreRequest {
        mode: "safe".to_string(),
        target_session: "  scratch ".to_string(),
        ..Default::default()
    };
    let queued = f
        .service
        .restore_snapshot_async(snapshot_id, &request)
        .await
        .unwrap();
    assert_eq!(queued.target_session, "scratch");
    assert_eq!(queued.session_name, "dev");

    let job = f.wait_for_job(queued.id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(f.mock.session_names().contains(&"scratch".to_string()));
}

#[tokio::test]
async fn test_unknown_policy_falls_back_to_rename() {
    let f = fixture();
    f.mock.spawn_session("dev", "/tmp/dev", "nvim");
    f.service.collect().await.unwrap();

    let job = f.restore("dev", "safe", "clobber").await;

    assert_eq!(job.conflict_policy, ConflictPolicy::Rename);
    assert_eq!(job.target_session, "dev-restored-01");
}
