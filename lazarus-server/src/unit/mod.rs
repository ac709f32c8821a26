// Service-level scenarios run against the in-memory tmux, store and alert
// book, with a boot id the tests control.

mod boot_tests;
mod conflict_tests;
mod replay_mode_tests;

use std::sync::Arc;
use std::time::Duration;

use lazarus_utils::config::RecoveryConfig;
use lazarus_utils::recovery::{RecoveryJob, RestoreRequest, SessionState};

use crate::boot::StaticBootId;
use crate::integrations::MockTmux;
use crate::notifications::AlertBook;
use crate::persistence::{MemoryStore, SessionRepo};
use crate::service::{RecoveryDeps, RecoveryService};

pub(crate) struct Fixture {
    pub mock: Arc<MockTmux>,
    pub store: Arc<MemoryStore>,
    pub alerts: Arc<AlertBook>,
    pub boot: Arc<StaticBootId>,
    pub service: RecoveryService,
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(RecoveryConfig::default())
}

pub(crate) fn fixture_with(config: RecoveryConfig) -> Fixture {
    let mock = Arc::new(MockTmux::new());
    let store = Arc::new(MemoryStore::new());
    let alerts = Arc::new(AlertBook::new());
    let boot = Arc::new(StaticBootId::new("boot-1"));
    let service = RecoveryService::new(
        config,
        RecoveryDeps {
            tmux: mock.clone(),
            store: store.clone(),
            boot: boot.clone(),
            alerts: Some(alerts.clone()),
            projection: None,
        },
    );
    Fixture {
        mock,
        store,
        alerts,
        boot,
        service,
    }
}

impl Fixture {
    pub async fn latest_snapshot_id(&self, session: &str) -> i64 {
        self.store
            .get_session(session)
            .await
            .unwrap()
            .unwrap()
            .latest_snapshot_id
            .unwrap()
    }

    /// Capture every live session, then take the whole tmux server away.
    pub async fn capture_then_reboot(&self) {
        self.service.collect().await.unwrap();
        self.mock.reboot();
        self.mock.reset_calls();
    }

    pub async fn restore(
        &self,
        session: &str,
        mode: &str,
        conflict_policy: &str,
    ) -> RecoveryJob {
        let snapshot_id = self.latest_snapshot_id(session).await;
        let request = RestoreRequest {
            mode: mode.to_string(),
            conflict_policy: conflict_policy.to_string(),
            ..Default::default()
        };
        let job = self
            .service
            .restore_snapshot_async(snapshot_id, &request)
            .await
            .unwrap();
        self.wait_for_job(job.id).await
    }

    /// Wait until the job is terminal and its session has left `restoring`.
    pub async fn wait_for_job(&self, id: i64) -> RecoveryJob {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = self.service.get_job(id).await.unwrap();
                let session = self.store.get_session(&job.session_name).await.unwrap();
                let settled = session.map_or(true, |s| s.state != SessionState::Restoring);
                if job.status.is_terminal() && settled {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("restore job did not finish")
    }
}
