// Lazarus Recovery Service
//
// Wires the collector and the restore orchestrator into one lifecycle and
// exposes the read and write operations callers use.
//
// All background work (the collector ticker and every restore job) runs on a
// single task tracker under one root cancellation token, so `stop` can cancel
// everything at once and wait for it with a deadline.

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use lazarus_utils::alert::session_killed_key;
use lazarus_utils::config::RecoveryConfig;
use lazarus_utils::event::RecoveryEvent;
use lazarus_utils::recovery::{
    ConflictPolicy, RecoveryJob, RecoveryOverview, RecoverySession, RecoverySnapshot, ReplayMode,
    RestoreRequest, SessionState,
};

use crate::boot::BootIdentity;
use crate::collector::{CollectReport, Collector};
use crate::error::{RecoveryError, RecoveryResult};
use crate::integrations::TmuxClient;
use crate::notifications::{AlertSink, EventBus};
use crate::persistence::{
    JobRepo, ProjectionReader, RecoveryStore, RuntimeStore, SessionRepo, SessionTransitions,
    SnapshotRepo, KEY_BOOT_ID, KEY_LAST_COLLECT_AT, KEY_LIVE_SESSIONS,
};
use crate::restore::{RestoreOrchestrator, StaleSweep};

/// Jobs listed in the overview.
const RECENT_JOBS: usize = 10;

/// Collaborators the service is built from.
pub struct RecoveryDeps {
    pub tmux: Arc<dyn TmuxClient>,
    pub store: Arc<dyn RecoveryStore>,
    pub boot: Arc<dyn BootIdentity>,
    pub alerts: Option<Arc<dyn AlertSink>>,
    pub projection: Option<Arc<dyn ProjectionReader>>,
}

pub struct RecoveryService {
    config: RecoveryConfig,
    store: Arc<dyn RecoveryStore>,
    alerts: Option<Arc<dyn AlertSink>>,
    events: EventBus,
    collector: Arc<Collector>,
    orchestrator: RestoreOrchestrator,
    root: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl RecoveryService {
    pub fn new(config: RecoveryConfig, deps: RecoveryDeps) -> Self {
        let events = EventBus::new();
        let root = CancellationToken::new();
        let tasks = TaskTracker::new();

        let mut collector = Collector::new(
            deps.tmux.clone(),
            deps.store.clone(),
            deps.boot,
            events.clone(),
            &config,
        );
        if let Some(projection) = deps.projection {
            collector = collector.with_projection(projection);
        }
        if let Some(alerts) = deps.alerts.clone() {
            collector = collector.with_alerts(alerts);
        }
        let collector = Arc::new(collector);

        let orchestrator = RestoreOrchestrator::new(
            deps.tmux,
            deps.store.clone(),
            deps.alerts.clone(),
            events.clone(),
            collector.clone(),
            &config,
            root.clone(),
            tasks.clone(),
        );

        Self {
            config,
            store: deps.store,
            alerts: deps.alerts,
            events,
            collector,
            orchestrator,
            root,
            tasks,
            started: AtomicBool::new(false),
        }
    }

    /// Sweep work a previous process left unfinished, then start the
    /// collector ticker. Calling it again is a no-op.
    pub async fn start(&self) -> RecoveryResult<StaleSweep> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(StaleSweep::default());
        }
        if self.root.is_cancelled() {
            return Err(RecoveryError::ShuttingDown);
        }

        let sweep = self.orchestrator.recover_stale().await?;
        if sweep != StaleSweep::default() {
            info!(
                "Lazarus: startup sweep failed {} job(s), reverted {} session(s)",
                sweep.failed_jobs, sweep.reverted_sessions
            );
        }

        let collector = self.collector.clone();
        let orchestrator = self.orchestrator.clone();
        let root = self.root.clone();
        let interval = self.config.collect_interval();
        let boot_mode = self.config.boot_restore_mode;
        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = collect_and_recover(&collector, &orchestrator, boot_mode).await {
                            warn!("Lazarus: collect cycle failed: {}", e);
                        }
                    }
                }
            }
            info!("Lazarus: collector loop stopped");
        });
        info!(
            "Lazarus: recovery service started (collect every {:?})",
            interval
        );
        Ok(sweep)
    }

    /// Cancel background work and wait for it, at most `deadline`.
    /// Returns false when tasks were still running at the deadline.
    pub async fn stop(&self, deadline: Duration) -> bool {
        self.root.cancel();
        self.tasks.close();
        match tokio::time::timeout(deadline, self.tasks.wait()).await {
            Ok(()) => {
                info!("Lazarus: recovery service stopped");
                true
            }
            Err(_) => {
                warn!(
                    "Lazarus: {} task(s) still running after {:?}",
                    self.tasks.len(),
                    deadline
                );
                false
            }
        }
    }

    /// Run one collector cycle now.
    pub async fn collect(&self) -> RecoveryResult<CollectReport> {
        collect_and_recover(
            &self.collector,
            &self.orchestrator,
            self.config.boot_restore_mode,
        )
        .await
    }

    pub async fn overview(&self) -> RecoveryResult<RecoveryOverview> {
        let boot_id = self.store.get_runtime(KEY_BOOT_ID).await?;
        let last_collect_at = self
            .store
            .get_runtime(KEY_LAST_COLLECT_AT)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc));
        let live_sessions: Vec<String> = self
            .store
            .get_runtime(KEY_LIVE_SESSIONS)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        let sessions = self.store.list_sessions().await?;
        let count = |state: SessionState| sessions.iter().filter(|s| s.state == state).count();
        let killed_sessions: Vec<RecoverySession> = sessions
            .iter()
            .filter(|s| s.state == SessionState::Killed)
            .cloned()
            .collect();

        Ok(RecoveryOverview {
            boot_id,
            last_collect_at,
            live_sessions,
            running: count(SessionState::Running),
            killed: count(SessionState::Killed),
            restoring: count(SessionState::Restoring),
            restored: count(SessionState::Restored),
            archived: count(SessionState::Archived),
            active_jobs: self.store.list_unfinished_jobs().await?.len(),
            killed_sessions,
            recent_jobs: self.store.list_jobs(RECENT_JOBS).await?,
        })
    }

    pub async fn list_killed_sessions(&self) -> RecoveryResult<Vec<RecoverySession>> {
        Ok(self
            .store
            .list_sessions_by_state(&[SessionState::Killed])
            .await?)
    }

    pub async fn list_sessions(&self) -> RecoveryResult<Vec<RecoverySession>> {
        Ok(self.store.list_sessions().await?)
    }

    pub async fn get_snapshot(&self, id: i64) -> RecoveryResult<RecoverySnapshot> {
        self.store
            .get_snapshot(id)
            .await?
            .ok_or(RecoveryError::SnapshotNotFound(id))
    }

    /// Newest first.
    pub async fn list_snapshots(
        &self,
        session: &str,
        limit: usize,
    ) -> RecoveryResult<Vec<RecoverySnapshot>> {
        Ok(self.store.list_snapshots(session, limit).await?)
    }

    pub async fn get_job(&self, id: i64) -> RecoveryResult<RecoveryJob> {
        self.store
            .get_job(id)
            .await?
            .ok_or(RecoveryError::JobNotFound(id))
    }

    /// Newest first.
    pub async fn list_jobs(&self, limit: usize) -> RecoveryResult<Vec<RecoveryJob>> {
        Ok(self.store.list_jobs(limit).await?)
    }

    /// Retire a session the user no longer wants restored.
    ///
    /// Live (`running`) and in-flight (`restoring`) sessions are refused.
    pub async fn archive_session(&self, name: &str) -> RecoveryResult<RecoverySession> {
        let session = self
            .store
            .get_session(name)
            .await?
            .ok_or_else(|| RecoveryError::SessionNotFound(name.to_string()))?;
        if matches!(
            session.state,
            SessionState::Running | SessionState::Restoring
        ) {
            return Err(RecoveryError::InvalidTransition {
                name: name.to_string(),
                state: session.state.to_string(),
                action: "archive",
            });
        }

        self.store.mark_archived(name).await?;
        if let Some(alerts) = &self.alerts {
            alerts.resolve_alert(&session_killed_key(name)).await;
        }
        info!("Lazarus: archived session {}", name);
        self.events.publish(RecoveryEvent::overview("archive"));

        self.store
            .get_session(name)
            .await?
            .ok_or_else(|| RecoveryError::SessionNotFound(name.to_string()))
    }

    pub async fn restore_snapshot_async(
        &self,
        snapshot_id: i64,
        request: &RestoreRequest,
    ) -> RecoveryResult<RecoveryJob> {
        self.orchestrator
            .restore_snapshot_async(snapshot_id, request)
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }
}

/// Collect, then queue boot restores for sessions the cycle found killed.
async fn collect_and_recover(
    collector: &Collector,
    orchestrator: &RestoreOrchestrator,
    boot_mode: Option<ReplayMode>,
) -> RecoveryResult<CollectReport> {
    let report = collector.collect().await?;
    let mode = match boot_mode {
        Some(mode) if report.boot_changed => mode,
        _ => return Ok(report),
    };

    for killed in &report.killed {
        let snapshot_id = match killed.latest_snapshot_id {
            Some(id) => id,
            None => {
                warn!("Lazarus: no snapshot to auto-restore {}", killed.name);
                continue;
            }
        };
        let request = RestoreRequest {
            mode: mode.as_str().to_string(),
            conflict_policy: ConflictPolicy::Rename.as_str().to_string(),
            target_session: String::new(),
            triggered_by: "boot".to_string(),
        };
        match orchestrator
            .restore_snapshot_async(snapshot_id, &request)
            .await
        {
            Ok(job) => info!(
                "Lazarus: boot restore of {} queued as job {}",
                killed.name, job.id
            ),
            Err(e) => warn!("Lazarus: boot restore of {} not queued: {}", killed.name, e),
        }
    }
    Ok(report)
}
