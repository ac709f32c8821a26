// Lazarus Collector
//
// One cycle: read the boot identity, list live sessions, capture and persist
// a snapshot per session (content-addressed, so unchanged sessions write
// nothing), track the live-name set, mark sessions lost to a reboot as
// killed, then record bookkeeping and trim old snapshots.
//
// Cycles are single-flighted: a caller arriving mid-cycle waits for it to
// finish and then runs its own.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use lazarus_utils::alert::{session_killed_key, Alert};
use lazarus_utils::config::RecoveryConfig;
use lazarus_utils::event::RecoveryEvent;
use lazarus_utils::recovery::{NewSnapshot, SessionState};
use lazarus_utils::snapshot::{PaneSnapshot, SessionSnapshot, WindowSnapshot};

use crate::boot::BootIdentity;
use crate::error::{RecoveryError, RecoveryResult};
use crate::integrations::{LivePane, LiveSession, LiveWindow, TmuxClient, TmuxQuery};
use crate::notifications::{AlertSink, EventBus};
use crate::persistence::{
    PersistenceError, ProjectionReader, RecoveryStore, RuntimeStore, SessionRepo,
    SessionTransitions, SnapshotRepo, KEY_BOOT_ID, KEY_LAST_COLLECT_AT, KEY_LIVE_SESSIONS,
};

/// A tracked session found missing after a reboot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KilledSession {
    pub name: String,
    pub latest_snapshot_id: Option<i64>,
}

/// What one collector cycle observed and wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    pub boot_id: String,
    pub boot_changed: bool,
    pub collected_at: DateTime<Utc>,
    pub live_sessions: Vec<String>,
    pub live_set_changed: bool,
    pub changed_snapshots: usize,
    pub failed_sessions: Vec<String>,
    pub killed: Vec<KilledSession>,
    pub trimmed_snapshots: u64,
}

impl CollectReport {
    /// Whether observers should refresh the overview.
    pub fn is_noteworthy(&self) -> bool {
        self.changed_snapshots > 0 || !self.killed.is_empty() || self.boot_changed
    }
}

pub struct Collector {
    tmux: Arc<dyn TmuxClient>,
    store: Arc<dyn RecoveryStore>,
    boot: Arc<dyn BootIdentity>,
    projection: Option<Arc<dyn ProjectionReader>>,
    alerts: Option<Arc<dyn AlertSink>>,
    events: EventBus,
    capture_lines: u32,
    max_snapshots_per_session: usize,
    cycle: Mutex<()>,
}

impl Collector {
    pub fn new(
        tmux: Arc<dyn TmuxClient>,
        store: Arc<dyn RecoveryStore>,
        boot: Arc<dyn BootIdentity>,
        events: EventBus,
        config: &RecoveryConfig,
    ) -> Self {
        Self {
            tmux,
            store,
            boot,
            projection: None,
            alerts: None,
            events,
            capture_lines: config.capture_lines,
            max_snapshots_per_session: config.max_snapshots_per_session,
            cycle: Mutex::new(()),
        }
    }

    pub fn with_projection(mut self, projection: Arc<dyn ProjectionReader>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Run one full cycle.
    pub async fn collect(&self) -> RecoveryResult<CollectReport> {
        let _cycle = self.cycle.lock().await;
        let now = Utc::now();

        let boot_id = self
            .boot
            .boot_id()
            .await
            .map_err(|e| RecoveryError::BootIdentity(e.to_string()))?;
        let previous_boot = self.store.get_runtime(KEY_BOOT_ID).await?;
        let boot_changed = matches!(&previous_boot, Some(prev) if *prev != boot_id);
        if boot_changed {
            info!(
                "Lazarus: boot changed ({} -> {})",
                previous_boot.as_deref().unwrap_or_default(),
                boot_id
            );
        }

        let live = match self.tmux.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) if e.is_no_server() => {
                debug!("Lazarus: no tmux server running, treating as empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut changed_snapshots = 0;
        let mut failed_sessions = Vec::new();
        for session in &live {
            match self.persist_session(session, &boot_id, now).await {
                Ok(true) => changed_snapshots += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Lazarus: failed to capture session {}: {}", session.name, e);
                    failed_sessions.push(session.name.clone());
                }
            }
        }

        let live_names: BTreeSet<String> = live.iter().map(|s| s.name.clone()).collect();
        let live_sessions: Vec<String> = live_names.iter().cloned().collect();
        let live_set_changed = self.record_live_set(&live_sessions).await?;

        let mut killed = Vec::new();
        if boot_changed {
            let tracked = self
                .store
                .list_sessions_by_state(&[
                    SessionState::Running,
                    SessionState::Restoring,
                    SessionState::Restored,
                ])
                .await?;
            for session in tracked {
                if live_names.contains(&session.name) {
                    continue;
                }
                self.store.mark_killed(&session.name, &boot_id, now).await?;
                info!("Lazarus: session {} lost to reboot", session.name);
                if let Some(alerts) = &self.alerts {
                    alerts
                        .upsert_alert(Alert::session_killed(&session.name, &boot_id))
                        .await;
                }
                killed.push(KilledSession {
                    name: session.name,
                    latest_snapshot_id: session.latest_snapshot_id,
                });
            }
        }

        self.store.set_runtime(KEY_BOOT_ID, &boot_id).await?;
        self.store
            .set_runtime(KEY_LAST_COLLECT_AT, &now.to_rfc3339())
            .await?;

        let trimmed_snapshots = match self
            .store
            .trim_snapshots(self.max_snapshots_per_session)
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Lazarus: snapshot trim failed: {}", e);
                0
            }
        };

        let report = CollectReport {
            boot_id,
            boot_changed,
            collected_at: now,
            live_sessions,
            live_set_changed,
            changed_snapshots,
            failed_sessions,
            killed,
            trimmed_snapshots,
        };

        if report.is_noteworthy() {
            self.events.publish(RecoveryEvent::RecoveryOverviewChanged {
                reason: "collect".to_string(),
                changed_snapshots: report.changed_snapshots,
                killed_sessions: report.killed.iter().map(|k| k.name.clone()).collect(),
                boot_changed: report.boot_changed,
            });
        }
        debug!(
            "Lazarus: collected {} session(s), {} changed",
            report.live_sessions.len(),
            report.changed_snapshots
        );

        Ok(report)
    }

    /// Capture and upsert one session; true when a new row was written.
    async fn persist_session(
        &self,
        session: &LiveSession,
        boot_id: &str,
        now: DateTime<Utc>,
    ) -> RecoveryResult<bool> {
        let snapshot = self.capture(session, boot_id, now).await?;
        let row = NewSnapshot::from_snapshot(&snapshot)
            .map_err(PersistenceError::from)?;
        let was_killed = matches!(
            self.store.get_session(&session.name).await?,
            Some(ref existing) if existing.state == SessionState::Killed
        );
        let outcome = self.store.upsert_snapshot(&row).await?;
        if was_killed {
            info!("Lazarus: session {} is live again", session.name);
            if let Some(alerts) = &self.alerts {
                alerts
                    .resolve_alert(&session_killed_key(&session.name))
                    .await;
            }
        }
        Ok(outcome.changed)
    }

    async fn capture(
        &self,
        session: &LiveSession,
        boot_id: &str,
        now: DateTime<Utc>,
    ) -> RecoveryResult<SessionSnapshot> {
        let (attached, windows, panes) = match self.projected(&session.name).await {
            Some(projected) => projected,
            None => (
                session.attached,
                self.tmux.list_windows(&session.name).await?,
                self.tmux.list_panes(&session.name).await?,
            ),
        };

        let active_window = windows
            .iter()
            .find(|w| w.active)
            .map(|w| w.index)
            .unwrap_or(-1);
        let active_pane_id = panes
            .iter()
            .find(|p| p.active && p.window_index == active_window)
            .map(|p| p.pane_id.clone())
            .unwrap_or_default();

        let mut pane_snapshots = Vec::with_capacity(panes.len());
        for pane in &panes {
            let last_content = self.tail(pane).await;
            pane_snapshots.push(PaneSnapshot {
                window_index: pane.window_index,
                pane_index: pane.pane_index,
                title: pane.title.clone(),
                active: pane.active,
                current_path: pane.current_path.clone(),
                start_command: pane.start_command.clone(),
                current_command: pane.current_command.clone(),
                last_content,
            });
        }

        Ok(SessionSnapshot {
            session_name: session.name.clone(),
            captured_at: now,
            boot_id: boot_id.to_string(),
            attached,
            active_window,
            active_pane_id,
            windows: windows.into_iter().map(window_snapshot).collect(),
            panes: pane_snapshots,
        })
    }

    /// Projection fast path; `None` sends the caller back to tmux.
    async fn projected(&self, name: &str) -> Option<(i32, Vec<LiveWindow>, Vec<LivePane>)> {
        let projection = self.projection.as_ref()?;
        let lookup = async {
            let session = projection.projected_session(name).await?;
            let windows = projection.projected_windows(name).await?;
            let panes = projection.projected_panes(name).await?;
            Ok::<_, PersistenceError>((session, windows, panes))
        };
        match lookup.await {
            Ok((Some(session), windows, panes)) if !windows.is_empty() && !panes.is_empty() => {
                Some((session.attached, windows, panes))
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Lazarus: projection unavailable for {}: {}", name, e);
                None
            }
        }
    }

    async fn tail(&self, pane: &LivePane) -> String {
        if self.capture_lines == 0 {
            return String::new();
        }
        match self.tmux.capture_pane(&pane.pane_id, self.capture_lines).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Lazarus: capture of {} failed: {}", pane.pane_id, e);
                String::new()
            }
        }
    }

    /// Persist the sorted live-name set; publishes and returns true on change.
    async fn record_live_set(&self, live_sessions: &[String]) -> RecoveryResult<bool> {
        let previous: Option<Vec<String>> = self
            .store
            .get_runtime(KEY_LIVE_SESSIONS)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok());
        if previous.as_deref() == Some(live_sessions) {
            return Ok(false);
        }

        let encoded = serde_json::to_string(live_sessions)
            .map_err(PersistenceError::from)?;
        self.store.set_runtime(KEY_LIVE_SESSIONS, &encoded).await?;
        self.events.publish(RecoveryEvent::TmuxSessionsChanged {
            sessions: live_sessions.to_vec(),
            count: live_sessions.len(),
        });
        Ok(true)
    }
}

fn window_snapshot(window: LiveWindow) -> WindowSnapshot {
    WindowSnapshot {
        index: window.index,
        name: window.name,
        active: window.active,
        pane_count: window.pane_count,
        layout: window.layout,
    }
}
