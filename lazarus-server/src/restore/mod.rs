// Lazarus Restore Orchestrator
//
// Turns a stored snapshot into a live tmux session on a background task.
//
// # Job lifecycle
//
// ```text
// restore_snapshot_async ──► queued ──► running ──► succeeded
//        (synchronous)                     │
//                                          └──────► failed
// ```
//
// The restore body runs under the service's root cancellation token and a
// per-job timeout. Terminal bookkeeping (job row, session state, alerts)
// ignores cancellation and keeps at least `finalize_grace` of time, so a
// shutdown cannot leave a job in a non-terminal state.

mod replay;
mod target;

pub use replay::{replay_command, restore_session, shell_quote, RestoreProgress};
pub use target::{resolve_restore_target, restored_name, MAX_RENAME_SUFFIX};

use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use lazarus_utils::alert::{restore_failed_key, session_killed_key, Alert};
use lazarus_utils::config::RecoveryConfig;
use lazarus_utils::event::RecoveryEvent;
use lazarus_utils::recovery::{
    total_restore_steps, JobStatus, NewJob, RecoveryJob, RestoreOptions, RestoreRequest,
    SessionState,
};
use lazarus_utils::snapshot::SessionSnapshot;

use crate::collector::Collector;
use crate::error::{RecoveryError, RecoveryResult};
use crate::integrations::TmuxClient;
use crate::notifications::{AlertSink, EventBus};
use crate::persistence::{
    JobProgress, JobRepo, RecoveryStore, SessionRepo, SessionTransitions, SnapshotRepo,
};

/// Failure reason stamped on work found unfinished at startup.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Outcome of the startup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleSweep {
    pub failed_jobs: usize,
    pub reverted_sessions: usize,
}

struct Inner {
    tmux: Arc<dyn TmuxClient>,
    store: Arc<dyn RecoveryStore>,
    alerts: Option<Arc<dyn AlertSink>>,
    events: EventBus,
    collector: Arc<Collector>,
    restore_timeout: Duration,
    finalize_grace: Duration,
    root: CancellationToken,
    tasks: TaskTracker,
}

/// Schedules and runs restore jobs.
#[derive(Clone)]
pub struct RestoreOrchestrator {
    inner: Arc<Inner>,
}

impl RestoreOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tmux: Arc<dyn TmuxClient>,
        store: Arc<dyn RecoveryStore>,
        alerts: Option<Arc<dyn AlertSink>>,
        events: EventBus,
        collector: Arc<Collector>,
        config: &RecoveryConfig,
        root: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tmux,
                store,
                alerts,
                events,
                collector,
                restore_timeout: config.restore_timeout(),
                finalize_grace: config.finalize_grace(),
                root,
                tasks,
            }),
        }
    }

    /// Validate, create a queued job and start restoring in the background.
    pub async fn restore_snapshot_async(
        &self,
        snapshot_id: i64,
        request: &RestoreRequest,
    ) -> RecoveryResult<RecoveryJob> {
        let inner = &self.inner;
        if inner.root.is_cancelled() || inner.tasks.is_closed() {
            return Err(RecoveryError::ShuttingDown);
        }

        let options = request.normalize();
        let row = inner
            .store
            .get_snapshot(snapshot_id)
            .await?
            .ok_or(RecoveryError::SnapshotNotFound(snapshot_id))?;
        let snapshot = row
            .payload()
            .map_err(|e| RecoveryError::CorruptSnapshot(snapshot_id, e.to_string()))?;

        let target_session = if options.target_session.is_empty() {
            row.session_name.clone()
        } else {
            options.target_session.clone()
        };
        let job = inner
            .store
            .create_job(&NewJob {
                session_name: row.session_name.clone(),
                target_session,
                snapshot_id,
                mode: options.mode,
                conflict_policy: options.conflict_policy,
                total_steps: total_restore_steps(snapshot.window_count(), snapshot.pane_count()),
                triggered_by: options.triggered_by.clone(),
            })
            .await?;
        info!(
            "Lazarus: queued restore job {} for {} (snapshot {}, mode {}, {})",
            job.id, job.session_name, snapshot_id, options.mode, options.conflict_policy
        );
        inner.events.publish(RecoveryEvent::job(&job));

        let runner = Arc::clone(inner);
        let queued = job.clone();
        inner.tasks.spawn(async move {
            runner.run_job(queued, snapshot, options).await;
        });
        Ok(job)
    }

    /// Force-fail jobs and sessions a previous process left mid-restore.
    pub async fn recover_stale(&self) -> RecoveryResult<StaleSweep> {
        let inner = &self.inner;
        let mut sweep = StaleSweep::default();

        for job in inner.store.list_unfinished_jobs().await? {
            let failed = inner
                .store
                .finish_job(job.id, JobStatus::Failed, Some(INTERRUPTED_BY_RESTART))
                .await?;
            warn!(
                "Lazarus: restore job {} for {} was {} at startup, marked failed",
                job.id, job.session_name, job.status
            );
            inner.events.publish(RecoveryEvent::job(&failed));
            sweep.failed_jobs += 1;
        }

        for session in inner
            .store
            .list_sessions_by_state(&[SessionState::Restoring])
            .await?
        {
            inner
                .store
                .mark_restore_failed(&session.name, INTERRUPTED_BY_RESTART)
                .await?;
            warn!("Lazarus: session {} was left restoring, reverted to killed", session.name);
            sweep.reverted_sessions += 1;
        }

        if sweep != StaleSweep::default() {
            inner
                .events
                .publish(RecoveryEvent::overview("stale-recovery"));
        }
        Ok(sweep)
    }
}

impl Inner {
    async fn run_job(
        self: Arc<Self>,
        job: RecoveryJob,
        snapshot: SessionSnapshot,
        options: RestoreOptions,
    ) {
        let deadline = Instant::now() + self.restore_timeout;

        let outcome = tokio::select! {
            biased;
            _ = self.root.cancelled() => Err(RecoveryError::Cancelled),
            result = timeout_at(deadline, self.execute(&job, &snapshot, &options)) => {
                result.unwrap_or(Err(RecoveryError::TimedOut(self.restore_timeout)))
            }
        };

        let succeeded = outcome.is_ok();
        let finalize_deadline = deadline.max(Instant::now() + self.finalize_grace);
        match timeout_at(finalize_deadline, self.finalize(&job, outcome)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Lazarus: could not finalize restore job {}: {}", job.id, e),
            Err(_) => error!("Lazarus: finalizing restore job {} timed out", job.id),
        }

        if succeeded && !self.root.is_cancelled() {
            if let Err(e) = self.collector.collect().await {
                warn!("Lazarus: post-restore collect failed: {}", e);
            }
        }
    }

    async fn execute(
        &self,
        job: &RecoveryJob,
        snapshot: &SessionSnapshot,
        options: &RestoreOptions,
    ) -> RecoveryResult<String> {
        let running = self.store.set_job_running(job.id).await?;
        self.store.mark_restoring(&job.session_name).await?;
        self.events.publish(RecoveryEvent::job(&running));
        self.events.publish(RecoveryEvent::overview("restore-started"));
        info!("Lazarus: restore job {} running", job.id);

        let target =
            resolve_restore_target(self.tmux.as_ref(), &job.target_session, options.conflict_policy)
                .await?;
        if target != job.target_session {
            self.store.update_job_target(job.id, &target).await?;
        }

        let progress = JobSteps {
            inner: self,
            job: RecoveryJob {
                target_session: target.clone(),
                ..running
            },
            completed: AtomicI32::new(0),
        };
        restore_session(self.tmux.as_ref(), snapshot, &target, options.mode, &progress).await?;
        Ok(target)
    }

    async fn finalize(
        &self,
        job: &RecoveryJob,
        outcome: RecoveryResult<String>,
    ) -> RecoveryResult<()> {
        match outcome {
            Ok(target) => {
                let finished = self
                    .store
                    .finish_job(job.id, JobStatus::Succeeded, None)
                    .await?;
                if let Some(alerts) = &self.alerts {
                    alerts
                        .resolve_alert(&session_killed_key(&job.session_name))
                        .await;
                    alerts
                        .resolve_alert(&restore_failed_key(&job.session_name))
                        .await;
                }
                self.store.mark_restored(&job.session_name).await?;
                info!(
                    "Lazarus: restore job {} restored {} as {}",
                    job.id, job.session_name, target
                );
                self.events.publish(RecoveryEvent::job(&finished));
            }
            Err(e) => {
                let message = e.to_string();
                let finished = self
                    .store
                    .finish_job(job.id, JobStatus::Failed, Some(&message))
                    .await?;
                if let Some(alerts) = &self.alerts {
                    alerts
                        .upsert_alert(Alert::restore_failed(&job.session_name, job.id, &message))
                        .await;
                }
                self.store
                    .mark_restore_failed(&job.session_name, &message)
                    .await?;
                warn!("Lazarus: restore job {} failed: {}", job.id, message);
                self.events.publish(RecoveryEvent::job(&finished));
            }
        }
        self.events
            .publish(RecoveryEvent::overview("restore-finished"));
        Ok(())
    }
}

/// Persists step progress for one running job.
struct JobSteps<'a> {
    inner: &'a Inner,
    job: RecoveryJob,
    completed: AtomicI32,
}

#[async_trait]
impl RestoreProgress for JobSteps<'_> {
    async fn step(&self, label: &str) -> RecoveryResult<()> {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .store
            .update_job_progress(self.job.id, completed, label)
            .await?;
        self.inner.events.publish(RecoveryEvent::RecoveryJobChanged {
            job_id: self.job.id,
            session_name: self.job.session_name.clone(),
            target_session: self.job.target_session.clone(),
            status: JobStatus::Running,
            completed_steps: completed.min(self.job.total_steps),
            total_steps: self.job.total_steps,
            error: None,
        });
        Ok(())
    }
}
