// In-memory store
//
// Implements every repository trait in process memory. Used by tests and as
// the fallback when no database is configured (nothing survives a restart
// in that mode, which the daemon logs at startup).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use lazarus_utils::recovery::{
    JobStatus, NewJob, NewSnapshot, RecoveryJob, RecoverySession, RecoverySnapshot, SessionState,
    UpsertOutcome,
};

use super::error::{PersistenceError, PersistenceResult};
use super::repository::{
    JobProgress, JobRepo, ProjectionReader, RuntimeStore, SessionRepo, SessionTransitions,
    SnapshotRepo,
};
use crate::integrations::{LivePane, LiveSession, LiveWindow};

#[derive(Debug, Default)]
struct MemoryState {
    runtime: HashMap<String, String>,
    snapshots: Vec<RecoverySnapshot>,
    sessions: HashMap<String, RecoverySession>,
    jobs: Vec<RecoveryJob>,
    next_snapshot_id: i64,
    next_job_id: i64,
}

impl MemoryState {
    fn session_mut(&mut self, name: &str) -> PersistenceResult<&mut RecoverySession> {
        self.sessions
            .get_mut(name)
            .ok_or_else(|| PersistenceError::SessionNotFound(name.to_string()))
    }

    fn job_mut(&mut self, id: i64) -> PersistenceResult<&mut RecoveryJob> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(PersistenceError::JobNotFound(id))
    }

    fn transition(
        &mut self,
        name: &str,
        state: SessionState,
        at: DateTime<Utc>,
    ) -> PersistenceResult<&mut RecoverySession> {
        let session = self.session_mut(name)?;
        session.state = state;
        session.updated_at = at;
        Ok(session)
    }
}

/// Store keeping all rows in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a session row directly (seeding and tests).
    pub fn put_session(&self, session: RecoverySession) {
        self.state().sessions.insert(session.name.clone(), session);
    }

    /// Overwrite a job row directly (seeding and tests).
    pub fn put_job(&self, job: RecoveryJob) {
        let mut state = self.state();
        state.next_job_id = state.next_job_id.max(job.id);
        state.jobs.retain(|j| j.id != job.id);
        state.jobs.push(job);
    }

    pub fn snapshot_count(&self, session: &str) -> usize {
        self.state()
            .snapshots
            .iter()
            .filter(|s| s.session_name == session)
            .count()
    }
}

#[async_trait]
impl RuntimeStore for MemoryStore {
    async fn get_runtime(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.state().runtime.get(key).cloned())
    }

    async fn set_runtime(&self, key: &str, value: &str) -> PersistenceResult<()> {
        self.state()
            .runtime
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepo for MemoryStore {
    async fn upsert_snapshot(&self, snapshot: &NewSnapshot) -> PersistenceResult<UpsertOutcome> {
        let mut state = self.state();
        let latest = state
            .snapshots
            .iter()
            .filter(|s| s.session_name == snapshot.session_name)
            .max_by_key(|s| s.id)
            .map(|s| (s.id, s.state_hash.clone()));

        let outcome = match latest {
            Some((id, hash)) if hash == snapshot.state_hash => UpsertOutcome {
                snapshot_id: id,
                changed: false,
            },
            _ => {
                state.next_snapshot_id += 1;
                let id = state.next_snapshot_id;
                state.snapshots.push(RecoverySnapshot {
                    id,
                    session_name: snapshot.session_name.clone(),
                    boot_id: snapshot.boot_id.clone(),
                    state_hash: snapshot.state_hash.clone(),
                    captured_at: snapshot.captured_at,
                    active_window: snapshot.active_window,
                    active_pane_id: snapshot.active_pane_id.clone(),
                    window_count: snapshot.window_count,
                    pane_count: snapshot.pane_count,
                    payload_json: snapshot.payload_json.clone(),
                });
                UpsertOutcome {
                    snapshot_id: id,
                    changed: true,
                }
            }
        };

        let now = Utc::now();
        let session = state
            .sessions
            .entry(snapshot.session_name.clone())
            .or_insert_with(|| RecoverySession {
                name: snapshot.session_name.clone(),
                state: SessionState::Running,
                latest_snapshot_id: None,
                boot_id: snapshot.boot_id.clone(),
                last_seen_at: now,
                killed_at: None,
                archived_at: None,
                restore_error: None,
                updated_at: now,
            });
        session.latest_snapshot_id = Some(outcome.snapshot_id);
        session.boot_id = snapshot.boot_id.clone();
        session.last_seen_at = snapshot.captured_at;
        session.updated_at = now;
        if matches!(
            session.state,
            SessionState::Killed | SessionState::Archived
        ) {
            session.state = SessionState::Running;
            session.killed_at = None;
            session.archived_at = None;
            session.restore_error = None;
        }

        Ok(outcome)
    }

    async fn get_snapshot(&self, id: i64) -> PersistenceResult<Option<RecoverySnapshot>> {
        Ok(self.state().snapshots.iter().find(|s| s.id == id).cloned())
    }

    async fn list_snapshots(
        &self,
        session: &str,
        limit: usize,
    ) -> PersistenceResult<Vec<RecoverySnapshot>> {
        let mut rows: Vec<RecoverySnapshot> = self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.session_name == session)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn latest_snapshot(&self, session: &str) -> PersistenceResult<Option<RecoverySnapshot>> {
        Ok(self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.session_name == session)
            .max_by_key(|s| s.id)
            .cloned())
    }

    async fn trim_snapshots(&self, keep: usize) -> PersistenceResult<u64> {
        let mut state = self.state();
        let mut per_session: HashMap<String, Vec<i64>> = HashMap::new();
        for snapshot in &state.snapshots {
            per_session
                .entry(snapshot.session_name.clone())
                .or_default()
                .push(snapshot.id);
        }

        let mut doomed = Vec::new();
        for ids in per_session.values_mut() {
            ids.sort_unstable_by(|a, b| b.cmp(a));
            doomed.extend(ids.iter().skip(keep.max(1)).copied());
        }

        let before = state.snapshots.len();
        state.snapshots.retain(|s| !doomed.contains(&s.id));
        Ok((before - state.snapshots.len()) as u64)
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn get_session(&self, name: &str) -> PersistenceResult<Option<RecoverySession>> {
        Ok(self.state().sessions.get(name).cloned())
    }

    async fn list_sessions(&self) -> PersistenceResult<Vec<RecoverySession>> {
        let mut sessions: Vec<RecoverySession> =
            self.state().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sessions)
    }

    async fn list_sessions_by_state(
        &self,
        states: &[SessionState],
    ) -> PersistenceResult<Vec<RecoverySession>> {
        let mut sessions: Vec<RecoverySession> = self
            .state()
            .sessions
            .values()
            .filter(|s| states.contains(&s.state))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sessions)
    }
}

#[async_trait]
impl SessionTransitions for MemoryStore {
    async fn mark_killed(
        &self,
        name: &str,
        boot_id: &str,
        at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        let mut state = self.state();
        let session = state.transition(name, SessionState::Killed, at)?;
        session.boot_id = boot_id.to_string();
        session.killed_at = Some(at);
        Ok(())
    }

    async fn mark_restoring(&self, name: &str) -> PersistenceResult<()> {
        let mut state = self.state();
        let session = state.transition(name, SessionState::Restoring, Utc::now())?;
        session.restore_error = None;
        Ok(())
    }

    async fn mark_restored(&self, name: &str) -> PersistenceResult<()> {
        let mut state = self.state();
        let session = state.transition(name, SessionState::Restored, Utc::now())?;
        session.restore_error = None;
        Ok(())
    }

    async fn mark_restore_failed(&self, name: &str, error: &str) -> PersistenceResult<()> {
        let mut state = self.state();
        let session = state.transition(name, SessionState::Killed, Utc::now())?;
        session.restore_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_archived(&self, name: &str) -> PersistenceResult<()> {
        let now = Utc::now();
        let mut state = self.state();
        let session = state.transition(name, SessionState::Archived, now)?;
        session.archived_at = Some(now);
        Ok(())
    }
}

#[async_trait]
impl JobRepo for MemoryStore {
    async fn create_job(&self, job: &NewJob) -> PersistenceResult<RecoveryJob> {
        let mut state = self.state();
        state.next_job_id += 1;
        let row = RecoveryJob {
            id: state.next_job_id,
            session_name: job.session_name.clone(),
            target_session: job.target_session.clone(),
            snapshot_id: job.snapshot_id,
            mode: job.mode,
            conflict_policy: job.conflict_policy,
            status: JobStatus::Queued,
            total_steps: job.total_steps,
            completed_steps: 0,
            current_step: "queued".to_string(),
            triggered_by: job.triggered_by.clone(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        state.jobs.push(row.clone());
        Ok(row)
    }

    async fn get_job(&self, id: i64) -> PersistenceResult<Option<RecoveryJob>> {
        Ok(self.state().jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> PersistenceResult<Vec<RecoveryJob>> {
        let mut jobs = self.state().jobs.clone();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn list_unfinished_jobs(&self) -> PersistenceResult<Vec<RecoveryJob>> {
        Ok(self
            .state()
            .jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobProgress for MemoryStore {
    async fn set_job_running(&self, id: i64) -> PersistenceResult<RecoveryJob> {
        let mut state = self.state();
        let job = state.job_mut(id)?;
        if job.status == JobStatus::Queued {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.current_step = "starting".to_string();
        }
        Ok(job.clone())
    }

    async fn update_job_progress(
        &self,
        id: i64,
        completed_steps: i32,
        current_step: &str,
    ) -> PersistenceResult<()> {
        let mut state = self.state();
        let job = state.job_mut(id)?;
        if !job.status.is_terminal() {
            job.completed_steps = completed_steps.min(job.total_steps);
            job.current_step = current_step.to_string();
        }
        Ok(())
    }

    async fn update_job_target(&self, id: i64, target_session: &str) -> PersistenceResult<()> {
        let mut state = self.state();
        let job = state.job_mut(id)?;
        if !job.status.is_terminal() {
            job.target_session = target_session.to_string();
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> PersistenceResult<RecoveryJob> {
        let mut state = self.state();
        let job = state.job_mut(id)?;
        if !job.status.is_terminal() {
            job.status = status;
            job.error = error.map(str::to_string);
            job.finished_at = Some(Utc::now());
            job.current_step = status.as_str().to_string();
            if status == JobStatus::Succeeded {
                job.completed_steps = job.total_steps;
            }
        }
        Ok(job.clone())
    }
}

#[derive(Debug, Default)]
struct ProjectedSession {
    session: Option<LiveSession>,
    windows: Vec<LiveWindow>,
    panes: Vec<LivePane>,
}

/// Projection kept in memory; whoever tracks tmux events publishes into it.
#[derive(Debug, Default)]
pub struct MemoryProjection {
    sessions: Mutex<HashMap<String, ProjectedSession>>,
}

impl MemoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, ProjectedSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn publish(&self, session: LiveSession, windows: Vec<LiveWindow>, panes: Vec<LivePane>) {
        self.sessions().insert(
            session.name.clone(),
            ProjectedSession {
                session: Some(session),
                windows,
                panes,
            },
        );
    }

    pub fn forget(&self, name: &str) {
        self.sessions().remove(name);
    }
}

#[async_trait]
impl ProjectionReader for MemoryProjection {
    async fn projected_session(&self, name: &str) -> PersistenceResult<Option<LiveSession>> {
        Ok(self.sessions().get(name).and_then(|p| p.session.clone()))
    }

    async fn projected_windows(&self, session: &str) -> PersistenceResult<Vec<LiveWindow>> {
        Ok(self
            .sessions()
            .get(session)
            .map(|p| p.windows.clone())
            .unwrap_or_default())
    }

    async fn projected_panes(&self, session: &str) -> PersistenceResult<Vec<LivePane>> {
        Ok(self
            .sessions()
            .get(session)
            .map(|p| p.panes.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarus_utils::recovery::{ConflictPolicy, ReplayMode};

    fn new_snapshot(session: &str, hash: &str) -> NewSnapshot {
        NewSnapshot {
            session_name: session.to_string(),
            boot_id: "boot-1".to_string(),
            state_hash: hash.to_string(),
            captured_at: Utc::now(),
            active_window: 0,
            active_pane_id: "%0".to_string(),
            window_count: 1,
            pane_count: 1,
            payload_json: "{}".to_string(),
        }
    }

    fn new_job(session: &str) -> NewJob {
        NewJob {
            session_name: session.to_string(),
            target_session: session.to_string(),
            snapshot_id: 1,
            mode: ReplayMode::Safe,
            conflict_policy: ConflictPolicy::Rename,
            total_steps: 4,
            triggered_by: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_dedupes_by_hash() {
        let store = MemoryStore::new();
        let first = store.upsert_snapshot(&new_snapshot("dev", "aaaa")).await.unwrap();
        let again = store.upsert_snapshot(&new_snapshot("dev", "aaaa")).await.unwrap();
        let changed = store.upsert_snapshot(&new_snapshot("dev", "bbbb")).await.unwrap();

        assert!(first.changed);
        assert!(!again.changed);
        assert_eq!(again.snapshot_id, first.snapshot_id);
        assert!(changed.changed);
        assert_eq!(store.snapshot_count("dev"), 2);

        let session = store.get_session("dev").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Running);
        assert_eq!(session.latest_snapshot_id, Some(changed.snapshot_id));
    }

    #[tokio::test]
    async fn test_upsert_keeps_restoring_state() {
        let store = MemoryStore::new();
        store.upsert_snapshot(&new_snapshot("dev", "aaaa")).await.unwrap();
        store.mark_restoring("dev").await.unwrap();
        store.upsert_snapshot(&new_snapshot("dev", "bbbb")).await.unwrap();
        let session = store.get_session("dev").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Restoring);

        store.mark_restore_failed("dev", "boom").await.unwrap();
        store.upsert_snapshot(&new_snapshot("dev", "cccc")).await.unwrap();
        let session = store.get_session("dev").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Running);
        assert_eq!(session.restore_error, None);
    }

    #[tokio::test]
    async fn test_trim_keeps_newest_per_session() {
        let store = MemoryStore::new();
        for hash in ["a", "b", "c", "d"] {
            store.upsert_snapshot(&new_snapshot("dev", hash)).await.unwrap();
        }
        store.upsert_snapshot(&new_snapshot("ops", "z")).await.unwrap();

        let removed = store.trim_snapshots(2).await.unwrap();
        assert_eq!(removed, 2);
        let kept = store.list_snapshots("dev", 10).await.unwrap();
        let hashes: Vec<&str> = kept.iter().map(|s| s.state_hash.as_str()).collect();
        assert_eq!(hashes, vec!["d", "c"]);
        assert_eq!(store.snapshot_count("ops"), 1);
    }

    #[tokio::test]
    async fn test_transitions_require_known_session() {
        let store = MemoryStore::new();
        let err = store.mark_restoring("ghost").await.unwrap_err();
        assert!(matches!(err, PersistenceError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_job_lifecycle_is_append_only() {
        let store = MemoryStore::new();
        let job = store.create_job(&new_job("dev")).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let running = store.set_job_running(job.id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.started_at.is_some());

        store.update_job_progress(job.id, 2, "window 0").await.unwrap();
        let failed = store
            .finish_job(job.id, JobStatus::Failed, Some("boom"))
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        let again = store
            .finish_job(job.id, JobStatus::Succeeded, None)
            .await
            .unwrap();
        assert_eq!(again.status, JobStatus::Failed);
        store.update_job_progress(job.id, 4, "late").await.unwrap();
        let row = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(row.completed_steps, 2);
        assert!(store.list_unfinished_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_projection_round_trip() {
        let projection = MemoryProjection::new();
        assert!(projection.projected_session("dev").await.unwrap().is_none());

        projection.publish(
            LiveSession {
                name: "dev".to_string(),
                attached: 1,
                window_count: 1,
            },
            Vec::new(),
            Vec::new(),
        );
        assert!(projection.projected_session("dev").await.unwrap().is_some());
        assert!(projection.projected_windows("dev").await.unwrap().is_empty());

        projection.forget("dev");
        assert!(projection.projected_session("dev").await.unwrap().is_none());
    }
}
