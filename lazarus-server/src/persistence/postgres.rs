// PostgreSQL store
//
// Durable implementation of the repository traits. Every write goes straight
// to the database: the recovery journal is only useful if it survives the
// crash or reboot it is meant to recover from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use lazarus_utils::recovery::{
    JobStatus, NewJob, NewSnapshot, RecoveryJob, RecoverySession, RecoverySnapshot, SessionState,
    UpsertOutcome,
};

use super::error::{PersistenceError, PersistenceResult};
use super::models::{jobs_from_rows, sessions_from_rows, JobRecord, SessionRecord, SnapshotRecord};
use super::repository::{
    JobProgress, JobRepo, RuntimeStore, SessionRepo, SessionTransitions, SnapshotRepo,
};

const SESSION_COLUMNS: &str = "name, state, latest_snapshot_id, boot_id, last_seen_at, \
     killed_at, archived_at, restore_error, updated_at";

const SNAPSHOT_COLUMNS: &str = "id, session_name, boot_id, state_hash, captured_at, \
     active_window, active_pane_id, window_count, pane_count, payload::text AS payload_json";

const JOB_COLUMNS: &str = "id, session_name, target_session, snapshot_id, mode, \
     conflict_policy, status, total_steps, completed_steps, current_step, triggered_by, \
     error, created_at, started_at, finished_at";

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply embedded migrations.
    pub async fn connect(database_url: &str) -> PersistenceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| PersistenceError::ConnectionFailed(e.to_string()))?;
        info!("Lazarus: PostgreSQL connection pool established");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Lazarus: Database migrations applied successfully");

        Ok(Self { pool })
    }

    /// Wrap an existing pool; migrations are the caller's business.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_session(&self, name: &str) -> PersistenceResult<Option<RecoverySession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM recovery_sessions WHERE name = $1");
        let row = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RecoverySession::try_from).transpose()
    }

    async fn fetch_job(&self, id: i64) -> PersistenceResult<Option<RecoveryJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM recovery_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RecoveryJob::try_from).transpose()
    }

    async fn require_job(&self, id: i64) -> PersistenceResult<RecoveryJob> {
        self.fetch_job(id)
            .await?
            .ok_or(PersistenceError::JobNotFound(id))
    }

    async fn update_session(
        &self,
        name: &str,
        sql: &str,
        extra: Option<&str>,
    ) -> PersistenceResult<()> {
        let mut query = sqlx::query(sql).bind(name);
        if let Some(value) = extra {
            query = query.bind(value);
        }
        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::SessionNotFound(name.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeStore for PgStore {
    async fn get_runtime(&self, key: &str) -> PersistenceResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM recovery_runtime WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set_runtime(&self, key: &str, value: &str) -> PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO recovery_runtime (key, value, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepo for PgStore {
    async fn upsert_snapshot(&self, snapshot: &NewSnapshot) -> PersistenceResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serialize writers for the same session name
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&snapshot.session_name)
            .execute(&mut *tx)
            .await?;

        let latest = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, state_hash FROM recovery_snapshots
             WHERE session_name = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(&snapshot.session_name)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match latest {
            Some((id, hash)) if hash == snapshot.state_hash => UpsertOutcome {
                snapshot_id: id,
                changed: false,
            },
            _ => {
                let id = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO recovery_snapshots (session_name, boot_id, state_hash, captured_at,
                         active_window, active_pane_id, window_count, pane_count, payload)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb)
                     RETURNING id",
                )
                .bind(&snapshot.session_name)
                .bind(&snapshot.boot_id)
                .bind(&snapshot.state_hash)
                .bind(snapshot.captured_at)
                .bind(snapshot.active_window)
                .bind(&snapshot.active_pane_id)
                .bind(snapshot.window_count)
                .bind(snapshot.pane_count)
                .bind(&snapshot.payload_json)
                .fetch_one(&mut *tx)
                .await?;
                UpsertOutcome {
                    snapshot_id: id,
                    changed: true,
                }
            }
        };

        sqlx::query(
            "INSERT INTO recovery_sessions (name, state, latest_snapshot_id, boot_id, last_seen_at, updated_at)
             VALUES ($1, 'running', $2, $3, $4, NOW())
             ON CONFLICT (name) DO UPDATE SET
                 latest_snapshot_id = EXCLUDED.latest_snapshot_id,
                 boot_id = EXCLUDED.boot_id,
                 last_seen_at = EXCLUDED.last_seen_at,
                 updated_at = NOW(),
                 state = CASE WHEN recovery_sessions.state IN ('killed', 'archived')
                              THEN 'running' ELSE recovery_sessions.state END,
                 killed_at = CASE WHEN recovery_sessions.state IN ('killed', 'archived')
                                  THEN NULL ELSE recovery_sessions.killed_at END,
                 archived_at = CASE WHEN recovery_sessions.state IN ('killed', 'archived')
                                    THEN NULL ELSE recovery_sessions.archived_at END,
                 restore_error = CASE WHEN recovery_sessions.state IN ('killed', 'archived')
                                      THEN NULL ELSE recovery_sessions.restore_error END",
        )
        .bind(&snapshot.session_name)
        .bind(outcome.snapshot_id)
        .bind(&snapshot.boot_id)
        .bind(snapshot.captured_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_snapshot(&self, id: i64) -> PersistenceResult<Option<RecoverySnapshot>> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM recovery_snapshots WHERE id = $1");
        let row = sqlx::query_as::<_, SnapshotRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(RecoverySnapshot::from))
    }

    async fn list_snapshots(
        &self,
        session: &str,
        limit: usize,
    ) -> PersistenceResult<Vec<RecoverySnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM recovery_snapshots
             WHERE session_name = $1 ORDER BY id DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, SnapshotRecord>(&sql)
            .bind(session)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RecoverySnapshot::from).collect())
    }

    async fn latest_snapshot(&self, session: &str) -> PersistenceResult<Option<RecoverySnapshot>> {
        Ok(self.list_snapshots(session, 1).await?.into_iter().next())
    }

    async fn trim_snapshots(&self, keep: usize) -> PersistenceResult<u64> {
        let result = sqlx::query(
            "DELETE FROM recovery_snapshots WHERE id IN (
                 SELECT id FROM (
                     SELECT id, ROW_NUMBER() OVER (PARTITION BY session_name ORDER BY id DESC) AS rn
                     FROM recovery_snapshots
                 ) ranked
                 WHERE ranked.rn > $1
             )",
        )
        .bind(keep.max(1) as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionRepo for PgStore {
    async fn get_session(&self, name: &str) -> PersistenceResult<Option<RecoverySession>> {
        self.fetch_session(name).await
    }

    async fn list_sessions(&self) -> PersistenceResult<Vec<RecoverySession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM recovery_sessions ORDER BY name");
        let rows = sqlx::query_as::<_, SessionRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        sessions_from_rows(rows)
    }

    async fn list_sessions_by_state(
        &self,
        states: &[SessionState],
    ) -> PersistenceResult<Vec<RecoverySession>> {
        let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM recovery_sessions WHERE state = ANY($1) ORDER BY name"
        );
        let rows = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(states)
            .fetch_all(&self.pool)
            .await?;
        sessions_from_rows(rows)
    }
}

#[async_trait]
impl SessionTransitions for PgStore {
    async fn mark_killed(
        &self,
        name: &str,
        boot_id: &str,
        at: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        let result = sqlx::query(
            "UPDATE recovery_sessions
             SET state = 'killed', boot_id = $2, killed_at = $3, updated_at = $3
             WHERE name = $1",
        )
        .bind(name)
        .bind(boot_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::SessionNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn mark_restoring(&self, name: &str) -> PersistenceResult<()> {
        self.update_session(
            name,
            "UPDATE recovery_sessions
             SET state = 'restoring', restore_error = NULL, updated_at = NOW()
             WHERE name = $1",
            None,
        )
        .await
    }

    async fn mark_restored(&self, name: &str) -> PersistenceResult<()> {
        self.update_session(
            name,
            "UPDATE recovery_sessions
             SET state = 'restored', restore_error = NULL, updated_at = NOW()
             WHERE name = $1",
            None,
        )
        .await
    }

    async fn mark_restore_failed(&self, name: &str, error: &str) -> PersistenceResult<()> {
        self.update_session(
            name,
            "UPDATE recovery_sessions
             SET state = 'killed', restore_error = $2, updated_at = NOW()
             WHERE name = $1",
            Some(error),
        )
        .await
    }

    async fn mark_archived(&self, name: &str) -> PersistenceResult<()> {
        self.update_session(
            name,
            "UPDATE recovery_sessions
             SET state = 'archived', archived_at = NOW(), updated_at = NOW()
             WHERE name = $1",
            None,
        )
        .await
    }
}

#[async_trait]
impl JobRepo for PgStore {
    async fn create_job(&self, job: &NewJob) -> PersistenceResult<RecoveryJob> {
        let sql = format!(
            "INSERT INTO recovery_jobs (session_name, target_session, snapshot_id, mode,
                 conflict_policy, status, total_steps, completed_steps, current_step, triggered_by)
             VALUES ($1, $2, $3, $4, $5, 'queued', $6, 0, 'queued', $7)
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRecord>(&sql)
            .bind(&job.session_name)
            .bind(&job.target_session)
            .bind(job.snapshot_id)
            .bind(job.mode.as_str())
            .bind(job.conflict_policy.as_str())
            .bind(job.total_steps)
            .bind(&job.triggered_by)
            .fetch_one(&self.pool)
            .await?;
        RecoveryJob::try_from(row)
    }

    async fn get_job(&self, id: i64) -> PersistenceResult<Option<RecoveryJob>> {
        self.fetch_job(id).await
    }

    async fn list_jobs(&self, limit: usize) -> PersistenceResult<Vec<RecoveryJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM recovery_jobs ORDER BY id DESC LIMIT $1");
        let rows = sqlx::query_as::<_, JobRecord>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        jobs_from_rows(rows)
    }

    async fn list_unfinished_jobs(&self) -> PersistenceResult<Vec<RecoveryJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM recovery_jobs
             WHERE status IN ('queued', 'running') ORDER BY id"
        );
        let rows = sqlx::query_as::<_, JobRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        jobs_from_rows(rows)
    }
}

#[async_trait]
impl JobProgress for PgStore {
    async fn set_job_running(&self, id: i64) -> PersistenceResult<RecoveryJob> {
        sqlx::query(
            "UPDATE recovery_jobs
             SET status = 'running', started_at = NOW(), current_step = 'starting'
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.require_job(id).await
    }

    async fn update_job_progress(
        &self,
        id: i64,
        completed_steps: i32,
        current_step: &str,
    ) -> PersistenceResult<()> {
        sqlx::query(
            "UPDATE recovery_jobs
             SET completed_steps = LEAST($2, total_steps), current_step = $3
             WHERE id = $1 AND status IN ('queued', 'running')",
        )
        .bind(id)
        .bind(completed_steps)
        .bind(current_step)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job_target(&self, id: i64, target_session: &str) -> PersistenceResult<()> {
        sqlx::query(
            "UPDATE recovery_jobs SET target_session = $2
             WHERE id = $1 AND status IN ('queued', 'running')",
        )
        .bind(id)
        .bind(target_session)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> PersistenceResult<RecoveryJob> {
        sqlx::query(
            "UPDATE recovery_jobs
             SET status = $2,
                 error = $3,
                 current_step = $2,
                 finished_at = NOW(),
                 completed_steps = CASE WHEN $2 = 'succeeded' THEN total_steps ELSE completed_steps END
             WHERE id = $1 AND status IN ('queued', 'running')",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        self.require_job(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = PgStore::connect("not-a-database-url").await;
        assert!(matches!(result, Err(PersistenceError::ConnectionFailed(_))));
    }
}
