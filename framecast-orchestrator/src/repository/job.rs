//! Job Repository
//!
//! Postgres-backed `JobQueue`. Every mutation runs in a transaction that
//! locks the affected row, applies the `JobRecord` transition and writes the
//! record back, so the row is never observed half-updated.
//!
//! Pending jobs are ordered by `queue_position`. A lease takes the lowest
//! position with `FOR UPDATE SKIP LOCKED`, which lets concurrent leases
//! proceed without handing the same job out twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use framecast_core::domain::job::{
    FailureOutcome, JobFailure, JobOutput, JobRecord, JobStatus,
};
use framecast_core::queue::{JobQueue, NewJob, QueueError, lease_deadline};
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use uuid::Uuid;

const JOB_COLUMNS: &str = r#"
    id, input_ref, output_ref, original_filename, status, retry_count,
    max_retries, result, error, last_error, worker_id, created_at,
    started_at, completed_at, lease_expires_at
"#;

/// A stored row that cannot be mapped back onto a `JobRecord`
#[derive(Debug, thiserror::Error)]
#[error("corrupt job row {id}: {reason}")]
pub struct CorruptRow {
    id: Uuid,
    reason: String,
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, QueueError> {
        self.pool.begin().await.map_err(QueueError::backend)
    }

    /// Locks one row for the duration of the transaction
    async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<JobRecord, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueueError::backend)?;

        row.ok_or(QueueError::NotFound(id))?.try_into()
    }

    /// Writes back the mutable columns; `requeue` moves the job to the tail
    async fn save(conn: &mut PgConnection, job: &JobRecord, requeue: bool) -> Result<(), QueueError> {
        let result = job
            .result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(QueueError::backend)?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, retry_count = $3, result = $4, error = $5,
                last_error = $6, worker_id = $7, started_at = $8,
                completed_at = $9, lease_expires_at = $10,
                queue_position = CASE WHEN $11 THEN nextval('job_queue_position')
                                      ELSE queue_position END
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.retry_count as i32)
        .bind(result)
        .bind(&job.error)
        .bind(&job.last_error)
        .bind(&job.worker_id)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.lease_expires_at)
        .bind(requeue)
        .execute(&mut *conn)
        .await
        .map_err(QueueError::backend)?;

        Ok(())
    }

    /// Locks `id`, checks the lease holder and applies `apply`
    async fn mutate_held<F>(&self, id: Uuid, worker_id: &str, apply: F) -> Result<JobRecord, QueueError>
    where
        F: FnOnce(&mut JobRecord) -> Result<bool, QueueError> + Send,
    {
        let mut tx = self.begin().await?;
        let mut job = Self::lock(&mut tx, id).await?;
        job.ensure_held_by(worker_id)?;
        let requeue = apply(&mut job)?;
        Self::save(&mut tx, &job, requeue).await?;
        tx.commit().await.map_err(QueueError::backend)?;
        Ok(job)
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, new: NewJob) -> Result<JobRecord, QueueError> {
        let job = JobRecord::new(
            new.id,
            new.input_ref,
            new.output_ref,
            new.original_filename,
            new.max_retries,
            Utc::now(),
        );

        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (id, input_ref, output_ref, original_filename, status,
                              retry_count, max_retries, queue_position, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, nextval('job_queue_position'), $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.input_ref)
        .bind(&job.output_ref)
        .bind(&job.original_filename)
        .bind(job.status.as_str())
        .bind(job.max_retries as i32)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(QueueError::backend)?;

        if inserted.rows_affected() == 0 {
            return Err(QueueError::Duplicate(job.id));
        }

        Ok(job)
    }

    async fn lease(&self, worker_id: &str, lease_for: Duration) -> Result<Option<JobRecord>, QueueError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = 'queued'
            ORDER BY queue_position ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await
        .map_err(QueueError::backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut job: JobRecord = row.try_into()?;
        let now = Utc::now();
        job.start(worker_id, lease_deadline(now, lease_for), now)?;
        Self::save(&mut tx, &job, false).await?;
        tx.commit().await.map_err(QueueError::backend)?;

        Ok(Some(job))
    }

    async fn renew(&self, job_id: Uuid, worker_id: &str, lease_for: Duration) -> Result<JobRecord, QueueError> {
        self.mutate_held(job_id, worker_id, |job| {
            job.renew(lease_deadline(Utc::now(), lease_for))?;
            Ok(false)
        })
        .await
    }

    async fn complete(&self, job_id: Uuid, worker_id: &str, output: JobOutput) -> Result<JobRecord, QueueError> {
        self.mutate_held(job_id, worker_id, |job| {
            job.succeed(output, Utc::now())?;
            Ok(false)
        })
        .await
    }

    async fn fail(&self, job_id: Uuid, worker_id: &str, failure: JobFailure) -> Result<JobRecord, QueueError> {
        self.mutate_held(job_id, worker_id, |job| {
            let outcome = job.record_failure(&failure, Utc::now())?;
            Ok(matches!(outcome, FailureOutcome::Requeued { .. }))
        })
        .await
    }

    async fn release(&self, job_id: Uuid, worker_id: &str) -> Result<JobRecord, QueueError> {
        self.mutate_held(job_id, worker_id, |job| {
            job.release()?;
            Ok(false)
        })
        .await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::backend)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(QueueError::backend)?;
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError> {
        let mut tx = self.begin().await?;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = 'running' AND lease_expires_at <= $1
            ORDER BY lease_expires_at ASC
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(QueueError::backend)?;

        let mut reclaimed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut job: JobRecord = row.try_into()?;
            let outcome = job.record_failure(&JobFailure::lease_expired(), now)?;
            Self::save(&mut tx, &job, matches!(outcome, FailureOutcome::Requeued { .. })).await?;
            reclaimed.push(job);
        }

        tx.commit().await.map_err(QueueError::backend)?;
        Ok(reclaimed)
    }

    async fn purge_terminal(&self, before: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            DELETE FROM jobs
            WHERE status IN ('succeeded', 'failed') AND completed_at < $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::backend)?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    input_ref: String,
    output_ref: String,
    original_filename: Option<String>,
    status: String,
    retry_count: i32,
    max_retries: i32,
    result: Option<serde_json::Value>,
    error: Option<String>,
    last_error: Option<String>,
    worker_id: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    lease_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |reason: String| QueueError::backend(CorruptRow { id, reason });

        let status: JobStatus = row.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let result = row
            .result
            .clone()
            .map(serde_json::from_value::<JobOutput>)
            .transpose()
            .map_err(|e| corrupt(format!("result: {e}")))?;

        Ok(JobRecord {
            id: row.id,
            input_ref: row.input_ref,
            output_ref: row.output_ref,
            original_filename: row.original_filename,
            status,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            result,
            error: row.error,
            last_error: row.last_error,
            worker_id: row.worker_id,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            lease_expires_at: row.lease_expires_at,
        })
    }
}
