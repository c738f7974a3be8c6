use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Monotonic positions order the pending channel; a retry draws a new one
    sqlx::query("CREATE SEQUENCE IF NOT EXISTS job_queue_position")
        .execute(pool)
        .await?;

    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            input_ref TEXT NOT NULL,
            output_ref TEXT NOT NULL,
            original_filename TEXT,
            status VARCHAR(20) NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL,
            queue_position BIGINT NOT NULL,
            result JSONB,
            error TEXT,
            last_error TEXT,
            worker_id VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            lease_expires_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for the lease, reclaim and purge scans
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_pending ON jobs(queue_position) WHERE status = 'queued'",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_lease ON jobs(lease_expires_at) WHERE status = 'running'",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_completed_at ON jobs(completed_at) \
         WHERE status IN ('succeeded', 'failed')",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
