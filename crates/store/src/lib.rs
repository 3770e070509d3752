use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use pa_core::{
    truncate_error, Job, JobFilter, JobStatus, Page, RiskLevel, ScanResult, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT,
};
use pa_dedup::RecentJobLookup;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Failure modes for `delete()`, distinguished so callers can map NotFound/RunningConflict
/// onto the right HTTP status instead of the blanket 500 a plain `anyhow::Error` would get.
#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("cannot delete job {0} while RUNNING")]
    RunningConflict(Uuid),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Job Store (component E): owns the `scan_jobs`/`scan_results` tables exclusively
/// (spec.md §3 "Ownership").
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `create(url) → id` (spec.md §4.E).
    pub async fn create(&self, canonical_url: &str, user_id: Option<Uuid>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO scan_jobs (id, user_id, target_url, status, attempts, created_at)
             VALUES ($1, $2, $3, 'PENDING', 0, NOW())",
        )
        .bind(id)
        .bind(user_id)
        .bind(canonical_url)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// `findById(id)`.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, user_id, target_url, status, attempts, error_message, created_at, started_at, completed_at
             FROM scan_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_job))
    }

    /// `findRecentSuccess(url, since)`: a SUCCESS job for `url` completed within the
    /// dedup window (spec.md §4.D step 1).
    pub async fn find_recent_success_within(
        &self,
        canonical_url: &str,
        window: Duration,
    ) -> Result<Option<Job>> {
        let since = Utc::now() - window;
        let row = sqlx::query(
            "SELECT id, user_id, target_url, status, attempts, error_message, created_at, started_at, completed_at
             FROM scan_jobs
             WHERE target_url = $1 AND status = 'SUCCESS' AND completed_at >= $2
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(canonical_url)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_job))
    }

    /// `findActive(url)`: a PENDING/RUNNING job for `url`, used to resolve an in-flight
    /// dedup race (spec.md §4.D step 2).
    pub async fn find_active(&self, canonical_url: &str) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, user_id, target_url, status, attempts, error_message, created_at, started_at, completed_at
             FROM scan_jobs
             WHERE target_url = $1 AND status IN ('PENDING', 'RUNNING')
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_job))
    }

    /// `transition(id, from, to, fields)`: a bare status move with no result payload
    /// (e.g. PENDING → RUNNING, or a failure transition).
    pub async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let truncated = error_message.map(truncate_error);
        let completed_at = if to.is_terminal() { Some(Utc::now()) } else { None };
        let started_at_clause = if to == JobStatus::Running {
            "started_at = COALESCE(started_at, NOW()),"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE scan_jobs SET status = $1, {started_at_clause} attempts = attempts + CASE WHEN $1 = 'RUNNING' THEN 1 ELSE 0 END, error_message = $2, completed_at = $3
             WHERE id = $4 AND status = $5"
        );
        let result = sqlx::query(&sql)
            .bind(status_str(to))
            .bind(truncated)
            .bind(completed_at)
            .bind(id)
            .bind(status_str(from))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `markRunning(id)`: move a Job into RUNNING for a worker lease, accepting it from
    /// PENDING (first attempt), FAILED (retry — the one documented non-monotonic jump,
    /// spec.md §3 invariant (i)), or RUNNING itself. The RUNNING case covers a worker
    /// that crashed mid-attempt: the queue's lease recovery re-queues the item without
    /// touching the Job row, so the next claimant re-enters RUNNING from RUNNING rather
    /// than finding no matching row and silently dropping the job. No-ops (returns
    /// `false`) only if the Job is already SUCCESS or gone.
    pub async fn mark_running(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scan_jobs SET status = 'RUNNING', started_at = COALESCE(started_at, NOW()),
                attempts = attempts + 1, completed_at = NULL, error_message = NULL
             WHERE id = $1 AND status IN ('PENDING', 'FAILED', 'RUNNING')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Atomically move a Job to SUCCESS and create its Result in one transaction
    /// (spec.md §4.E "writes that pair completion-state with result creation use a
    /// single atomic transaction; partial writes are rejected").
    pub async fn complete_success(&self, job_id: Uuid, result: &ScanResult) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE scan_jobs SET status = 'SUCCESS', completed_at = NOW(), error_message = NULL
             WHERE id = $1 AND status = 'RUNNING'",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            bail!("job {job_id} is not RUNNING; refusing to write result");
        }

        sqlx::query(
            "INSERT INTO scan_results (id, scan_job_id, score, risk_level, summary, tracker_count, cookie_count, external_domain_count, pages_crawled, is_https, has_csp, canvas_fingerprint, webgl_fingerprint, font_fingerprint, keylogger, raw_data, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())",
        )
        .bind(result.id)
        .bind(job_id)
        .bind(result.score)
        .bind(risk_str(result.risk_level))
        .bind(&result.summary)
        .bind(result.tracker_count)
        .bind(result.cookie_count)
        .bind(result.external_domain_count)
        .bind(result.pages_crawled)
        .bind(result.is_https)
        .bind(result.has_csp)
        .bind(result.canvas_fingerprint)
        .bind(result.webgl_fingerprint)
        .bind(result.font_fingerprint)
        .bind(result.keylogger)
        .bind(&result.raw_data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_result_by_job_id(&self, job_id: Uuid) -> Result<Option<ScanResult>> {
        let row = sqlx::query(
            "SELECT id, scan_job_id, score, risk_level, summary, tracker_count, cookie_count, external_domain_count, pages_crawled, is_https, has_csp, canvas_fingerprint, webgl_fingerprint, font_fingerprint, keylogger, raw_data, created_at
             FROM scan_results WHERE scan_job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_result))
    }

    /// `list(filter, pagination)` (spec.md §4.E). Default limit 20, maximum 100.
    pub async fn list(&self, filter: &JobFilter) -> Result<Page<Job>> {
        let page = filter.page.max(1);
        let limit = if filter.limit <= 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            filter.limit.min(MAX_PAGE_LIMIT)
        };
        let offset = (page - 1) * limit;

        let status_filter = filter.status.map(status_str);

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS c FROM scan_jobs
             WHERE ($1::text IS NULL OR target_url = $1)
               AND ($2::text IS NULL OR status = $2)",
        )
        .bind(&filter.url)
        .bind(status_filter)
        .fetch_one(&self.pool)
        .await?
        .try_get::<i64, _>("c")?;

        let rows = sqlx::query(
            "SELECT id, user_id, target_url, status, attempts, error_message, created_at, started_at, completed_at
             FROM scan_jobs
             WHERE ($1::text IS NULL OR target_url = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(&filter.url)
        .bind(status_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let data = rows.into_iter().map(row_to_job).collect();
        Ok(Page::new(data, page, limit, total))
    }

    /// `delete(id, unlessStatus)`: refuses RUNNING jobs with a conflict error
    /// (spec.md §4.E).
    pub async fn delete(&self, id: Uuid) -> Result<(), DeleteError> {
        let row = sqlx::query("SELECT status FROM scan_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(DeleteError::NotFound(id));
        };
        let status: String = row.try_get("status")?;
        if status == "RUNNING" {
            return Err(DeleteError::RunningConflict(id));
        }
        sqlx::query("DELETE FROM scan_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecentJobLookup for Store {
    async fn find_recent_success(&self, canonical_url: &str) -> Result<Option<Job>> {
        self.find_recent_success_within(canonical_url, Duration::minutes(10))
            .await
    }

    async fn find_active(&self, canonical_url: &str) -> Result<Option<Job>> {
        Store::find_active(self, canonical_url).await
    }
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "PENDING",
        JobStatus::Running => "RUNNING",
        JobStatus::Success => "SUCCESS",
        JobStatus::Failed => "FAILED",
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "RUNNING" => JobStatus::Running,
        "SUCCESS" => JobStatus::Success,
        "FAILED" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn risk_str(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "LOW",
        RiskLevel::Moderate => "MODERATE",
        RiskLevel::Elevated => "ELEVATED",
        RiskLevel::High => "HIGH",
    }
}

fn parse_risk(s: &str) -> RiskLevel {
    match s {
        "MODERATE" => RiskLevel::Moderate,
        "ELEVATED" => RiskLevel::Elevated,
        "HIGH" => RiskLevel::High,
        _ => RiskLevel::Low,
    }
}

fn row_to_job(row: sqlx::postgres::PgRow) -> Job {
    let status: String = row.try_get("status").unwrap_or_default();
    Job {
        id: row.try_get("id").unwrap_or_default(),
        user_id: row.try_get("user_id").ok(),
        target_url: row.try_get("target_url").unwrap_or_default(),
        status: parse_status(&status),
        attempts: row.try_get("attempts").unwrap_or_default(),
        error_message: row.try_get("error_message").ok(),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
        started_at: row.try_get("started_at").ok(),
        completed_at: row.try_get("completed_at").ok(),
    }
}

fn row_to_result(row: sqlx::postgres::PgRow) -> ScanResult {
    let risk: String = row.try_get("risk_level").unwrap_or_default();
    ScanResult {
        id: row.try_get("id").unwrap_or_default(),
        scan_job_id: row.try_get("scan_job_id").unwrap_or_default(),
        score: row.try_get("score").unwrap_or_default(),
        risk_level: parse_risk(&risk),
        summary: row.try_get("summary").unwrap_or_default(),
        tracker_count: row.try_get("tracker_count").unwrap_or_default(),
        cookie_count: row.try_get("cookie_count").unwrap_or_default(),
        external_domain_count: row.try_get("external_domain_count").unwrap_or_default(),
        pages_crawled: row.try_get("pages_crawled").unwrap_or_default(),
        is_https: row.try_get("is_https").unwrap_or_default(),
        has_csp: row.try_get("has_csp").unwrap_or_default(),
        canvas_fingerprint: row.try_get("canvas_fingerprint").unwrap_or_default(),
        webgl_fingerprint: row.try_get("webgl_fingerprint").unwrap_or_default(),
        font_fingerprint: row.try_get("font_fingerprint").unwrap_or_default(),
        keylogger: row.try_get("keylogger").unwrap_or_default(),
        raw_data: row.try_get("raw_data").unwrap_or(serde_json::Value::Null),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
    }
}
