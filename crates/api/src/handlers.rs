use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use pa_core::{AdmissionError, Job, JobFilter, JobStatus, Page, ScanResult};
use pa_dedup::Admission;
use pa_queue::Priority;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

const MAX_URL_LEN: usize = 2048;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub cached: bool,
    pub poll_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn poll_url(job_id: Uuid) -> String {
    format!("/scan/{job_id}")
}

/// `POST /analyze` (spec.md §6 "Submission endpoint"): canonicalize + resolve + SSRF-check
/// the target, resolve the dedup race, then create and enqueue a fresh Job.
pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let raw = body.url.as_deref().unwrap_or("");
    if raw.is_empty() {
        state.metrics.record_validation_error();
        let err = if body.url.is_none() { AdmissionError::UrlMissing } else { AdmissionError::UrlEmpty };
        return Err(admission_error_to_api(err));
    }
    if raw.len() > MAX_URL_LEN {
        state.metrics.record_validation_error();
        return Err(ApiError::BadRequest(
            "url must be between 1 and 2048 characters".to_string(),
        ));
    }

    let canonical = match pa_validator::admit(raw).await {
        Ok(url) => url,
        Err(e) => {
            if e.is_ssrf_block() {
                state.metrics.record_ssrf_blocked();
            } else {
                state.metrics.record_validation_error();
            }
            return Err(admission_error_to_api(e));
        }
    };

    match state.dedup.admit(&canonical).await? {
        Admission::PointTo(job) if job.status == JobStatus::Success => {
            state.metrics.record_cached();
            Ok((
                StatusCode::OK,
                Json(AnalyzeResponse {
                    job_id: job.id,
                    status: job.status,
                    cached: true,
                    poll_url: poll_url(job.id),
                    cached_at: job.completed_at,
                    message: None,
                }),
            ))
        }
        Admission::PointTo(job) => Ok((
            StatusCode::ACCEPTED,
            Json(AnalyzeResponse {
                job_id: job.id,
                status: job.status,
                cached: false,
                poll_url: poll_url(job.id),
                cached_at: None,
                message: Some("a scan for this URL is already in progress".to_string()),
            }),
        )),
        Admission::Proceed => {
            let job_id = state.store.create(&canonical, None).await?;
            if let Err(e) = state.queue.enqueue(job_id, &canonical, Priority::Normal).await {
                let _ = state
                    .store
                    .transition(
                        job_id,
                        JobStatus::Pending,
                        JobStatus::Failed,
                        Some("Failed to enqueue scan job"),
                    )
                    .await;
                let _ = state.dedup.release(&canonical).await;
                return Err(ApiError::Internal(e.into()));
            }
            Ok((
                StatusCode::ACCEPTED,
                Json(AnalyzeResponse {
                    job_id,
                    status: JobStatus::Pending,
                    cached: false,
                    poll_url: poll_url(job_id),
                    cached_at: None,
                    message: None,
                }),
            ))
        }
    }
}

fn admission_error_to_api(e: AdmissionError) -> ApiError {
    ApiError::BadRequest(e.client_message())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatusResponse {
    pub job_id: Uuid,
    pub target_url: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// `GET /scan/:id` (spec.md §6 "Polling endpoint").
pub async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanStatusResponse>, ApiError> {
    let job = state.store.find_by_id(id).await?.ok_or(ApiError::NotFound)?;

    let result = if job.status == JobStatus::Success {
        state.store.find_result_by_job_id(id).await?
    } else {
        None
    };

    Ok(Json(ScanStatusResponse {
        job_id: job.id,
        target_url: job.target_url,
        status: job.status,
        created_at: job.created_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
        result,
        error_message: job.error_message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScansQuery {
    pub url: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScansResponse {
    pub data: Vec<Job>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// `GET /scans?url=&status=&page=&limit=` (spec.md §6 "History endpoint").
pub async fn list_scans(
    State(state): State<AppState>,
    Query(query): Query<ScansQuery>,
) -> Result<Json<ScansResponse>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(parse_status(s).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown status '{s}'"))
        })?),
        None => None,
    };

    let filter = JobFilter {
        url: query.url,
        status,
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(pa_core::DEFAULT_PAGE_LIMIT),
    };

    let page: Page<Job> = state.store.list(&filter).await?;
    Ok(Json(ScansResponse {
        data: page.data,
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages,
            has_next: page.has_next,
            has_prev: page.has_prev,
        },
    }))
}

fn parse_status(s: &str) -> Option<JobStatus> {
    match s.to_uppercase().as_str() {
        "PENDING" => Some(JobStatus::Pending),
        "RUNNING" => Some(JobStatus::Running),
        "SUCCESS" => Some(JobStatus::Success),
        "FAILED" => Some(JobStatus::Failed),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// `DELETE /scan/:id` (spec.md §6 "Delete endpoint"): 404 unknown, 409 if RUNNING.
pub async fn delete_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let job = state.store.find_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if job.status == JobStatus::Running {
        return Err(ApiError::Conflict("cannot delete a job while it is running".to_string()));
    }
    state.store.delete(id).await?;
    Ok(Json(DeleteResponse { deleted: true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub redis: bool,
}

/// `GET /health` (spec.md §4.J): 200 if all dependencies are up, else 503.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = sqlx::query("SELECT 1").execute(state.store.pool()).await.is_ok();
    let redis = state.queue.dlq_len().await.is_ok();

    let status = if database && redis { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let label = if database && redis { "ok" } else { "degraded" };

    (status, Json(HealthResponse { status: label, database, redis }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub counters: pa_worker::metrics::MetricsSnapshot,
    pub queue_depth: QueueDepth,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepth {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
    pub dlq: i64,
}

/// `GET /metrics` (spec.md §4.J): lifecycle counters, duration histogram, queue depth,
/// process uptime.
pub async fn metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, ApiError> {
    let queue = &state.queue;
    let (waiting, active, completed, failed, delayed, dlq) = tokio::try_join!(
        queue.waiting_len(),
        queue.active_len(),
        queue.completed_len(),
        queue.failed_len(),
        queue.delayed_len(),
        queue.dlq_len(),
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(MetricsResponse {
        counters: state.metrics.snapshot(),
        queue_depth: QueueDepth { waiting, active, completed, failed, delayed, dlq },
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}
