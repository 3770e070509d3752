use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a scan Job (spec.md §3). Monotonic except Failed→Running on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
}

impl RiskLevel {
    /// Map a 0..=100 privacy score to its risk band (spec.md §4.I "Privacy score").
    pub fn from_score(score: i32) -> Self {
        if score >= 80 {
            RiskLevel::Low
        } else if score >= 60 {
            RiskLevel::Moderate
        } else if score >= 40 {
            RiskLevel::Elevated
        } else {
            RiskLevel::High
        }
    }
}

/// A scan Job row (spec.md §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub target_url: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Bound on Job.error_message (spec.md §3: "bounded to 1000 chars").
pub const ERROR_MESSAGE_MAX_LEN: usize = 1000;

pub fn truncate_error(msg: &str) -> String {
    if msg.chars().count() > ERROR_MESSAGE_MAX_LEN {
        msg.chars().take(ERROR_MESSAGE_MAX_LEN).collect()
    } else {
        msg.to_string()
    }
}

/// One-to-one Result row for a SUCCESS Job (spec.md §3 "Result").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub id: Uuid,
    pub scan_job_id: Uuid,
    pub score: i32,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub tracker_count: i32,
    pub cookie_count: i32,
    pub external_domain_count: i32,
    pub pages_crawled: i32,
    pub is_https: bool,
    pub has_csp: bool,
    pub canvas_fingerprint: bool,
    pub webgl_fingerprint: bool,
    pub font_fingerprint: bool,
    pub keylogger: bool,
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Generic pagination envelope returned by the Job Store / Poll API (spec.md §4.E).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit <= 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            data,
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Filter applied by the history endpoint (`GET /scans?url=&status=`).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub url: Option<String>,
    pub status: Option<JobStatus>,
    pub page: i64,
    pub limit: i64,
}

// ===================== Transient crawl artifact model (spec.md §3) =====================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequestRecord {
    pub url: String,
    pub method: String,
    pub resource_type: String,
    pub tracking_params: Vec<String>,
    pub has_post_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedirectHop {
    pub from: String,
    pub to: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InlineScript {
    pub length: usize,
    pub tracker_signature_present: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptInventory {
    pub external_urls: Vec<String>,
    pub inline: Vec<InlineScript>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FingerprintFlags {
    pub canvas: bool,
    pub webgl: bool,
    pub font: bool,
    pub keylogger: bool,
    pub form_snooping: bool,
    pub service_worker: bool,
    pub beacon_calls: Vec<BeaconCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconCall {
    pub url: String,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    /// Unix seconds; None = session cookie.
    pub expires: Option<f64>,
}

/// Everything captured on a single page (spec.md §3 "Crawl Artifact").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PageArtifact {
    pub url: String,
    pub is_homepage: bool,
    pub status: Option<u16>,
    pub requests: Vec<RequestRecord>,
    pub response_headers: HashMap<String, String>,
    pub redirects: Vec<RedirectHop>,
    pub websocket_urls: Vec<String>,
    pub fingerprints: FingerprintFlags,
    pub scripts: ScriptInventory,
    pub storage_snapshot: HashMap<String, String>,
    pub internal_links: Vec<String>,
    pub body_text_prefix: String,
}

/// Aggregate crawl record returned by the Crawl Engine for one target (spec.md §4.H step 9).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrawlRecord {
    pub target_url: String,
    pub is_https: bool,
    pub pages: Vec<PageArtifact>,
    pub cookies: Vec<CookieRecord>,
}
