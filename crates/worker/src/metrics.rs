use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Worker Pool metrics (spec.md §4.G): per-job duration timer, lifecycle counters, and
/// a duration histogram. No metrics crate appears anywhere in the reference corpus, so
/// this is a small hand-rolled atomic counter set rather than pulling in one.
#[derive(Default)]
pub struct Metrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cached: AtomicU64,
    ssrf_blocked: AtomicU64,
    validation_errors: AtomicU64,
    bucket_lt10: AtomicU64,
    bucket_lt30: AtomicU64,
    bucket_lt60: AtomicU64,
    bucket_lt90: AtomicU64,
    bucket_ge90: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cached: u64,
    pub ssrf_blocked: u64,
    pub validation_errors: u64,
    pub duration_buckets: DurationBuckets,
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationBuckets {
    #[serde(rename = "lt10s")]
    pub lt10: u64,
    #[serde(rename = "lt30s")]
    pub lt30: u64,
    #[serde(rename = "lt60s")]
    pub lt60: u64,
    #[serde(rename = "lt90s")]
    pub lt90: u64,
    #[serde(rename = "ge90s")]
    pub ge90: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cached(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ssrf_blocked(&self) {
        self.ssrf_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Bucket a job's wall-clock duration (spec.md §4.G histogram buckets).
    pub fn record_duration(&self, elapsed: std::time::Duration) {
        let secs = elapsed.as_secs_f64();
        let bucket = if secs < 10.0 {
            &self.bucket_lt10
        } else if secs < 30.0 {
            &self.bucket_lt30
        } else if secs < 60.0 {
            &self.bucket_lt60
        } else if secs < 90.0 {
            &self.bucket_lt90
        } else {
            &self.bucket_ge90
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            ssrf_blocked: self.ssrf_blocked.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            duration_buckets: DurationBuckets {
                lt10: self.bucket_lt10.load(Ordering::Relaxed),
                lt30: self.bucket_lt30.load(Ordering::Relaxed),
                lt60: self.bucket_lt60.load(Ordering::Relaxed),
                lt90: self.bucket_lt90.load(Ordering::Relaxed),
                ge90: self.bucket_ge90.load(Ordering::Relaxed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_duration_correctly() {
        let m = Metrics::new();
        m.record_duration(std::time::Duration::from_secs(5));
        m.record_duration(std::time::Duration::from_secs(45));
        m.record_duration(std::time::Duration::from_secs(120));
        let snap = m.snapshot();
        assert_eq!(snap.duration_buckets.lt10, 1);
        assert_eq!(snap.duration_buckets.lt60, 1);
        assert_eq!(snap.duration_buckets.ge90, 1);
    }
}
