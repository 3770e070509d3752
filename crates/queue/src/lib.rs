//! Work Queue (component F): a durable at-least-once FIFO with priority, retry/backoff,
//! stall recovery, and a dead-letter destination, backed by Redis (spec.md §4.F).
//!
//! Ready items live in two lists (priority jumps the line), leased items carry a
//! visibility-timeout entry in a sorted set scored by lease expiry, and delayed
//! retries live in a sorted set scored by their next-ready time. A periodic sweep
//! promotes due delayed items and recovers stalled leases.

use std::time::Duration;

use chrono::Utc;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const READY_HIGH: &str = "pa:queue:ready:high";
const READY_NORMAL: &str = "pa:queue:ready:normal";
const LEASES: &str = "pa:queue:leases";
const DELAYED: &str = "pa:queue:delayed";
const ITEMS: &str = "pa:queue:items";
const DLQ: &str = "pa:queue:dlq";
const COMPLETED_EVENTS: &str = "pa:queue:events:completed";
const FAILED_EVENTS: &str = "pa:queue:events:failed";

const COMPLETED_RETAIN_COUNT: isize = 500;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(String),
    #[error("pool error: {0}")]
    Pool(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Redis(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub job_id: Uuid,
    pub url: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub original_job_id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub job_id: Uuid,
    pub at: chrono::DateTime<Utc>,
    pub detail: Option<String>,
}

pub struct WorkQueue {
    redis: Pool,
    max_attempts: u32,
    lease_seconds: u64,
}

impl WorkQueue {
    pub fn new(redis_url: &str, max_attempts: u32, lease_seconds: u64) -> Result<Self, QueueError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::Pool(e.to_string()))?;
        Ok(Self {
            redis: pool,
            max_attempts,
            lease_seconds,
        })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, QueueError> {
        self.redis.get().await.map_err(|e| QueueError::Pool(e.to_string()))
    }

    /// Push `{jobId, url}` onto the ready list (spec.md §4.F "opaque payload").
    pub async fn enqueue(&self, job_id: Uuid, url: &str, priority: Priority) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let item = QueueItem { job_id, url: url.to_string(), attempts: 0 };
        let payload = serde_json::to_string(&item).map_err(|e| QueueError::Redis(e.to_string()))?;
        let _: () = conn.hset(ITEMS, job_id.to_string(), &payload).await?;
        let list = match priority {
            Priority::High => READY_HIGH,
            Priority::Normal => READY_NORMAL,
        };
        let _: () = conn.lpush(list, job_id.to_string()).await?;
        Ok(())
    }

    /// Claim the next ready item, if any, and start its lease. High-priority items are
    /// drained before normal-priority ones.
    pub async fn claim(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.conn().await?;

        self.promote_due_delayed(&mut conn).await?;

        let id: Option<String> = conn.rpop(READY_HIGH, None).await?;
        let id = match id {
            Some(id) => Some(id),
            None => conn.rpop(READY_NORMAL, None).await?,
        };
        let Some(id) = id else { return Ok(None) };

        let raw: Option<String> = conn.hget(ITEMS, &id).await?;
        let Some(raw) = raw else { return Ok(None) };
        let item: QueueItem = serde_json::from_str(&raw).map_err(|e| QueueError::Redis(e.to_string()))?;

        let lease_until = (Utc::now() + Duration::from_secs(self.lease_seconds)).timestamp();
        let _: () = conn.zadd(LEASES, &id, lease_until).await?;

        Ok(Some(item))
    }

    /// Renew a held lease. Must be called strictly more often than half the lease
    /// duration (spec.md §8 shared-resource policy) — callers renew on a 30s tick
    /// against a 120s default lease.
    pub async fn renew_lease(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let lease_until = (Utc::now() + Duration::from_secs(self.lease_seconds)).timestamp();
        let _: () = conn.zadd(LEASES, job_id.to_string(), lease_until).await?;
        Ok(())
    }

    /// Mark a claimed job complete: drop its lease and item, record a lifecycle event,
    /// and trim the completed-event log to the retention policy (age 2h or last 500).
    pub async fn ack_success(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrem(LEASES, job_id.to_string()).await?;
        let _: () = conn.hdel(ITEMS, job_id.to_string()).await?;
        self.record_event(&mut conn, COMPLETED_EVENTS, job_id, None).await?;
        self.trim_completed(&mut conn).await?;
        Ok(())
    }

    /// Worker exception path (spec.md §4.F Worker Pool). Below the attempt limit the
    /// job is re-queued after exponential backoff (5s → 20s → escalate); at the limit
    /// it is duplicated to the DLQ and the caller should set Job→FAILED.
    pub async fn ack_failure(
        &self,
        item: &QueueItem,
        error: &str,
    ) -> Result<FailureOutcome, QueueError> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrem(LEASES, item.job_id.to_string()).await?;

        let next_attempt = item.attempts + 1;
        if next_attempt < self.max_attempts {
            let retried = QueueItem { attempts: next_attempt, ..item.clone() };
            let payload = serde_json::to_string(&retried).map_err(|e| QueueError::Redis(e.to_string()))?;
            let _: () = conn.hset(ITEMS, item.job_id.to_string(), &payload).await?;
            let ready_at = (Utc::now() + backoff_delay(next_attempt)).timestamp();
            let _: () = conn.zadd(DELAYED, item.job_id.to_string(), ready_at).await?;
            Ok(FailureOutcome::Retrying { next_attempt })
        } else {
            let _: () = conn.hdel(ITEMS, item.job_id.to_string()).await?;
            let record = DlqRecord {
                original_job_id: item.job_id,
                job_id: item.job_id,
                url: item.url.clone(),
                error: error.to_string(),
                attempts: next_attempt,
                failed_at: Utc::now(),
            };
            let payload = serde_json::to_string(&record).map_err(|e| QueueError::Redis(e.to_string()))?;
            let _: () = conn.lpush(DLQ, &payload).await?;
            self.record_event(&mut conn, FAILED_EVENTS, item.job_id, Some(error.to_string())).await?;
            self.trim_failed(&mut conn).await?;
            Ok(FailureOutcome::Exhausted)
        }
    }

    /// Stall recovery (spec.md §4.F): re-queue leases that lapsed without renewal, not
    /// consuming an attempt. Intended to run on a 30s interval.
    pub async fn recover_stalled(&self) -> Result<Vec<Uuid>, QueueError> {
        let mut conn = self.conn().await?;
        let now = Utc::now().timestamp();
        let expired: Vec<String> = conn.zrangebyscore(LEASES, 0, now).await?;

        let mut recovered = Vec::new();
        for id_str in expired {
            let _: () = conn.zrem(LEASES, &id_str).await?;
            let _: () = conn.lpush(READY_NORMAL, &id_str).await?;
            if let Ok(id) = Uuid::parse_str(&id_str) {
                recovered.push(id);
            }
        }
        Ok(recovered)
    }

    async fn promote_due_delayed(&self, conn: &mut deadpool_redis::Connection) -> Result<(), QueueError> {
        let now = Utc::now().timestamp();
        let due: Vec<String> = conn.zrangebyscore(DELAYED, 0, now).await?;
        for id in due {
            let _: () = conn.zrem(DELAYED, &id).await?;
            let _: () = conn.lpush(READY_NORMAL, &id).await?;
        }
        Ok(())
    }

    /// Record a lifecycle event in a sorted set scored by its timestamp (ms), so the
    /// completed/failed logs can be trimmed by age as well as by count.
    async fn record_event(
        &self,
        conn: &mut deadpool_redis::Connection,
        zset: &str,
        job_id: Uuid,
        detail: Option<String>,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let event = LifecycleEvent { job_id, at: now, detail };
        let payload = serde_json::to_string(&event).map_err(|e| QueueError::Redis(e.to_string()))?;
        let _: () = conn.zadd(zset, &payload, now.timestamp_millis()).await?;
        Ok(())
    }

    /// Retention policy for completed jobs: last 500, or 2h, whichever discards more
    /// (spec.md §4.F).
    async fn trim_completed(&self, conn: &mut deadpool_redis::Connection) -> Result<(), QueueError> {
        let count: isize = conn.zcard(COMPLETED_EVENTS).await?;
        if count > COMPLETED_RETAIN_COUNT {
            let _: () = conn
                .zremrangebyrank(COMPLETED_EVENTS, 0, count - COMPLETED_RETAIN_COUNT - 1)
                .await?;
        }
        let cutoff = (Utc::now() - chrono::Duration::hours(2)).timestamp_millis();
        let _: () = conn.zrembyscore(COMPLETED_EVENTS, 0, cutoff).await?;
        Ok(())
    }

    /// Retention policy for failed jobs: 24h (spec.md §4.F).
    async fn trim_failed(&self, conn: &mut deadpool_redis::Connection) -> Result<(), QueueError> {
        let cutoff = (Utc::now() - chrono::Duration::hours(24)).timestamp_millis();
        let _: () = conn.zrembyscore(FAILED_EVENTS, 0, cutoff).await?;
        Ok(())
    }

    pub async fn dlq_len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(DLQ).await?)
    }

    /// Waiting depth: items sitting in either ready list, not yet claimed.
    pub async fn waiting_len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        let high: i64 = conn.llen(READY_HIGH).await?;
        let normal: i64 = conn.llen(READY_NORMAL).await?;
        Ok(high + normal)
    }

    /// Active depth: items currently held under a worker lease.
    pub async fn active_len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(LEASES).await?)
    }

    /// Delayed depth: items backed off after a retriable failure, awaiting their
    /// next-ready time.
    pub async fn delayed_len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(DELAYED).await?)
    }

    /// Completed depth, after retention trimming.
    pub async fn completed_len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(COMPLETED_EVENTS).await?)
    }

    /// Failed depth, after retention trimming.
    pub async fn failed_len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(FAILED_EVENTS).await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { next_attempt: u32 },
    Exhausted,
}

/// Exponential backoff schedule: 5s base, 20s on the second attempt, then escalate
/// (spec.md §4.F "exponential backoff (5s base → 20s → escalate)").
fn backoff_delay(attempt: u32) -> Duration {
    match attempt {
        1 => Duration::from_secs(5),
        2 => Duration::from_secs(20),
        _ => Duration::from_secs(20),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_matches_spec() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(20));
        assert_eq!(backoff_delay(3), Duration::from_secs(20));
    }
}
