//! Worker Pool (component G): a bounded number of concurrent executors that lease
//! jobs from the Work Queue, run them through the Crawl Engine and Analysis Pipeline,
//! and commit the result back to the Job Store (spec.md §4.G).

pub mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use pa_analysis::threat_feed::ThreatFeed;
use pa_analysis::AnalysisPipeline;
use pa_core::JobStatus;
use pa_engine::CrawlEngine;
use pa_queue::{FailureOutcome, QueueItem, WorkQueue};
use pa_store::Store;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use metrics::Metrics;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STALL_RECOVERY_INTERVAL: Duration = Duration::from_secs(30);
const LEASE_RENEWAL_INTERVAL: Duration = Duration::from_secs(30);

pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    store: Arc<Store>,
    engine: Arc<CrawlEngine>,
    threat_feed: Arc<dyn ThreatFeed>,
    concurrency: usize,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<WorkQueue>,
        store: Arc<Store>,
        engine: Arc<CrawlEngine>,
        threat_feed: Arc<dyn ThreatFeed>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            store,
            engine,
            threat_feed,
            concurrency,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the pool until `shutdown` fires, then wait for in-flight jobs to finish
    /// (mirrors the teacher's spawn-N-workers-against-a-broadcast-shutdown idiom).
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(concurrency = self.concurrency, "worker pool starting");

        let mut handles = Vec::with_capacity(self.concurrency + 1);

        {
            let pool = Arc::clone(&self);
            let mut shutdown = shutdown.resubscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!("stall-recovery task shutting down");
                            break;
                        }
                        _ = sleep(STALL_RECOVERY_INTERVAL) => {
                            match pool.queue.recover_stalled().await {
                                Ok(recovered) if !recovered.is_empty() => {
                                    warn!(count = recovered.len(), "recovered stalled leases");
                                }
                                Ok(_) => {}
                                Err(e) => error!(error = %e, "stall recovery failed"),
                            }
                        }
                    }
                }
            }));
        }

        for worker_id in 0..self.concurrency {
            let pool = Arc::clone(&self);
            let mut shutdown = shutdown.resubscribe();
            handles.push(tokio::spawn(async move {
                info!(worker_id, "worker started");
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!(worker_id, "worker shutting down");
                            break;
                        }
                        _ = async {
                            match pool.queue.claim().await {
                                Ok(Some(item)) => pool.process(worker_id, item).await,
                                Ok(None) => sleep(IDLE_POLL_INTERVAL).await,
                                Err(e) => {
                                    error!(worker_id, error = %e, "queue claim failed");
                                    sleep(IDLE_POLL_INTERVAL).await;
                                }
                            }
                        } => {}
                    }
                }
            }));
        }

        let _ = shutdown.recv().await;
        for handle in handles {
            let _ = handle.await;
        }
        info!("worker pool shutdown complete");
    }

    /// Process one claimed item through the full per-job lifecycle (spec.md §4.G).
    async fn process(&self, worker_id: usize, item: QueueItem) {
        self.metrics.record_started();
        let start = Instant::now();

        let job = match self.store.find_by_id(item.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Job was deleted externally; the cancellation contract treats this as
                // a no-op success rather than an error (spec.md §4.G "Cancellation").
                info!(worker_id, job_id = %item.job_id, "job vanished, treating as no-op success");
                let _ = self.queue.ack_success(item.job_id).await;
                self.metrics.record_succeeded();
                return;
            }
            Err(e) => {
                error!(worker_id, job_id = %item.job_id, error = %e, "failed to load job");
                return;
            }
        };

        if job.status.is_terminal() {
            // Duplicate delivery of an already-finished job; ack and move on.
            let _ = self.queue.ack_success(item.job_id).await;
            return;
        }

        match self.store.mark_running(job.id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(worker_id, job_id = %job.id, "job was already SUCCESS or gone at claim time, skipping");
                let _ = self.queue.ack_success(item.job_id).await;
                return;
            }
            Err(e) => {
                error!(worker_id, job_id = %job.id, error = %e, "failed to mark job RUNNING");
                return;
            }
        }

        let (renew_stop_tx, mut renew_stop_rx) = tokio::sync::oneshot::channel::<()>();
        let renew_handle = {
            let queue = Arc::clone(&self.queue);
            let job_id = job.id;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = &mut renew_stop_rx => break,
                        _ = sleep(LEASE_RENEWAL_INTERVAL) => {
                            if let Err(e) = queue.renew_lease(job_id).await {
                                warn!(job_id = %job_id, error = %e, "lease renewal failed");
                            }
                        }
                    }
                }
            })
        };

        let outcome = self.run_job(&job.target_url, job.id).await;
        let _ = renew_stop_tx.send(());
        let _ = renew_handle.await;

        self.metrics.record_duration(start.elapsed());

        match outcome {
            Ok(result) => {
                if let Err(e) = self.store.complete_success(job.id, &result).await {
                    error!(worker_id, job_id = %job.id, error = %e, "failed to commit result");
                    return;
                }
                if let Err(e) = self.queue.ack_success(item.job_id).await {
                    error!(worker_id, job_id = %job.id, error = %e, "failed to ack queue success");
                }
                self.metrics.record_succeeded();
                info!(worker_id, job_id = %job.id, score = result.score, "job succeeded");
            }
            Err(message) => {
                self.metrics.record_failed();
                let failure_outcome = match self.queue.ack_failure(&item, &message).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(worker_id, job_id = %job.id, error = %e, "failed to ack queue failure");
                        FailureOutcome::Exhausted
                    }
                };
                // Either outcome leaves the Job FAILED; only the queue's internal
                // routing differs (delayed-retry list vs DLQ). A later retry revives
                // it via `mark_running`'s FAILED -> RUNNING path (spec.md §3 invariant
                // (i), the one documented non-monotonic status jump).
                let _ = self
                    .store
                    .transition(job.id, JobStatus::Running, JobStatus::Failed, Some(&message))
                    .await;
                match failure_outcome {
                    FailureOutcome::Retrying { next_attempt } => {
                        warn!(worker_id, job_id = %job.id, next_attempt, error = %message, "job failed, will retry");
                    }
                    FailureOutcome::Exhausted => {
                        error!(worker_id, job_id = %job.id, error = %message, "job failed permanently, moved to DLQ");
                    }
                }
            }
        }
    }

    async fn run_job(&self, target_url: &str, job_id: Uuid) -> Result<pa_core::ScanResult, String> {
        let record = self
            .engine
            .crawl(target_url)
            .await
            .map_err(|e| e.truncated_message())?;

        let pipeline = AnalysisPipeline::new(self.threat_feed.as_ref());
        Ok(pipeline.analyze(job_id, &record).await)
    }
}
