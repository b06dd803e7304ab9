//! Retroactive replay as a background job: a typed payload on a bounded
//! queue, a worker task that drains it through the same executor as the
//! synchronous path, retry with backoff, and a completion channel for
//! the host to surface results. Idempotent actions are what make the
//! at-least-once retry policy safe.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::RuleError;
use crate::metrics::METRICS;
use crate::RuleEngine;

/// What a retroactive job replays: one rule, or a whole group's active
/// rules in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum JobTarget {
    Rule(u64),
    Group(u64),
}

/// Durable job payload: the rule or group to replay, whose transactions,
/// and the window to replay over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetroJob {
    pub target: JobTarget,
    pub user_id: u64,
    /// Restrict the scan to these accounts; empty means all accounts.
    pub account_ids: Vec<u64>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Counts reported when a retroactive run finishes. How these reach the
/// user (flash message, notification) is the host's concern.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub scanned: u64,
    pub matched: u64,
    pub actions_applied: u64,
    pub failures: u64,
    /// The run observed its cancellation flag and stopped early. Nothing
    /// is half-applied; counts cover what ran before the stop.
    pub cancelled: bool,
}

/// Cooperative cancellation handle, checked between journals.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Delivered on the completion channel after each job, success or not.
#[derive(Debug)]
pub struct JobCompletion {
    pub job: RetroJob,
    pub result: Result<RunReport, String>,
}

struct QueuedJob {
    job: RetroJob,
    cancel: CancelFlag,
}

/// Handle for enqueueing retroactive jobs. The bounded channel applies
/// backpressure when the host outruns the worker.
pub struct JobQueue {
    sender: mpsc::Sender<QueuedJob>,
}

impl JobQueue {
    /// Build a queue and its worker. The caller spawns the worker
    /// (`tokio::spawn(worker.run())`) and keeps the completion receiver.
    pub fn new(
        engine: Arc<RuleEngine>,
    ) -> (Self, JobWorker, mpsc::UnboundedReceiver<JobCompletion>) {
        let capacity = engine.config().max_pending_jobs.max(1);
        let max_retries = engine.config().job_max_retries;
        let (tx, rx) = mpsc::channel(capacity);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let worker = JobWorker {
            receiver: rx,
            engine,
            completions: done_tx,
            max_retries,
        };
        (Self { sender: tx }, worker, done_rx)
    }

    /// Enqueue a job, waiting if the queue is full. Returns the job's
    /// cancellation flag.
    pub async fn enqueue(&self, job: RetroJob) -> anyhow::Result<CancelFlag> {
        let cancel = CancelFlag::new();
        self.sender
            .send(QueuedJob {
                job,
                cancel: cancel.clone(),
            })
            .await
            .map_err(|e| anyhow::anyhow!("failed to enqueue retroactive job: {e}"))?;
        Ok(cancel)
    }

    /// Non-blocking enqueue; errors if the queue is full.
    pub fn try_enqueue(&self, job: RetroJob) -> anyhow::Result<CancelFlag> {
        let cancel = CancelFlag::new();
        self.sender
            .try_send(QueuedJob {
                job,
                cancel: cancel.clone(),
            })
            .map_err(|e| anyhow::anyhow!("retroactive job queue full (backpressure): {e}"))?;
        Ok(cancel)
    }
}

/// Drains the job queue, one job at a time, through the engine.
pub struct JobWorker {
    receiver: mpsc::Receiver<QueuedJob>,
    engine: Arc<RuleEngine>,
    completions: mpsc::UnboundedSender<JobCompletion>,
    max_retries: u32,
}

impl JobWorker {
    pub async fn run(mut self) {
        info!("retroactive job worker started");
        while let Some(queued) = self.receiver.recv().await {
            let result = self.run_with_retry(&queued).await;
            match &result {
                Ok(report) => {
                    METRICS.jobs_completed.fetch_add(1, Ordering::Relaxed);
                    info!(
                        user_id = queued.job.user_id,
                        scanned = report.scanned,
                        matched = report.matched,
                        actions_applied = report.actions_applied,
                        failures = report.failures,
                        cancelled = report.cancelled,
                        "retroactive job finished"
                    );
                }
                Err(e) => {
                    METRICS.jobs_failed.fetch_add(1, Ordering::Relaxed);
                    error!(user_id = queued.job.user_id, error = %e, "retroactive job failed permanently");
                }
            }
            let completion = JobCompletion {
                job: queued.job,
                result: result.map_err(|e| e.to_string()),
            };
            if self.completions.send(completion).is_err() {
                debug!("completion receiver dropped");
            }
        }
        info!("retroactive job worker stopped");
    }

    async fn run_with_retry(&self, queued: &QueuedJob) -> Result<RunReport, RuleError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(2_u64.pow(attempt - 1));
                debug!(
                    user_id = queued.job.user_id,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying retroactive job"
                );
                sleep(delay).await;
            }

            match self.engine.run_retroactive(&queued.job, &queued.cancel).await {
                Ok(report) => {
                    if attempt > 0 {
                        info!(
                            user_id = queued.job.user_id,
                            attempt, "retroactive job succeeded after retry"
                        );
                    }
                    return Ok(report);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!(user_id = queued.job.user_id, attempt, error = %e, "retroactive job failed, will retry");
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RuleError::MutationFailed("retroactive job never ran".into())))
    }
}
