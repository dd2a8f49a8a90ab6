use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use relay_core::{BackoffPolicy, Job, JobStatus, Notice, Notifier, QueueError, QueueStore};
use tokio::time::Instant;

use crate::client::{Delivery, Downstream};

/// Counters for one drain cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DrainReport {
    pub selected: usize,
    pub delivered: usize,
    pub duplicates: usize,
    pub retried: usize,
    pub failed: usize,
    /// Jobs that changed or stopped being due between selection and delivery.
    pub skipped: usize,
    /// The liveness probe said the downstream is down; nothing was attempted.
    pub downstream_down: bool,
    /// The cycle ran out of time before reaching every selected job.
    pub budget_exhausted: bool,
}

/// Delivers due jobs, one at a time, and records each result in the store.
pub struct Scheduler {
    store: Arc<dyn QueueStore>,
    downstream: Arc<dyn Downstream>,
    notifier: Arc<dyn Notifier>,
    backoff: BackoffPolicy,
    liveness_gate: bool,
    max_attempts: Option<u32>,
    cycle_budget: Duration,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        downstream: Arc<dyn Downstream>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            downstream,
            notifier,
            backoff: BackoffPolicy::default(),
            liveness_gate: true,
            max_attempts: None,
            cycle_budget: Duration::from_secs(60),
            running: AtomicBool::new(false),
        }
    }

    /// Probe the downstream before each cycle and skip the cycle when it is down.
    pub fn with_liveness_gate(mut self, enabled: bool) -> Self {
        self.liveness_gate = enabled;
        self
    }

    /// Move a job to `failed` once it has been attempted this many times.
    pub fn with_max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Stop picking up new jobs once a cycle has run this long.
    pub fn with_cycle_budget(mut self, budget: Duration) -> Self {
        self.cycle_budget = budget;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one drain cycle. Returns `Ok(None)` without doing anything when
    /// another cycle is still in progress.
    pub async fn tick(&self) -> Result<Option<DrainReport>, QueueError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        let _running = RunningGuard(&self.running);
        self.cycle().await.map(Some)
    }

    async fn cycle(&self) -> Result<DrainReport, QueueError> {
        let started = Instant::now();
        let mut report = DrainReport::default();

        if self.liveness_gate && !self.downstream.probe().await {
            tracing::warn!("downstream unreachable, skipping drain cycle");
            report.downstream_down = true;
            return Ok(report);
        }

        let now = Utc::now();
        let due: Vec<String> = self
            .store
            .read_all()
            .await?
            .into_iter()
            .filter(|j| j.is_due(now))
            .map(|j| j.id)
            .collect();
        report.selected = due.len();

        for id in &due {
            if started.elapsed() >= self.cycle_budget {
                tracing::warn!(
                    budget_ms = self.cycle_budget.as_millis() as u64,
                    "drain cycle budget exhausted, deferring remaining jobs"
                );
                report.budget_exhausted = true;
                break;
            }
            self.attempt(id, &mut report).await?;
        }

        Ok(report)
    }

    async fn attempt(&self, id: &str, report: &mut DrainReport) -> Result<(), QueueError> {
        // Fresh read: an enqueue or a manual drain may have touched the log.
        let jobs = self.store.read_all().await?;
        let Some(current) = jobs
            .into_iter()
            .rev()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
        else {
            report.skipped += 1;
            return Ok(());
        };
        if !current.is_due(Utc::now()) {
            report.skipped += 1;
            return Ok(());
        }

        let delivery = self.downstream.deliver(id).await;
        let now = Utc::now();
        let updated = self.apply(&current, &delivery, now);

        if !self.store.swap(&current, &updated).await? {
            tracing::warn!(job_id = %id, "job changed during delivery, result dropped");
            report.skipped += 1;
            return Ok(());
        }

        match (&delivery, updated.status) {
            (Delivery::Success, _) => report.delivered += 1,
            (Delivery::Duplicate, _) => report.duplicates += 1,
            (Delivery::Retryable(_), JobStatus::Failed) => report.failed += 1,
            (Delivery::Retryable(_), _) => report.retried += 1,
        }

        match updated.status {
            JobStatus::Done => {
                tracing::info!(job_id = %id, attempts = updated.attempts, "job done");
                self.notifier
                    .notify(&updated.origin, Notice::Delivered { id: updated.id.clone() })
                    .await;
            }
            JobStatus::Failed => {
                tracing::error!(
                    job_id = %id,
                    attempts = updated.attempts,
                    last_error = updated.last_error.as_deref().unwrap_or_default(),
                    "job failed permanently"
                );
            }
            JobStatus::Pending => {
                tracing::info!(
                    job_id = %id,
                    attempts = updated.attempts,
                    next_attempt_at = ?updated.next_attempt_at,
                    "job will be retried"
                );
            }
        }
        Ok(())
    }

    fn apply(&self, current: &Job, delivery: &Delivery, now: DateTime<Utc>) -> Job {
        let mut next = current.clone();
        match delivery {
            Delivery::Success | Delivery::Duplicate => next.record_success(now),
            Delivery::Retryable(error) => {
                let delay = self.backoff.delay(current.attempts.saturating_add(1));
                let retry_at = TimeDelta::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                next.record_failure(error, retry_at, now);
                if self.max_attempts.is_some_and(|max| next.attempts >= max) {
                    next.mark_failed(now);
                }
            }
        }
        next
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
