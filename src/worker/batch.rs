//! Batch worker draining the deferred store.

use crate::config::WorkerConfig;
use crate::gatekeeper::decision::Tier;
use crate::queue::{DeferredStore, QueueError, QueueRecord, QueueResult};
use crate::worker::engine::ExecutionEngine;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error recorded on claimed records that were never dispatched because the
/// worker was asked to stop.
pub const CANCELLED_ERROR: &str = "cancelled: worker stopped before dispatch";

/// Upper bound for the retry delay after a failed claim.
const MAX_CLAIM_BACKOFF: Duration = Duration::from_secs(300);

/// Counts for one claim → execute → record cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Claimed but not dispatched because of a stop request; recorded as failed.
    pub cancelled: usize,
    /// Terminal status could not be written; the record stays `processing`.
    pub unrecorded: usize,
}

impl CycleReport {
    fn absorb(&mut self, other: &CycleReport) {
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.unrecorded += other.unrecorded;
    }
}

/// Polls the store, claims a batch, executes each record and records the
/// terminal status. Never retries.
pub struct BatchWorker {
    store: Arc<dyn DeferredStore>,
    engine: Arc<dyn ExecutionEngine>,
    batch_size: usize,
    tier_filter: Option<Tier>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl BatchWorker {
    pub fn new(
        store: Arc<dyn DeferredStore>,
        engine: Arc<dyn ExecutionEngine>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            batch_size: config.batch_size.max(1),
            tier_filter: config.tier_filter,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Token that stops the worker. Cancelling it lets the in-flight record
    /// finish; no further records are dispatched and no further claims made.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a single cycle. A failed claim is returned to the caller.
    pub async fn run_once(&self) -> QueueResult<CycleReport> {
        let mut report = CycleReport::default();
        if self.cancel.is_cancelled() {
            return Ok(report);
        }

        let (limit, tier) = (self.batch_size, self.tier_filter);
        let batch = self
            .with_store(move |store| store.claim(limit, tier))
            .await?;
        report.claimed = batch.len();
        if batch.is_empty() {
            return Ok(report);
        }
        tracing::debug!(claimed = batch.len(), "claimed batch");

        let mut records = batch.into_iter();
        while let Some(record) = records.next() {
            if self.cancel.is_cancelled() {
                self.abandon(std::iter::once(record).chain(records), &mut report)
                    .await;
                break;
            }
            self.dispatch(record, &mut report).await;
        }

        tracing::info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            cancelled = report.cancelled,
            "batch cycle finished"
        );
        Ok(report)
    }

    /// Daemon loop: sleep after an empty poll, poll again straight away after
    /// a non-empty batch, back off after claim failures. Returns the totals
    /// once the stop token fires.
    pub async fn run(&self) -> CycleReport {
        let mut totals = CycleReport::default();
        let mut backoff = self.poll_interval.max(Duration::from_secs(1));

        tracing::info!(
            batch_size = self.batch_size,
            tier = ?self.tier_filter,
            "batch worker started"
        );

        while !self.cancel.is_cancelled() {
            let delay = match self.run_once().await {
                Ok(report) => {
                    totals.absorb(&report);
                    backoff = self.poll_interval.max(Duration::from_secs(1));
                    if report.claimed > 0 {
                        continue;
                    }
                    self.poll_interval
                }
                Err(e) => {
                    tracing::error!("claim failed, retrying in {}s: {e}", backoff.as_secs());
                    let delay = backoff;
                    backoff = (backoff * 2).min(MAX_CLAIM_BACKOFF);
                    delay
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(
            claimed = totals.claimed,
            completed = totals.completed,
            failed = totals.failed,
            cancelled = totals.cancelled,
            "batch worker stopped"
        );
        totals
    }

    async fn dispatch(&self, record: QueueRecord, report: &mut CycleReport) {
        let request_id = record.request_id;
        match self.engine.execute(&request_id, &record.payload).await {
            Ok(result) => {
                let id = request_id.clone();
                match self.with_store(move |s| s.complete(&id, &result)).await {
                    Ok(()) => {
                        report.completed += 1;
                        tracing::info!(request_id = %request_id, outcome = "completed", "record processed");
                    }
                    Err(e) => self.unrecorded(&request_id, &e, report),
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                let id = request_id.clone();
                let logged = message.clone();
                match self.with_store(move |s| s.fail(&id, &message)).await {
                    Ok(()) => {
                        report.failed += 1;
                        tracing::warn!(
                            request_id = %request_id,
                            outcome = "failed",
                            "record failed: {logged}"
                        );
                    }
                    Err(e) => self.unrecorded(&request_id, &e, report),
                }
            }
        }
    }

    async fn abandon(
        &self,
        records: impl Iterator<Item = QueueRecord>,
        report: &mut CycleReport,
    ) {
        for record in records {
            let id = record.request_id.clone();
            match self.with_store(move |s| s.fail(&id, CANCELLED_ERROR)).await {
                Ok(()) => {
                    report.cancelled += 1;
                    tracing::info!(request_id = %record.request_id, outcome = "cancelled", "record not dispatched");
                }
                Err(e) => self.unrecorded(&record.request_id, &e, report),
            }
        }
    }

    fn unrecorded(&self, request_id: &str, err: &QueueError, report: &mut CycleReport) {
        report.unrecorded += 1;
        tracing::error!(
            request_id = %request_id,
            "failed to record terminal status, record left processing: {err}"
        );
    }

    /// Run a store call on the blocking pool; SQLite may wait on a lock.
    async fn with_store<T, F>(&self, f: F) -> QueueResult<T>
    where
        F: FnOnce(&dyn DeferredStore) -> QueueResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| QueueError::StorageUnavailable(format!("store task failed: {e}")))?
    }
}
