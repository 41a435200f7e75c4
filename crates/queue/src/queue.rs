//! Keyed, at-least-once job queue.
//!
//! Semantics:
//! - Enqueue is idempotent per dedup key (the lead ID): while a job for that
//!   key is pending or active, further enqueues coalesce into it.
//! - Handler failure retries with exponential backoff up to the attempt
//!   ceiling, then the job and its last error go to the dead-letter sink.
//! - A periodic sweep requeues active jobs whose deadline passed (worker
//!   died or hung mid-processing). Delivery is therefore at-least-once and
//!   handlers must tolerate redelivery.
//! - Worker-task count bounds in-flight concurrency.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scoring_core::{Error, Result, ScoringJob};
use telemetry::metrics;

use crate::config::QueueConfig;

/// Handles one delivery of a scoring job.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ScoringJob) -> Result<()>;
}

/// Terminal-failure hook: receives jobs that exhausted their attempts.
#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, job: ScoringJob, attempts: u32, error: &Error) -> Result<()>;
}

/// Outcome of an enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A job with the same dedup key is already pending or active.
    Coalesced,
}

#[derive(Debug, Clone)]
struct QueuedJob {
    job: ScoringJob,
    /// Completed delivery attempts.
    attempts: u32,
}

#[derive(Default)]
struct State {
    ready: VecDeque<QueuedJob>,
    /// Retry-delayed jobs with their due time.
    delayed: Vec<(Instant, QueuedJob)>,
    /// In-flight jobs by dedup key, with the stall deadline.
    active: HashMap<Uuid, (Instant, QueuedJob)>,
    /// Keys currently in `ready` or `delayed`.
    pending_keys: HashSet<Uuid>,
}

/// The queue. Shared between the enqueue side (gateway, audit) and the
/// worker tasks spawned by [`JobQueue::start`].
pub struct JobQueue {
    config: QueueConfig,
    state: Mutex<State>,
    notify: Notify,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a job, coalescing on the dedup key.
    pub fn enqueue(&self, job: ScoringJob) -> EnqueueOutcome {
        let key = job.dedup_key();
        let mut state = self.state.lock();

        if state.pending_keys.contains(&key) || state.active.contains_key(&key) {
            metrics().jobs_coalesced.inc();
            debug!(lead_id = %key, reason = job.reason.as_str(), "Job coalesced");
            return EnqueueOutcome::Coalesced;
        }

        state.pending_keys.insert(key);
        state.ready.push_back(QueuedJob { job, attempts: 0 });
        drop(state);

        metrics().jobs_enqueued.inc();
        self.notify.notify_one();
        EnqueueOutcome::Enqueued
    }

    /// Whether a job for this key is pending or active. Used by the
    /// reconciler to avoid redundant enqueues.
    pub fn is_scheduled(&self, key: Uuid) -> bool {
        let state = self.state.lock();
        state.pending_keys.contains(&key) || state.active.contains_key(&key)
    }

    /// Jobs waiting for delivery (ready + delayed).
    pub fn depth(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.delayed.len()
    }

    /// Jobs currently being handled.
    pub fn in_flight(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Requeue active jobs whose stall deadline has passed. Returns the
    /// number requeued. Called by the sweep task; public for operators.
    pub fn requeue_stalled(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let stalled: Vec<Uuid> = state
            .active
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(key, _)| *key)
            .collect();

        for key in &stalled {
            if let Some((_, queued)) = state.active.remove(key) {
                warn!(
                    lead_id = %key,
                    attempts = queued.attempts,
                    "Requeueing stalled job"
                );
                state.pending_keys.insert(*key);
                state.ready.push_front(queued);
                metrics().jobs_requeued_stalled.inc();
            }
        }
        drop(state);

        for _ in &stalled {
            self.notify.notify_one();
        }
        stalled.len()
    }

    /// Spawn the worker pool and the stall sweep. Tasks run until the
    /// runtime shuts down.
    pub fn start(
        self: &Arc<Self>,
        handler: Arc<dyn JobHandler>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for worker_id in 0..self.config.max_concurrency {
            let queue = self.clone();
            let handler = handler.clone();
            let dead_letter = dead_letter.clone();
            handles.push(tokio::spawn(async move {
                queue.run_worker(worker_id, handler, dead_letter).await;
            }));
        }

        let queue = self.clone();
        handles.push(tokio::spawn(async move {
            queue.run_sweep().await;
        }));

        info!(
            workers = self.config.max_concurrency,
            max_attempts = self.config.max_attempts,
            "Job queue started"
        );
        handles
    }

    async fn run_sweep(&self) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            ticker.tick().await;
            self.requeue_stalled();
        }
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        handler: Arc<dyn JobHandler>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) {
        debug!(worker_id, "Queue worker started");
        loop {
            let queued = self.next_job().await;
            self.deliver(queued, handler.as_ref(), dead_letter.as_ref())
                .await;
        }
    }

    /// Take the next ready job, promoting due retries; marks it active.
    async fn next_job(&self) -> QueuedJob {
        loop {
            let earliest = {
                let mut state = self.state.lock();
                let now = Instant::now();

                // Promote due retries into the ready queue.
                let mut idx = 0;
                while idx < state.delayed.len() {
                    if state.delayed[idx].0 <= now {
                        let (_, job) = state.delayed.swap_remove(idx);
                        state.ready.push_back(job);
                    } else {
                        idx += 1;
                    }
                }

                if let Some(mut queued) = state.ready.pop_front() {
                    let key = queued.job.dedup_key();
                    state.pending_keys.remove(&key);
                    queued.attempts += 1;
                    let deadline = now + self.config.stall_timeout;
                    state.active.insert(key, (deadline, queued.clone()));
                    metrics().jobs_in_flight.inc();
                    return queued;
                }

                state.delayed.iter().map(|(due, _)| *due).min()
            };

            match earliest {
                Some(due) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = sleep_until(due) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn deliver(
        &self,
        queued: QueuedJob,
        handler: &dyn JobHandler,
        dead_letter: &dyn DeadLetterSink,
    ) {
        let key = queued.job.dedup_key();
        let attempts = queued.attempts;

        let result = handler.handle(&queued.job).await;
        metrics().jobs_in_flight.dec();

        // The sweep may have requeued this job already; if so the active
        // entry is gone and this delivery's result is discarded (the requeued
        // copy owns the retry budget).
        let still_active = self.state.lock().active.remove(&key).is_some();

        match result {
            Ok(()) => {
                metrics().jobs_completed.inc();
                debug!(lead_id = %key, attempts, "Job completed");
            }
            Err(err) if !still_active => {
                warn!(lead_id = %key, error = %err, "Stale delivery failed after requeue");
            }
            Err(err) if attempts >= self.config.max_attempts => {
                error!(
                    lead_id = %key,
                    attempts,
                    error = %err,
                    "Job exhausted attempts, dead-lettering"
                );
                metrics().jobs_dead_lettered.inc();
                if let Err(sink_err) = dead_letter.record(queued.job, attempts, &err).await {
                    error!(lead_id = %key, error = %sink_err, "Dead-letter sink failed");
                }
            }
            Err(err) => {
                let backoff = self.config.backoff_for(attempts);
                warn!(
                    lead_id = %key,
                    attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Job failed, scheduling retry"
                );
                metrics().jobs_retried.inc();

                let mut state = self.state.lock();
                state.pending_keys.insert(key);
                state
                    .delayed
                    .push((Instant::now() + backoff, QueuedJob { ..queued }));
                drop(state);
                self.notify.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use scoring_core::JobReason;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn job(lead_id: Uuid) -> ScoringJob {
        ScoringJob::new(lead_id, Uuid::new_v4(), JobReason::Ingest)
    }

    fn test_config() -> QueueConfig {
        QueueConfig {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(100),
            max_concurrency: 2,
            stall_timeout: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(100),
        }
    }

    struct RecordingHandler {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait::async_trait]
    impl JobHandler for RecordingHandler {
        async fn handle(&self, _job: &ScoringJob) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(Error::unavailable("induced failure"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: PlMutex<Vec<(ScoringJob, u32, String)>>,
    }

    #[async_trait::async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn record(&self, job: ScoringJob, attempts: u32, error: &Error) -> Result<()> {
            self.records.lock().push((job, attempts, error.to_string()));
            Ok(())
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..2000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_enqueue_coalesces_on_key() {
        let queue = JobQueue::new(test_config());
        let lead = Uuid::new_v4();

        assert_eq!(queue.enqueue(job(lead)), EnqueueOutcome::Enqueued);
        assert_eq!(queue.enqueue(job(lead)), EnqueueOutcome::Coalesced);
        assert_eq!(queue.enqueue(job(Uuid::new_v4())), EnqueueOutcome::Enqueued);
        assert_eq!(queue.depth(), 2);
        assert!(queue.is_scheduled(lead));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_delivery_clears_key() {
        let queue = JobQueue::new(test_config());
        let handler = Arc::new(RecordingHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
        });
        let sink = Arc::new(RecordingSink::default());
        let _handles = queue.start(handler.clone(), sink.clone());

        let lead = Uuid::new_v4();
        queue.enqueue(job(lead));

        let h = handler.clone();
        wait_for(move || h.calls.load(Ordering::SeqCst) == 1).await;
        let q = queue.clone();
        wait_for(move || !q.is_scheduled(lead)).await;

        // Key is free again after completion.
        assert_eq!(queue.enqueue(job(lead)), EnqueueOutcome::Enqueued);
        assert!(sink.records.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_then_succeeds() {
        let queue = JobQueue::new(test_config());
        let handler = Arc::new(RecordingHandler {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let sink = Arc::new(RecordingSink::default());
        let _handles = queue.start(handler.clone(), sink.clone());

        queue.enqueue(job(Uuid::new_v4()));

        let h = handler.clone();
        wait_for(move || h.calls.load(Ordering::SeqCst) == 3).await;
        assert!(sink.records.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_dead_letter_exactly_once() {
        let queue = JobQueue::new(test_config());
        let handler = Arc::new(RecordingHandler {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let sink = Arc::new(RecordingSink::default());
        let _handles = queue.start(handler.clone(), sink.clone());

        let lead = Uuid::new_v4();
        queue.enqueue(job(lead));

        let s = sink.clone();
        wait_for(move || !s.records.lock().is_empty()).await;
        // Give any extra (buggy) deliveries a chance to land.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        let (failed_job, attempts, error) = &records[0];
        assert_eq!(failed_job.lead_id, lead);
        assert_eq!(*attempts, 3);
        assert!(error.contains("induced failure"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_job_is_requeued() {
        let mut config = test_config();
        config.stall_timeout = Duration::from_millis(50);
        let queue = JobQueue::new(config);

        struct HangFirstHandler {
            calls: AtomicU32,
        }

        #[async_trait::async_trait]
        impl JobHandler for HangFirstHandler {
            async fn handle(&self, _job: &ScoringJob) -> Result<()> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::future::pending::<()>().await;
                }
                Ok(())
            }
        }

        let handler = Arc::new(HangFirstHandler {
            calls: AtomicU32::new(0),
        });
        let sink = Arc::new(RecordingSink::default());
        let _handles = queue.start(handler.clone(), sink.clone());

        let lead = Uuid::new_v4();
        queue.enqueue(job(lead));

        // First delivery hangs; the sweep requeues and a second worker
        // completes the job.
        let h = handler.clone();
        wait_for(move || h.calls.load(Ordering::SeqCst) >= 2).await;
        let q = queue.clone();
        wait_for(move || q.depth() == 0).await;
        assert!(sink.records.lock().is_empty());
    }
}
