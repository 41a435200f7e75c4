//! Common test setup: an engine over the in-memory backend with the worker
//! pool running, plus polling helpers for the async scoring path.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use lead_scoring_engine::{Engine, EngineConfig, ProjectKeyEntry};
use scoring_core::{EventRecord, FailedJob, Lead, ScoreHistoryEntry};
use scoring_store::{EventStore, FailedJobStore, HistoryStore, LeadStore};

use crate::fixtures;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Engine config tuned for fast tests: tight backoff, small retry budget.
pub fn test_config(project_id: Uuid) -> EngineConfig {
    EngineConfig {
        max_concurrency: 2,
        max_attempts: 3,
        backoff_base_ms: 10,
        project_keys: vec![ProjectKeyEntry {
            key: fixtures::test_api_key(),
            project_id,
        }],
        ..EngineConfig::default()
    }
}

/// A running engine plus the project identity its test key resolves to.
pub struct TestContext {
    pub engine: Arc<Engine>,
    pub project_id: Uuid,
}

impl TestContext {
    /// Engine with queue workers and maintenance tasks running.
    pub async fn new() -> Self {
        let ctx = Self::new_idle().await;
        ctx.engine.start();
        ctx
    }

    /// Engine with no background tasks: submissions enqueue but nothing
    /// consumes the queue.
    pub async fn new_idle() -> Self {
        let project_id = Uuid::new_v4();
        let engine = Engine::new(test_config(project_id))
            .await
            .expect("engine setup failed");
        Self {
            engine: Arc::new(engine),
            project_id,
        }
    }

    pub async fn lead(&self, lead_id: Uuid) -> Lead {
        self.engine
            .storage()
            .get_lead(lead_id)
            .await
            .unwrap()
            .expect("lead not found")
    }

    pub async fn events(&self, lead_id: Uuid) -> Vec<EventRecord> {
        self.engine.storage().events_for_lead(lead_id).await.unwrap()
    }

    pub async fn history(&self, lead_id: Uuid) -> Vec<ScoreHistoryEntry> {
        self.engine.storage().history_for_lead(lead_id).await.unwrap()
    }

    /// Block until every recorded event for the lead is processed and no
    /// scoring job remains scheduled for it.
    pub async fn wait_scored(&self, lead_id: Uuid) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let events = self.events(lead_id).await;
            let settled = !events.is_empty()
                && events.iter().all(|e| e.is_processed())
                && !self.engine.queue().is_scheduled(lead_id);
            if settled {
                return;
            }
            if Instant::now() > deadline {
                panic!("timed out waiting for lead {lead_id} to settle");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Block until a dead-lettered job for the lead appears.
    pub async fn wait_dead_lettered(&self, lead_id: Uuid) -> FailedJob {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let failed = self.engine.storage().list_failed(None).await.unwrap();
            if let Some(job) = failed.into_iter().find(|f| f.job.lead_id == lead_id) {
                return job;
            }
            if Instant::now() > deadline {
                panic!("timed out waiting for lead {lead_id} to dead-letter");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
