//! Lead Scoring Engine
//!
//! Event-sourced lead engagement scoring pipeline:
//! - intake gateway with validation, auth, and idempotent event recording
//! - keyed at-least-once job queue with backoff retry and dead-lettering
//! - scoring worker applying rule deltas under a per-lead lease
//! - invariant checker and rebuild tooling for drift detection and repair
//!
//! The engine is transport-agnostic: a serving layer embeds [`Engine`] and
//! feeds submissions into its gateway.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use audit::{DeadLetterManager, InvariantChecker, RebuildService};
use gateway::{IntakeGateway, ProjectKeyring};
use job_queue::{JobQueue, QueueConfig};
use scoring_core::{default_rules, ProjectKey};
use scoring_store::{MemoryStore, RuleStore, SharedStorage};
use worker::{ScoringWorker, StoreDeadLetterSink, WorkerConfig, WorkerScheduler};

pub use audit::{Finding, Invariant, InvariantReport, RebuildSummary, Severity};
pub use scoring_core::{
    Error, EventSubmission, FieldError, Lead, ScoringRule, Stage, SubmissionOutcome,
};
pub use telemetry::{init_tracing, init_tracing_from_env, TracingConfig};

/// A registered project credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectKeyEntry {
    pub key: String,
    pub project_id: Uuid,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Queue worker concurrency.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Delivery attempts before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry backoff in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
    /// Stall timeout for active jobs, seconds.
    #[serde(default = "default_stall_secs")]
    pub stall_timeout_secs: u64,
    /// Reconciliation sweep interval, seconds.
    #[serde(default = "default_reconcile_secs")]
    pub reconcile_interval_secs: u64,
    /// Whether to seed the reference rule set on startup.
    #[serde(default = "default_seed_rules")]
    pub seed_default_rules: bool,
    /// Registered project API keys.
    #[serde(default)]
    pub project_keys: Vec<ProjectKeyEntry>,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    scoring_core::limits::MAX_JOB_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_stall_secs() -> u64 {
    60
}

fn default_reconcile_secs() -> u64 {
    60
}

fn default_seed_rules() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_ms(),
            stall_timeout_secs: default_stall_secs(),
            reconcile_interval_secs: default_reconcile_secs(),
            seed_default_rules: default_seed_rules(),
            project_keys: Vec::new(),
        }
    }
}

impl EngineConfig {
    fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_attempts: self.max_attempts,
            backoff_base: std::time::Duration::from_millis(self.backoff_base_ms),
            max_concurrency: self.max_concurrency,
            stall_timeout: std::time::Duration::from_secs(self.stall_timeout_secs),
            ..QueueConfig::default()
        }
    }

    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            reconcile_interval: std::time::Duration::from_secs(self.reconcile_interval_secs),
            ..WorkerConfig::default()
        }
    }
}

/// Load configuration from files and environment.
///
/// Order: defaults, then `config/default.toml` if present, then
/// `SCORING`-prefixed environment variables.
pub fn load_config() -> Result<EngineConfig> {
    dotenvy::dotenv().ok();

    let config = config::Config::builder()
        .add_source(config::Config::try_from(&EngineConfig::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("SCORING")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// The assembled pipeline.
pub struct Engine {
    storage: SharedStorage,
    queue: Arc<JobQueue>,
    keyring: Arc<ProjectKeyring>,
    gateway: Arc<IntakeGateway>,
    checker: InvariantChecker,
    rebuilds: RebuildService,
    dead_letters: DeadLetterManager,
    scheduler: Arc<WorkerScheduler>,
    scoring: Arc<ScoringWorker>,
}

impl Engine {
    /// Build an engine over the in-memory backend.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        Self::with_storage(config, Arc::new(MemoryStore::new())).await
    }

    /// Build an engine over an explicit storage backend.
    pub async fn with_storage(config: EngineConfig, storage: SharedStorage) -> Result<Self> {
        if config.seed_default_rules {
            for rule in default_rules() {
                storage.upsert_rule(rule).await?;
            }
        }

        let keyring = Arc::new(ProjectKeyring::new());
        for entry in &config.project_keys {
            let key = ProjectKey::parse(&entry.key)
                .with_context(|| format!("invalid project key for {}", entry.project_id))?;
            keyring.register(&key, entry.project_id);
        }

        let queue = JobQueue::new(config.queue_config());
        let gateway = Arc::new(IntakeGateway::new(
            storage.clone(),
            queue.clone(),
            keyring.clone(),
        ));
        let checker = InvariantChecker::new(storage.clone());
        let rebuilds = RebuildService::new(storage.clone(), queue.clone());
        let dead_letters = DeadLetterManager::new(storage.clone(), queue.clone());
        let scheduler = Arc::new(WorkerScheduler::new(
            config.worker_config(),
            storage.clone(),
            queue.clone(),
        ));
        let scoring = Arc::new(ScoringWorker::new(storage.clone()));

        info!(
            workers = config.max_concurrency,
            max_attempts = config.max_attempts,
            keys = config.project_keys.len(),
            "Engine assembled"
        );

        Ok(Self {
            storage,
            queue,
            keyring,
            gateway,
            checker,
            rebuilds,
            dead_letters,
            scheduler,
            scoring,
        })
    }

    /// Start the queue worker pool and background maintenance tasks.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let sink = Arc::new(StoreDeadLetterSink::new(self.storage.clone()));
        let mut handles = self.queue.start(self.scoring.clone(), sink);
        handles.extend(self.scheduler.clone().start());
        handles
    }

    pub fn gateway(&self) -> &IntakeGateway {
        &self.gateway
    }

    pub fn keyring(&self) -> &ProjectKeyring {
        &self.keyring
    }

    pub fn checker(&self) -> &InvariantChecker {
        &self.checker
    }

    pub fn rebuilds(&self) -> &RebuildService {
        &self.rebuilds
    }

    pub fn dead_letters(&self) -> &DeadLetterManager {
        &self.dead_letters
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }
}
