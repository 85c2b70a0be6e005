use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::dedup::{DedupConfig, Deduplicator};
use crate::error::AppError;
use crate::fetchers::{self, ChatMessage, Fetcher, InboundHub, inbound::channel_allowed};
use crate::normalize;
use crate::ratelimit::RateLimiter;
use crate::registry::{Registry, SourceKind};
use crate::store::{ItemStore, NewIngestRun};

/// Namespace for deriving stable per-source job ids.
const JOB_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Recurring,
    Manual,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Recurring => "recurring",
            TriggerKind::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub source_key: String,
    pub trigger_kind: String,
    pub job_id: Uuid,
}

impl ScheduledJob {
    /// Recurring job ids derive from the source key so that re-registering
    /// the same schedule is observably idempotent.
    pub fn recurring(source_key: &str) -> ScheduledJob {
        ScheduledJob {
            source_key: source_key.to_string(),
            trigger_kind: TriggerKind::Recurring.as_str().to_string(),
            job_id: Uuid::new_v5(&JOB_NAMESPACE, source_key.as_bytes()),
        }
    }

    pub fn manual(source_key: &str) -> ScheduledJob {
        ScheduledJob {
            source_key: source_key.to_string(),
            trigger_kind: TriggerKind::Manual.as_str().to_string(),
            job_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunCounts {
    pub fetched: i32,
    pub normalized: i32,
    pub inserted: i32,
    pub skipped: i32,
    pub errored: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    Throttled,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunCounts),
    Failed(String),
    Skipped(SkipReason),
}

#[derive(Debug, Serialize)]
pub struct BulkTrigger {
    pub triggered: Vec<ScheduledJob>,
    pub failures: Vec<BulkTriggerFailure>,
}

#[derive(Debug, Serialize)]
pub struct BulkTriggerFailure {
    pub source_key: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct InboundDispatch {
    pub accepted: bool,
    pub sources: usize,
}

struct SourceState {
    limiter: RateLimiter,
    in_flight: AtomicBool,
}

/// Releases the per-source single-flight flag when a run ends, on every
/// exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Executes one source's fetch → normalize → dedupe → persist cycle and
/// holds the per-source limiter and single-flight state.
pub struct Pipeline {
    registry: Arc<Registry>,
    store: Arc<dyn ItemStore>,
    dedup: Deduplicator,
    fetchers: HashMap<SourceKind, Arc<dyn Fetcher>>,
    states: HashMap<String, SourceState>,
    hub: Arc<InboundHub>,
    fetch_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn ItemStore>,
        dedup_config: DedupConfig,
        http: reqwest::Client,
        fetch_timeout: Duration,
    ) -> Pipeline {
        let hub = Arc::new(InboundHub::new());
        let fetchers = fetchers::build_fetchers(http, hub.clone());
        let states = registry
            .list_enabled()
            .into_iter()
            .map(|source| {
                (
                    source.key.clone(),
                    SourceState {
                        limiter: RateLimiter::new(source.rate_limit),
                        in_flight: AtomicBool::new(false),
                    },
                )
            })
            .collect();
        let dedup = Deduplicator::new(store.clone(), dedup_config);

        Pipeline {
            registry,
            store,
            dedup,
            fetchers,
            states,
            hub,
            fetch_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    pub fn inbound_hub(&self) -> &Arc<InboundHub> {
        &self.hub
    }

    /// Run one ingestion cycle for a source. Fails with a config error for
    /// unknown/disabled sources; everything downstream of the fetch is
    /// absorbed into the run's counts.
    pub async fn run_source(&self, key: &str, trigger: TriggerKind) -> Result<RunOutcome, AppError> {
        let source = self
            .registry
            .get(key)
            .filter(|s| s.enabled)
            .ok_or_else(|| AppError::Config(format!("Unknown or disabled source '{key}'")))?;
        let state = self
            .states
            .get(key)
            .ok_or_else(|| AppError::Internal(format!("No runtime state for source '{key}'")))?;

        if state
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(source = %key, "Previous run still in flight, skipping this cycle");
            return Ok(RunOutcome::Skipped(SkipReason::AlreadyRunning));
        }
        let _guard = InFlightGuard(&state.in_flight);

        if !state.limiter.try_acquire() {
            tracing::info!(source = %key, "Rate limit reached, deferring to next tick");
            return Ok(RunOutcome::Skipped(SkipReason::Throttled));
        }

        let started_at = Utc::now();
        let fetcher = self
            .fetchers
            .get(&source.kind)
            .ok_or_else(|| AppError::Internal(format!("No fetcher for kind {:?}", source.kind)))?;

        let batch =
            match tokio::time::timeout(self.fetch_timeout, fetcher.fetch(source, &state.limiter))
                .await
            {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) => {
                    let message = e.to_string();
                    tracing::warn!(source = %key, error = %message, "Fetch failed");
                    self.record(key, trigger, "failed", RunCounts::default(), Some(&message), started_at)
                        .await;
                    return Ok(RunOutcome::Failed(message));
                }
                Err(_) => {
                    let message =
                        format!("Fetch timed out after {}s", self.fetch_timeout.as_secs());
                    tracing::warn!(source = %key, "{message}");
                    self.record(key, trigger, "failed", RunCounts::default(), Some(&message), started_at)
                        .await;
                    return Ok(RunOutcome::Failed(message));
                }
            };

        let mut counts = RunCounts {
            fetched: batch.len() as i32,
            ..RunCounts::default()
        };
        let default_merchant = source.config.merchant.as_deref();

        // Batch order is preserved: the first stored form of a title is the
        // one later similarity checks compare against.
        for raw in &batch {
            let Some(item) = normalize::normalize(raw, &source.key, default_merchant) else {
                continue;
            };
            counts.normalized += 1;
            match self.dedup.consider_for_insert(item).await {
                Ok(Some(_)) => counts.inserted += 1,
                Ok(None) => counts.skipped += 1,
                Err(e) => {
                    counts.errored += 1;
                    tracing::warn!(source = %key, error = %e, "Failed to persist item");
                }
            }
        }

        self.record(key, trigger, "completed", counts, None, started_at)
            .await;
        tracing::info!(
            source = %key,
            fetched = counts.fetched,
            normalized = counts.normalized,
            inserted = counts.inserted,
            skipped = counts.skipped,
            errored = counts.errored,
            "Ingestion cycle completed"
        );
        Ok(RunOutcome::Completed(counts))
    }

    async fn record(
        &self,
        key: &str,
        trigger: TriggerKind,
        status: &str,
        counts: RunCounts,
        error: Option<&str>,
        started_at: DateTime<Utc>,
    ) {
        let run = NewIngestRun {
            source_key: key.to_string(),
            trigger_kind: trigger.as_str().to_string(),
            status: status.to_string(),
            fetched: counts.fetched,
            normalized: counts.normalized,
            inserted: counts.inserted,
            skipped: counts.skipped,
            errored: counts.errored,
            error: error.map(str::to_string),
            started_at,
            finished_at: Utc::now(),
        };
        if let Err(e) = self.store.record_run(&run).await {
            tracing::warn!(source = %key, error = %e, "Failed to record ingest run");
        }
    }

    /// Enqueue a one-off run immediately. Fails fast, without enqueuing,
    /// when the source is unknown or disabled.
    pub fn trigger_ingestion(self: Arc<Self>, key: &str) -> Result<ScheduledJob, AppError> {
        let source = self
            .registry
            .get(key)
            .ok_or_else(|| AppError::Config(format!("Unknown source '{key}'")))?;
        if !source.enabled {
            return Err(AppError::Config(format!("Source '{key}' is disabled")));
        }

        let job = ScheduledJob::manual(key);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = self.run_source(&key, TriggerKind::Manual).await {
                tracing::error!(source = %key, error = %e, "Manual ingestion failed to start");
            }
        });
        Ok(job)
    }

    /// Fan out one manual trigger per enabled source. Returns once all have
    /// been enqueued; per-source failures are collected, not propagated.
    pub fn trigger_all_sources(self: Arc<Self>) -> BulkTrigger {
        let mut triggered = Vec::new();
        let mut failures = Vec::new();
        for source in self.registry.list_enabled() {
            match self.clone().trigger_ingestion(&source.key) {
                Ok(job) => triggered.push(job),
                Err(e) => failures.push(BulkTriggerFailure {
                    source_key: source.key.clone(),
                    error: e.to_string(),
                }),
            }
        }
        BulkTrigger {
            triggered,
            failures,
        }
    }

    /// Route one chat event to the inbound sources whose allow-list admits
    /// the sending channel, and trigger each of them.
    pub fn dispatch_inbound(self: Arc<Self>, message: ChatMessage) -> InboundDispatch {
        let mut matched = 0;
        for source in self
            .registry
            .list_enabled()
            .into_iter()
            .filter(|s| s.kind == SourceKind::Inbound)
        {
            if !channel_allowed(&source.config.allowed_channels, &message.channel) {
                continue;
            }
            self.hub.push(&source.key, message.clone());
            match self.clone().trigger_ingestion(&source.key) {
                Ok(_) => matched += 1,
                Err(e) => {
                    tracing::warn!(source = %source.key, error = %e, "Failed to trigger inbound source")
                }
            }
        }
        if matched == 0 {
            tracing::debug!(channel = %message.channel, "Inbound message matched no source, ignoring");
        }
        InboundDispatch {
            accepted: matched > 0,
            sources: matched,
        }
    }
}

/// Cron-driven recurrence over the pipeline. Registration is keyed by the
/// deterministic per-source job id, so registering the same source twice
/// leaves exactly one active trigger.
pub struct IngestScheduler {
    pipeline: Arc<Pipeline>,
    scheduler: JobScheduler,
    registered: tokio::sync::Mutex<HashMap<String, ScheduledJob>>,
}

impl IngestScheduler {
    pub async fn new(pipeline: Arc<Pipeline>) -> Result<IngestScheduler, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {e}")))?;
        Ok(IngestScheduler {
            pipeline,
            scheduler,
            registered: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Register the recurring trigger for one source. A second registration
    /// under the same key is a no-op returning the existing job.
    pub async fn register_source(&self, key: &str) -> Result<ScheduledJob, AppError> {
        let source = self
            .pipeline
            .registry()
            .get(key)
            .filter(|s| s.enabled)
            .ok_or_else(|| AppError::Config(format!("Unknown or disabled source '{key}'")))?;
        let Some(schedule) = source.schedule.clone() else {
            return Err(AppError::Config(format!(
                "Source '{key}' is push-driven and has no schedule"
            )));
        };

        let mut registered = self.registered.lock().await;
        if let Some(existing) = registered.get(key) {
            tracing::debug!(source = %key, "Recurring job already registered");
            return Ok(existing.clone());
        }

        let pipeline = self.pipeline.clone();
        let job_key = key.to_string();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _scheduler| {
            let pipeline = pipeline.clone();
            let key = job_key.clone();
            Box::pin(async move {
                if let Err(e) = pipeline.run_source(&key, TriggerKind::Recurring).await {
                    tracing::error!(source = %key, error = %e, "Scheduled ingestion failed");
                }
            })
        })
        .map_err(|e| {
            AppError::Scheduler(format!("Invalid schedule '{schedule}' for '{key}': {e}"))
        })?;

        let mut handle = self.scheduler.clone();
        handle
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to add job for '{key}': {e}")))?;

        let scheduled = ScheduledJob::recurring(key);
        registered.insert(key.to_string(), scheduled.clone());
        tracing::info!(source = %key, schedule = %schedule, job_id = %scheduled.job_id, "Registered recurring ingestion");
        Ok(scheduled)
    }

    /// Register every enabled pull source. Safe to call repeatedly.
    pub async fn register_all(&self) -> Result<usize, AppError> {
        let keys: Vec<String> = self
            .pipeline
            .registry()
            .list_enabled()
            .into_iter()
            .filter(|s| s.schedule.is_some())
            .map(|s| s.key.clone())
            .collect();
        for key in &keys {
            self.register_source(key).await?;
        }
        Ok(keys.len())
    }

    pub async fn start(&self) -> Result<(), AppError> {
        let mut handle = self.scheduler.clone();
        handle
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {e}")))
    }

    pub async fn job_count(&self) -> usize {
        self.registered.lock().await.len()
    }
}
