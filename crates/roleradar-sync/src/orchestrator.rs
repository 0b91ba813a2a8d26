use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeDelta, Utc};
use roleradar_adapters::{default_registry, AdapterContext, AdapterRegistry, FetchError, SourceConfig};
use roleradar_core::{ProgressSnapshot, RawPosting, RunStatus, RunSummary, SourceRunLog, SourceStats};
use roleradar_extract::{enrich_posting, KeywordDictionary, SkillExtractor};
use roleradar_storage::{HttpFetcher, JobStore, StoreError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{RadarConfig, SourceRegistry, TargetProfile};
use crate::dedup::{DedupConfig, Deduplicator};

/// Upper bound for any lookback or dedup window, in days.
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// `now` minus `days`, with `days` clamped to `0..=MAX_LOOKBACK_DAYS`.
pub fn lookback_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(days.clamp(0, MAX_LOOKBACK_DAYS))
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TriggerRejected {
    #[error("a run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Overrides the configured lookback window.
    pub lookback_days: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub max_concurrent_sources: usize,
    pub lookback_days: i64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            lookback_days: 7,
        }
    }
}

/// Where each run gets its skill extractor from.
#[derive(Debug, Clone)]
pub enum ExtractorSource {
    Fixed(Arc<SkillExtractor>),
    /// Re-read at the start of every run so dictionary edits apply to the next run.
    File(PathBuf),
}

impl ExtractorSource {
    fn load(&self) -> Result<Arc<SkillExtractor>> {
        match self {
            Self::Fixed(extractor) => Ok(Arc::clone(extractor)),
            Self::File(path) => {
                let dictionary = KeywordDictionary::load(path)?;
                Ok(Arc::new(SkillExtractor::new(&dictionary)?))
            }
        }
    }
}

/// Handle to a run started in the background.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: Uuid,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<RunSummary> {
        self.task.await.context("run task did not finish")
    }
}

struct SourceReport {
    source_id: String,
    stats: SourceStats,
    /// Set when the whole run has to stop (store unavailable or cancelled).
    fatal: Option<String>,
}

impl SourceReport {
    fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            stats: SourceStats::default(),
            fatal: None,
        }
    }
}

/// Drives runs across all configured sources and owns the run state machine.
///
/// Only one run is `Running` at a time; the progress snapshot is the only
/// shared mutable state and is readable while a run is in flight.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    http: Arc<HttpFetcher>,
    adapters: AdapterRegistry,
    sources: Vec<SourceConfig>,
    extractor: ExtractorSource,
    profile: TargetProfile,
    dedup: Deduplicator,
    settings: OrchestratorSettings,
    progress: Mutex<ProgressSnapshot>,
    cancel: Mutex<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        http: Arc<HttpFetcher>,
        adapters: AdapterRegistry,
        sources: Vec<SourceConfig>,
        extractor: ExtractorSource,
    ) -> Self {
        Self {
            store,
            http,
            adapters,
            sources,
            extractor,
            profile: TargetProfile::default(),
            dedup: Deduplicator::new(DedupConfig::default()),
            settings: OrchestratorSettings::default(),
            progress: Mutex::new(ProgressSnapshot::default()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_profile(mut self, profile: TargetProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_dedup(mut self, config: DedupConfig) -> Self {
        self.dedup = Deduplicator::new(config);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wires the production orchestrator from `sources.yaml` and `rules/keywords.yaml`.
    pub async fn from_config(config: &RadarConfig, store: Arc<dyn JobStore>) -> Result<Arc<Self>> {
        let registry = SourceRegistry::from_workspace_root(&config.workspace_root).await?;
        let dictionary_path = config.workspace_root.join("rules").join("keywords.yaml");
        // Validated once here; each run reloads it.
        let extractor = ExtractorSource::File(dictionary_path);
        extractor.load().context("loading keyword dictionary")?;

        let http = HttpFetcher::new(config.http_client_config(registry.politeness.policy()))?;
        let orchestrator = Self::new(
            store,
            Arc::new(http),
            default_registry(),
            registry.enabled_sources(),
            extractor,
        )
        .with_profile(registry.target_profile.clone())
        .with_dedup(DedupConfig {
            window: Duration::days(config.dedup_window_days.clamp(0, MAX_LOOKBACK_DAYS)),
            ..DedupConfig::default()
        })
        .with_settings(OrchestratorSettings {
            max_concurrent_sources: config.max_concurrent_sources,
            lookback_days: config.lookback_days,
        });
        Ok(Arc::new(orchestrator))
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock_progress().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_progress().status == RunStatus::Running
    }

    /// Cancels the current run, if any. Records written so far are kept.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        true
    }

    /// Starts a run in the background, or rejects it when one is already running.
    pub fn start_run(self: &Arc<Self>, request: RunRequest) -> Result<RunHandle, TriggerRejected> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let token = CancellationToken::new();
        {
            let mut progress = self.lock_progress();
            if progress.status == RunStatus::Running {
                return Err(TriggerRejected::AlreadyRunning);
            }
            *progress = ProgressSnapshot {
                status: RunStatus::Running,
                current_step: "starting".to_string(),
                sources_total: self.sources.len(),
                run_id: Some(run_id),
                started_at: Some(started_at),
                ..ProgressSnapshot::default()
            };
            *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        }

        let lookback_days = request
            .lookback_days
            .unwrap_or(self.settings.lookback_days)
            .clamp(0, MAX_LOOKBACK_DAYS);
        info!(%run_id, lookback_days, sources = self.sources.len(), "run accepted");
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let clock = Instant::now();
            let worker = Arc::clone(&this);
            let run = tokio::spawn(async move { worker.execute(run_id, started_at, lookback_days, token).await });
            match run.await {
                Ok(summary) => summary,
                // The snapshot must still leave Running.
                Err(err) => {
                    error!(%run_id, error = %err, "run task panicked");
                    let reason = Some("run task panicked".to_string());
                    this.finish(run_id, started_at, clock, BTreeMap::new(), Vec::new(), reason)
                }
            }
        });
        Ok(RunHandle { run_id, task })
    }

    /// Starts a run and waits for its summary.
    pub async fn run_to_completion(self: &Arc<Self>, request: RunRequest) -> Result<RunSummary> {
        self.start_run(request)?.wait().await
    }

    fn lock_progress(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_progress(&self, update: impl FnOnce(&mut ProgressSnapshot)) {
        update(&mut self.lock_progress());
    }

    async fn execute(
        self: Arc<Self>,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        lookback_days: i64,
        cancel: CancellationToken,
    ) -> RunSummary {
        let clock = Instant::now();
        let mut sources = BTreeMap::new();
        let mut failed_sources = Vec::new();

        let extractor = match self.extractor.load() {
            Ok(extractor) => extractor,
            Err(err) => {
                let reason = format!("loading keyword dictionary: {err:#}");
                return self.finish(run_id, started_at, clock, sources, failed_sources, Some(reason));
            }
        };

        let ctx = AdapterContext {
            title_keywords: self.profile.title_keywords.clone(),
            ..AdapterContext::new(run_id, started_at)
        };
        let cutoff = lookback_cutoff(started_at, lookback_days);
        let limit = Arc::new(Semaphore::new(self.settings.max_concurrent_sources.max(1)));
        let mut tasks = JoinSet::new();

        for source in self.sources.clone() {
            let this = Arc::clone(&self);
            let extractor = Arc::clone(&extractor);
            let limit = Arc::clone(&limit);
            let cancel = cancel.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let source_id = source.source_id.clone();
                tokio::select! {
                    _ = cancel.cancelled() => SourceReport {
                        fatal: Some("cancelled".to_string()),
                        ..SourceReport::new(&source_id)
                    },
                    report = async {
                        let Ok(_permit) = limit.acquire_owned().await else {
                            return SourceReport::new(&source_id);
                        };
                        this.process_source(&source, &ctx, &extractor, cutoff).await
                    } => report,
                }
            });
        }

        let mut failure: Option<String> = None;
        while let Some(joined) = tasks.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(err) => {
                    failure.get_or_insert_with(|| format!("source task failed: {err}"));
                    cancel.cancel();
                    continue;
                }
            };

            if let Some(reason) = &report.fatal {
                if reason != "cancelled" {
                    warn!(%run_id, source = %report.source_id, reason = %reason, "run aborted");
                }
                failure.get_or_insert_with(|| reason.clone());
                cancel.cancel();
            } else if report.stats.error.is_some() {
                failed_sources.push(report.source_id.clone());
            }

            self.update_progress(|p| {
                p.sources_processed += 1;
                if report.stats.error.is_some() && report.fatal.is_none() {
                    p.failed_sources.push(report.source_id.clone());
                }
            });
            sources.insert(report.source_id, report.stats);
        }

        if failure.is_none() && cancel.is_cancelled() {
            failure = Some("cancelled".to_string());
        }
        failed_sources.sort();
        self.finish(run_id, started_at, clock, sources, failed_sources, failure)
    }

    fn finish(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        clock: Instant,
        sources: BTreeMap<String, SourceStats>,
        failed_sources: Vec<String>,
        failure_reason: Option<String>,
    ) -> RunSummary {
        let status = if failure_reason.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let summary = RunSummary {
            run_id,
            status,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
            sources,
            failed_sources,
            failure_reason,
        };

        self.update_progress(|p| {
            p.status = summary.status;
            p.current_step = match summary.status {
                RunStatus::Completed => "completed".to_string(),
                _ => "failed".to_string(),
            };
            p.failed_sources = summary.failed_sources.clone();
            p.finished_at = Some(summary.finished_at);
            p.failure_reason = summary.failure_reason.clone();
        });

        info!(
            %run_id,
            status = ?summary.status,
            found = summary.total_found(),
            added = summary.total_added(),
            skipped = summary.total_skipped(),
            failed_sources = ?summary.failed_sources,
            elapsed_ms = summary.elapsed_ms,
            "run finished"
        );
        summary
    }

    fn passes_filters(&self, posting: &RawPosting, cutoff: DateTime<Utc>) -> bool {
        self.profile.matches_title(&posting.title)
            && self.profile.matches_location(posting.location.as_deref())
            && posting.date_posted.map_or(true, |posted| posted >= cutoff)
    }

    async fn process_source(
        &self,
        source: &SourceConfig,
        ctx: &AdapterContext,
        extractor: &SkillExtractor,
        cutoff: DateTime<Utc>,
    ) -> SourceReport {
        let span = info_span!("source_fetch", run_id = %ctx.run_id, source = %source.source_id);
        async move {
            let clock = Instant::now();
            let mut report = SourceReport::new(&source.source_id);
            self.update_progress(|p| p.current_step = format!("fetching {}", source.source_id));

            let fetched = match self.adapters.get(&source.source_id) {
                Some(adapter) => adapter.fetch(&self.http, ctx, source).await,
                None => Err(FetchError::UnknownSource(source.source_id.clone())),
            };
            match fetched {
                Ok(outcome) => {
                    report.stats.found = outcome.postings.len();
                    report.stats.parse_skipped = outcome.skipped;
                    report.stats.failed_targets = outcome.failed_targets;
                    self.update_progress(|p| p.postings_found += report.stats.found);
                    if let Err(err) = self.store_postings(outcome.postings, ctx, extractor, cutoff, &mut report).await {
                        report.fatal = Some(err.to_string());
                        return report;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "source fetch failed");
                    report.stats.error = Some(err.to_string());
                }
            }

            let log = SourceRunLog {
                run_id: ctx.run_id,
                source: source.source_id.clone(),
                jobs_found: report.stats.found,
                jobs_added: report.stats.added,
                jobs_skipped: report.stats.skipped,
                error: report.stats.error.clone(),
                run_time_ms: clock.elapsed().as_millis() as u64,
                recorded_at: Utc::now(),
            };
            if let Err(err) = self.store.record_run(&log).await {
                report.fatal = Some(err.to_string());
                return report;
            }

            info!(
                found = report.stats.found,
                added = report.stats.added,
                skipped = report.stats.skipped,
                filtered = report.stats.filtered,
                parse_skipped = report.stats.parse_skipped,
                "source done"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Filters, dedups, enriches and inserts postings in source order.
    async fn store_postings(
        &self,
        postings: Vec<RawPosting>,
        ctx: &AdapterContext,
        extractor: &SkillExtractor,
        cutoff: DateTime<Utc>,
        report: &mut SourceReport,
    ) -> Result<(), StoreError> {
        for posting in postings {
            if !self.passes_filters(&posting, cutoff) {
                report.stats.filtered += 1;
                continue;
            }

            if self
                .dedup
                .is_duplicate(&posting, self.store.as_ref(), ctx.fetched_at)
                .await?
            {
                report.stats.skipped += 1;
                self.update_progress(|p| p.postings_skipped += 1);
                continue;
            }

            let job = enrich_posting(extractor, &posting, ctx.fetched_at);
            match self.store.insert(job).await {
                Ok(id) => {
                    debug!(id, external_id = %posting.external_id, "job stored");
                    report.stats.added += 1;
                    self.update_progress(|p| p.postings_added += 1);
                }
                Err(err) if err.is_conflict() => {
                    report.stats.skipped += 1;
                    self.update_progress(|p| p.postings_skipped += 1);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
