use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RadarConfig;
use crate::orchestrator::{Orchestrator, RunRequest};

/// Starts a run with the configured lookback. A busy orchestrator is logged, not queued.
pub fn trigger_now(orchestrator: &Arc<Orchestrator>, origin: &str) -> Option<Uuid> {
    match orchestrator.start_run(RunRequest::default()) {
        Ok(handle) => {
            info!(run_id = %handle.run_id, origin, "run triggered");
            Some(handle.run_id)
        }
        Err(rejected) => {
            warn!(origin, reason = %rejected, "trigger rejected");
            None
        }
    }
}

/// Daily sync scheduler. Missed ticks (process down, run still going) are not replayed.
pub struct SyncScheduler {
    scheduler: JobScheduler,
}

impl SyncScheduler {
    pub async fn new(cron: &str, orchestrator: Arc<Orchestrator>) -> Result<Self> {
        let scheduler = JobScheduler::new().await.context("creating scheduler")?;
        let job = Job::new_async(cron, move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                trigger_now(&orchestrator, "schedule");
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        scheduler.add(job).await.context("adding scheduler job")?;
        Ok(Self { scheduler })
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await.context("starting scheduler")
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler.shutdown().await.context("stopping scheduler")
    }
}

/// Builds the scheduler only when `ROLERADAR_SCHEDULER_ENABLED` is set.
pub async fn maybe_build_scheduler(
    config: &RadarConfig,
    orchestrator: Arc<Orchestrator>,
) -> Result<Option<SyncScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }
    SyncScheduler::new(&config.sync_cron, orchestrator).await.map(Some)
}
