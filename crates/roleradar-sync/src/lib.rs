//! Run orchestration: source registry, deduplication, the run state machine and its scheduler.

mod config;
mod dedup;
mod orchestrator;
mod scheduler;

pub use config::{PolitenessSettings, RadarConfig, SourceRegistry, TargetProfile};
pub use dedup::{DedupConfig, DedupDecision, Deduplicator};
pub use orchestrator::{
    lookback_cutoff, ExtractorSource, Orchestrator, OrchestratorSettings, RunHandle, RunRequest,
    TriggerRejected, MAX_LOOKBACK_DAYS,
};
pub use scheduler::{maybe_build_scheduler, trigger_now, SyncScheduler};

pub const CRATE_NAME: &str = "roleradar-sync";
