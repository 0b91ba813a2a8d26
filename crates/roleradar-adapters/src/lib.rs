//! Source adapter contract plus the ATS, job-board and feed adapters.
//!
//! Every adapter splits network access (`fetch`) from pure payload parsing
//! (`parse_*` functions), so parsers are exercised directly against fixtures.

mod ashby;
mod greenhouse;
mod lever;
mod rss;
mod text;
mod ycombinator;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleradar_core::RawPosting;
use roleradar_storage::{HttpError, HttpFetcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub use ashby::{parse_ashby_board, AshbyAdapter};
pub use greenhouse::{parse_greenhouse_board, GreenhouseAdapter};
pub use lever::{parse_lever_postings, LeverAdapter};
pub use rss::{parse_feed, RssAdapter};
pub use text::{
    html_to_text, normalize_location, parse_epoch_millis, parse_iso_datetime, parse_relative_date,
    synthesize_external_id,
};
pub use ycombinator::{parse_yc_listing, YCombinatorAdapter};

pub const CRATE_NAME: &str = "roleradar-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crawlability {
    PublicHtml,
    Api,
    Gated,
}

/// One company board on a multi-tenant ATS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardTarget {
    pub token: String,
    #[serde(default)]
    pub company: Option<String>,
}

impl BoardTarget {
    pub fn company_name(&self) -> String {
        self.company.clone().unwrap_or_else(|| self.token.clone())
    }
}

/// Entry of `sources.yaml`. `source_id` doubles as the adapter tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub crawlability: Crawlability,
    #[serde(default)]
    pub boards: Vec<BoardTarget>,
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    /// Case-insensitive title filter of the run; empty accepts every title.
    #[serde(default)]
    pub title_keywords: Vec<String>,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            fetched_at,
            title_keywords: Vec::new(),
        }
    }

    /// Whether a posting with this title survives the run's title filter.
    pub fn wants_title(&self, title: &str) -> bool {
        if self.title_keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.title_keywords
            .iter()
            .any(|k| title.contains(&k.to_lowercase()))
    }
}

/// Postings parsed from one payload, plus how many listings had to be dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    pub postings: Vec<RawPosting>,
    pub skipped: usize,
}

impl ParsedBatch {
    pub(crate) fn push(&mut self, posting: Option<RawPosting>) {
        match posting {
            Some(p) => self.postings.push(p),
            None => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub postings: Vec<RawPosting>,
    /// Individual listings that failed to parse.
    pub skipped: usize,
    /// Boards or listing pages that failed while others succeeded.
    pub failed_targets: Vec<String>,
}

impl FetchOutcome {
    pub fn truncate(&mut self, max_results: Option<usize>) {
        if let Some(max) = max_results {
            self.postings.truncate(max);
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Message(String),
    #[error("source {0} has no boards or listing urls configured")]
    NoTargets(String),
    #[error("all {attempted} targets of {source_tag} failed; last error: {last_error}")]
    AllTargetsFailed {
        source_tag: String,
        attempted: usize,
        last_error: String,
    },
    #[error("no adapter registered for source {0}")]
    UnknownSource(String),
    #[error(transparent)]
    Http(#[from] HttpError),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_tag(&self) -> &'static str;
    fn crawlability(&self) -> Crawlability;

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Accumulates per-target results for adapters that hit several boards or pages.
#[derive(Debug, Default)]
pub(crate) struct TargetTally {
    outcome: FetchOutcome,
    attempted: usize,
    last_error: Option<String>,
}

impl TargetTally {
    pub(crate) fn succeeded(&mut self, batch: ParsedBatch) {
        self.attempted += 1;
        self.outcome.skipped += batch.skipped;
        self.outcome.postings.extend(batch.postings);
    }

    pub(crate) fn failed(&mut self, source_tag: &str, target: &str, err: impl Display) {
        self.attempted += 1;
        warn!(source = source_tag, target, error = %err, "target fetch failed");
        self.outcome.failed_targets.push(target.to_string());
        self.last_error = Some(err.to_string());
    }

    pub(crate) fn finish(self, source_tag: &str) -> Result<FetchOutcome, FetchError> {
        if self.attempted == 0 {
            return Err(FetchError::NoTargets(source_tag.to_string()));
        }
        if self.outcome.failed_targets.len() == self.attempted {
            return Err(FetchError::AllTargetsFailed {
                source_tag: source_tag.to_string(),
                attempted: self.attempted,
                last_error: self.last_error.unwrap_or_default(),
            });
        }
        Ok(self.outcome)
    }
}

pub type AdapterRegistry = BTreeMap<String, Arc<dyn SourceAdapter>>;

pub fn adapter_for_source(source_tag: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_tag {
        "greenhouse" => Some(Box::new(GreenhouseAdapter)),
        "lever" => Some(Box::new(LeverAdapter)),
        "ashby" => Some(Box::new(AshbyAdapter)),
        "ycombinator" => Some(Box::new(YCombinatorAdapter)),
        "rss" => Some(Box::new(RssAdapter)),
        _ => None,
    }
}

pub fn default_registry() -> AdapterRegistry {
    ["greenhouse", "lever", "ashby", "ycombinator", "rss"]
        .into_iter()
        .filter_map(|tag| adapter_for_source(tag).map(|a| (tag.to_string(), Arc::from(a))))
        .collect()
}
