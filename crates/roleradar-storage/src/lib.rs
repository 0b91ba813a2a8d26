//! Job persistence and HTTP fetch utilities for RoleRadar.

mod http;
mod postgres;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleradar_core::{NewJob, NormalizedJob, SourceRunLog};
use serde::Deserialize;
use thiserror::Error;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchedResponse, HttpClientConfig,
    HttpError, HttpFetcher, PolitenessPolicy, RetryDisposition,
};
pub use postgres::PgJobStore;

pub const CRATE_NAME: &str = "roleradar-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    /// `(source, external_id)` is already stored. Callers treat this as a skip.
    #[error("job {source_tag}/{external_id} is already stored")]
    Conflict {
        source_tag: String,
        external_id: String,
    },
    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Read filter for listing stored jobs. Empty filter returns everything, best score first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub source: Option<String>,
    /// Case-insensitive exact company match.
    pub company: Option<String>,
    pub min_score: Option<f64>,
    pub posted_since: Option<DateTime<Utc>>,
    pub scraped_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_only: bool,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job and returns its surrogate id; `Conflict` if the key exists.
    async fn insert(&self, job: NewJob) -> Result<i64, StoreError>;

    async fn find_by_external_id(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<NormalizedJob>, StoreError>;

    /// Jobs scraped at or after `since` whose company and title match case-insensitively.
    async fn find_recent_by_company_title(
        &self,
        company: &str,
        title: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedJob>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<NormalizedJob>, StoreError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<NormalizedJob>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn record_run(&self, log: &SourceRunLog) -> Result<(), StoreError>;
}

pub(crate) fn fold_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Orders jobs by relevance (desc), then id (asc).
pub(crate) fn rank_jobs(jobs: &mut [NormalizedJob]) {
    jobs.sort_by(|a, b| {
        b.record
            .relevance_score
            .total_cmp(&a.record.relevance_score)
            .then(a.id.cmp(&b.id))
    });
}

#[derive(Debug, Default)]
struct MemoryState {
    jobs: Vec<NormalizedJob>,
    runs: Vec<SourceRunLog>,
    next_id: i64,
}

/// In-process store used by tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn run_logs(&self) -> Vec<SourceRunLog> {
        self.lock().runs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

fn matches_filter(job: &NormalizedJob, filter: &JobFilter) -> bool {
    let r = &job.record;
    if let Some(source) = &filter.source {
        if &r.source != source {
            return false;
        }
    }
    if let Some(company) = &filter.company {
        if fold_key(&r.company) != fold_key(company) {
            return false;
        }
    }
    if let Some(min_score) = filter.min_score {
        if r.relevance_score < min_score {
            return false;
        }
    }
    if let Some(since) = filter.posted_since {
        if r.date_posted.map_or(true, |d| d < since) {
            return false;
        }
    }
    if let Some(since) = filter.scraped_since {
        if r.date_scraped < since {
            return false;
        }
    }
    !(filter.active_only && !r.is_active)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob) -> Result<i64, StoreError> {
        self.check_available()?;
        let mut state = self.lock();
        if state
            .jobs
            .iter()
            .any(|j| j.record.source == job.source && j.record.external_id == job.external_id)
        {
            return Err(StoreError::Conflict {
                source_tag: job.source,
                external_id: job.external_id,
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        state.jobs.push(NormalizedJob::new(id, job));
        Ok(id)
    }

    async fn find_by_external_id(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<NormalizedJob>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .jobs
            .iter()
            .find(|j| j.record.source == source && j.record.external_id == external_id)
            .cloned())
    }

    async fn find_recent_by_company_title(
        &self,
        company: &str,
        title: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedJob>, StoreError> {
        self.check_available()?;
        let company = fold_key(company);
        let title = fold_key(title);
        Ok(self
            .lock()
            .jobs
            .iter()
            .filter(|j| {
                j.record.date_scraped >= since
                    && fold_key(&j.record.company) == company
                    && fold_key(&j.record.title) == title
            })
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<NormalizedJob>, StoreError> {
        self.check_available()?;
        Ok(self.lock().jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<NormalizedJob>, StoreError> {
        self.check_available()?;
        let mut jobs = self
            .lock()
            .jobs
            .iter()
            .filter(|j| matches_filter(j, filter))
            .cloned()
            .collect::<Vec<_>>();
        rank_jobs(&mut jobs);
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.lock().jobs.len() as u64)
    }

    async fn record_run(&self, log: &SourceRunLog) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().runs.push(log.clone());
        Ok(())
    }
}
