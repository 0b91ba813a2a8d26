use chrono::{DateTime, Duration, Utc};
use roleradar_core::RawPosting;
use roleradar_storage::{JobFilter, JobStore, StoreError};
use strsim::jaro_winkler;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// How far back the company/title fallback looks.
    pub window: Duration,
    /// Titles at least this similar (but not equal) are logged as possible misses.
    pub near_miss_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: Duration::days(14),
            near_miss_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    New,
    /// `(source, external_id)` is already stored.
    KnownExternalId { existing_id: i64 },
    /// Synthesized id, but the same company and title were stored recently.
    RecentMatch { existing_id: i64 },
}

impl DedupDecision {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::New)
    }
}

pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn normalize_key_fragment(input: &str) -> String {
        input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn same_or_missing_location(a: Option<&str>, b: Option<&str>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => Self::normalize_key_fragment(a) == Self::normalize_key_fragment(b),
            _ => true,
        }
    }

    pub async fn is_duplicate(
        &self,
        candidate: &RawPosting,
        store: &dyn JobStore,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.check(candidate, store, now).await?.is_duplicate())
    }

    /// Exact `(source, external_id)` first; the company/title fallback only
    /// runs for synthesized ids.
    pub async fn check(
        &self,
        candidate: &RawPosting,
        store: &dyn JobStore,
        now: DateTime<Utc>,
    ) -> Result<DedupDecision, StoreError> {
        if let Some(existing) = store
            .find_by_external_id(&candidate.source, &candidate.external_id)
            .await?
        {
            return Ok(DedupDecision::KnownExternalId { existing_id: existing.id });
        }

        let since = now - self.config.window;
        if candidate.external_id_synthesized {
            let recent = store
                .find_recent_by_company_title(&candidate.company, &candidate.title, since)
                .await?;
            if let Some(existing) = recent.iter().find(|job| {
                Self::same_or_missing_location(candidate.location.as_deref(), job.record.location.as_deref())
            }) {
                debug!(
                    source = %candidate.source,
                    external_id = %candidate.external_id,
                    existing_id = existing.id,
                    "synthesized id matched a recent company/title"
                );
                return Ok(DedupDecision::RecentMatch { existing_id: existing.id });
            }
        }

        self.log_near_misses(candidate, store, since).await?;
        Ok(DedupDecision::New)
    }

    async fn log_near_misses(
        &self,
        candidate: &RawPosting,
        store: &dyn JobStore,
        since: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let filter = JobFilter {
            company: Some(candidate.company.clone()),
            scraped_since: Some(since),
            ..JobFilter::default()
        };
        let title = Self::normalize_key_fragment(&candidate.title);
        for job in store.list(&filter).await? {
            let other = Self::normalize_key_fragment(&job.record.title);
            if other == title && job.record.source == candidate.source {
                continue;
            }
            let score = jaro_winkler(&title, &other);
            if score >= self.config.near_miss_threshold {
                warn!(
                    source = %candidate.source,
                    external_id = %candidate.external_id,
                    title = %candidate.title,
                    existing_id = job.id,
                    existing_source = %job.record.source,
                    similarity = score,
                    "possible duplicate kept as a new posting"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use roleradar_core::{JobSections, NewJob, SkillSet};
    use roleradar_storage::MemoryJobStore;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap()
    }

    fn mk_posting(external_id: &str, title: &str, location: Option<&str>, synthesized: bool) -> RawPosting {
        RawPosting {
            source: "ycombinator".into(),
            external_id: external_id.into(),
            external_id_synthesized: synthesized,
            title: title.into(),
            company: "Parcel Robotics".into(),
            location: location.map(ToString::to_string),
            description: String::new(),
            job_url: format!("https://www.ycombinator.com/jobs/{external_id}"),
            apply_url: None,
            date_posted: None,
            employment_type: None,
            remote_status: None,
            salary_range: None,
        }
    }

    fn mk_job(posting: &RawPosting, scraped: DateTime<Utc>) -> NewJob {
        NewJob {
            source: posting.source.clone(),
            external_id: posting.external_id.clone(),
            title: posting.title.clone(),
            company: posting.company.clone(),
            location: posting.location.clone(),
            job_url: posting.job_url.clone(),
            apply_url: None,
            employment_type: None,
            remote_status: None,
            salary_range: None,
            experience_level: None,
            date_posted: None,
            date_scraped: scraped,
            raw_description: String::new(),
            sections: JobSections::default(),
            skills: SkillSet::default(),
            relevance_score: 10.0,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn exact_external_id_is_a_duplicate() {
        let store = MemoryJobStore::new();
        let stored = mk_posting("abc", "Forward Deployed Engineer", None, false);
        let id = store.insert(mk_job(&stored, now())).await.unwrap();

        let dedup = Deduplicator::new(DedupConfig::default());
        let decision = dedup.check(&stored, &store, now()).await.unwrap();
        assert_eq!(decision, DedupDecision::KnownExternalId { existing_id: id });
    }

    #[tokio::test]
    async fn native_ids_never_use_the_fuzzy_fallback() {
        let store = MemoryJobStore::new();
        let stored = mk_posting("abc", "Forward Deployed Engineer", None, false);
        store.insert(mk_job(&stored, now())).await.unwrap();

        let dedup = Deduplicator::new(DedupConfig::default());
        let other = mk_posting("def", "Forward Deployed Engineer", None, false);
        assert!(!dedup.is_duplicate(&other, &store, now()).await.unwrap());
    }

    #[tokio::test]
    async fn synthesized_ids_match_recent_company_title() {
        let store = MemoryJobStore::new();
        let stored = mk_posting("syn-1", "Forward Deployed Engineer", Some("New York, NY"), true);
        let id = store.insert(mk_job(&stored, now() - Duration::days(3))).await.unwrap();

        let dedup = Deduplicator::new(DedupConfig::default());
        let again = mk_posting("syn-2", "  forward deployed engineer ", None, true);
        assert_eq!(
            dedup.check(&again, &store, now()).await.unwrap(),
            DedupDecision::RecentMatch { existing_id: id }
        );

        let elsewhere = mk_posting("syn-3", "Forward Deployed Engineer", Some("London"), true);
        assert!(!dedup.is_duplicate(&elsewhere, &store, now()).await.unwrap());
    }

    #[tokio::test]
    async fn fallback_respects_the_window() {
        let store = MemoryJobStore::new();
        let stored = mk_posting("syn-1", "Forward Deployed Engineer", None, true);
        store.insert(mk_job(&stored, now() - Duration::days(20))).await.unwrap();

        let dedup = Deduplicator::new(DedupConfig::default());
        let again = mk_posting("syn-2", "Forward Deployed Engineer", None, true);
        assert!(!dedup.is_duplicate(&again, &store, now()).await.unwrap());
    }

    #[tokio::test]
    async fn near_misses_are_not_duplicates() {
        let store = MemoryJobStore::new();
        let stored = mk_posting("syn-1", "Forward Deployed Engineer", None, true);
        store.insert(mk_job(&stored, now())).await.unwrap();

        let dedup = Deduplicator::new(DedupConfig::default());
        let close = mk_posting("syn-2", "Forward Deployed Engineers", None, true);
        assert_eq!(dedup.check(&close, &store, now()).await.unwrap(), DedupDecision::New);
    }

    #[tokio::test]
    async fn unavailable_store_propagates() {
        let store = MemoryJobStore::new();
        store.set_unavailable(true);
        let dedup = Deduplicator::new(DedupConfig::default());
        let posting = mk_posting("abc", "FDE", None, false);
        let err = dedup.check(&posting, &store, now()).await.unwrap_err();
        assert!(!err.is_conflict());
    }

    #[test]
    fn key_fragments_are_normalized() {
        assert_eq!(
            Deduplicator::normalize_key_fragment("  Forward-Deployed   Engineer (NYC) "),
            "forward deployed engineer nyc"
        );
    }
}
