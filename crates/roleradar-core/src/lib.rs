//! Core domain model for RoleRadar postings, jobs and run bookkeeping.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "roleradar-core";

/// Source-specific posting as handed from an adapter to the orchestrator.
///
/// Ephemeral: it is discarded once the orchestrator has turned it into a
/// [`NewJob`] or decided to skip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: String,
    pub external_id: String,
    /// True when the source exposed no native id and `external_id` is a hash.
    #[serde(default)]
    pub external_id_synthesized: bool,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    /// Plain text, or HTML when the source only provides markup.
    pub description: String,
    pub job_url: String,
    pub apply_url: Option<String>,
    pub date_posted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub remote_status: Option<String>,
    #[serde(default)]
    pub salary_range: Option<String>,
}

/// Semantic sections split out of a raw description. `None` means no heading matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSections {
    pub responsibilities: Option<String>,
    pub qualifications: Option<String>,
    pub nice_to_have: Option<String>,
    pub about_role: Option<String>,
    pub about_company: Option<String>,
}

impl JobSections {
    pub fn is_empty(&self) -> bool {
        self.responsibilities.is_none()
            && self.qualifications.is_none()
            && self.nice_to_have.is_none()
            && self.about_role.is_none()
            && self.about_company.is_none()
    }
}

/// Categorized keyword matches, each list insertion-ordered and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSet {
    pub required_skills: Vec<String>,
    pub bonus_skills: Vec<String>,
    pub technologies: Vec<String>,
    pub ai_ml_keywords: Vec<String>,
}

impl SkillSet {
    pub fn total(&self) -> usize {
        self.required_skills.len()
            + self.bonus_skills.len()
            + self.technologies.len()
            + self.ai_ml_keywords.len()
    }
}

/// Insert payload for the job store: a normalized job without its surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub job_url: String,
    pub apply_url: Option<String>,
    pub employment_type: Option<String>,
    pub remote_status: Option<String>,
    pub salary_range: Option<String>,
    pub experience_level: Option<String>,
    pub date_posted: Option<DateTime<Utc>>,
    pub date_scraped: DateTime<Utc>,
    pub raw_description: String,
    #[serde(flatten)]
    pub sections: JobSections,
    #[serde(flatten)]
    pub skills: SkillSet,
    pub relevance_score: f64,
    pub is_active: bool,
}

/// Canonical persisted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedJob {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewJob,
}

impl NormalizedJob {
    pub fn new(id: i64, record: NewJob) -> Self {
        Self { id, record }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Read-only view of orchestrator progress, safe to poll while a run is live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: RunStatus,
    pub current_step: String,
    pub sources_processed: usize,
    pub sources_total: usize,
    pub postings_found: usize,
    pub postings_added: usize,
    pub postings_skipped: usize,
    pub failed_sources: Vec<String>,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Per-source counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub found: usize,
    pub added: usize,
    pub skipped: usize,
    /// Listings the adapter could not parse.
    pub parse_skipped: usize,
    /// Postings rejected by the target profile or lookback window.
    pub filtered: usize,
    pub failed_targets: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub sources: BTreeMap<String, SourceStats>,
    pub failed_sources: Vec<String>,
    pub failure_reason: Option<String>,
}

impl RunSummary {
    pub fn total_found(&self) -> usize {
        self.sources.values().map(|s| s.found).sum()
    }

    pub fn total_added(&self) -> usize {
        self.sources.values().map(|s| s.added).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.sources.values().map(|s| s.skipped).sum()
    }
}

/// One row of the per-source run log written after every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRunLog {
    pub run_id: Uuid,
    pub source: String,
    pub jobs_found: usize,
    pub jobs_added: usize,
    pub jobs_skipped: usize,
    pub error: Option<String>,
    pub run_time_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillFrequency {
    pub skill: String,
    pub category: String,
    pub frequency: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_progress_is_idle() {
        let progress = ProgressSnapshot::default();
        assert_eq!(progress.status, RunStatus::Idle);
        assert!(progress.run_id.is_none());
        assert!(!progress.status.is_terminal());
    }

    #[test]
    fn run_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn normalized_job_flattens_record_fields() {
        let job = NormalizedJob::new(
            7,
            NewJob {
                source: "lever".into(),
                external_id: "abc".into(),
                title: "Forward Deployed Engineer".into(),
                company: "Acme".into(),
                location: None,
                job_url: "https://jobs.example.com/abc".into(),
                apply_url: None,
                employment_type: None,
                remote_status: None,
                salary_range: None,
                experience_level: None,
                date_posted: None,
                date_scraped: Utc::now(),
                raw_description: String::new(),
                sections: JobSections::default(),
                skills: SkillSet {
                    required_skills: vec!["Python".into()],
                    ..SkillSet::default()
                },
                relevance_score: 52.0,
                is_active: true,
            },
        );
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["title"], "Forward Deployed Engineer");
        assert_eq!(value["required_skills"][0], "Python");
        assert!(value["responsibilities"].is_null());
    }

    #[test]
    fn summary_totals_sum_sources() {
        let mut sources = BTreeMap::new();
        sources.insert(
            "greenhouse".to_string(),
            SourceStats { found: 3, added: 2, skipped: 1, ..SourceStats::default() },
        );
        sources.insert(
            "lever".to_string(),
            SourceStats { found: 4, added: 4, ..SourceStats::default() },
        );
        let now = Utc::now();
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            status: RunStatus::Completed,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            sources,
            failed_sources: vec![],
            failure_reason: None,
        };
        assert_eq!(summary.total_found(), 7);
        assert_eq!(summary.total_added(), 6);
        assert_eq!(summary.total_skipped(), 1);
    }
}
