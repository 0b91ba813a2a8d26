//! Deterministic text enrichment: section splitting, keyword skills and relevance scoring.

mod dictionary;
mod infer;
mod sections;
mod skills;

use chrono::{DateTime, Utc};
use roleradar_core::{NewJob, RawPosting};

pub use dictionary::{
    DictionaryCategories, DictionaryError, KeywordDictionary, RolePhrase, ScoringWeights, SkillEntry,
};
pub use infer::{infer_experience_level, infer_remote_status};
pub use sections::{bullet_points, classify_heading, parse_sections, SectionKind};
pub use skills::{skill_frequencies, Extraction, SkillExtractor, MAX_SCORE};

pub const CRATE_NAME: &str = "roleradar-extract";

/// Turns a fetched posting into a storable job record.
///
/// `date_scraped` is supplied by the caller so every job in a run shares the
/// run's start time.
pub fn enrich_posting(extractor: &SkillExtractor, raw: &RawPosting, date_scraped: DateTime<Utc>) -> NewJob {
    let sections = parse_sections(&raw.description);
    let extraction = extractor.extract_posting(&raw.title, &raw.description, &sections);
    let remote_status = raw
        .remote_status
        .clone()
        .or_else(|| infer_remote_status(raw.location.as_deref(), &raw.description));

    NewJob {
        source: raw.source.clone(),
        external_id: raw.external_id.clone(),
        title: raw.title.clone(),
        company: raw.company.clone(),
        location: raw.location.clone(),
        job_url: raw.job_url.clone(),
        apply_url: raw.apply_url.clone(),
        employment_type: raw.employment_type.clone(),
        remote_status,
        salary_range: raw.salary_range.clone(),
        experience_level: infer_experience_level(&raw.title),
        date_posted: raw.date_posted,
        date_scraped,
        raw_description: raw.description.clone(),
        sections,
        skills: extraction.skills,
        relevance_score: extraction.relevance_score,
        is_active: true,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::TimeZone;

    use super::*;

    fn posting(title: &str, description: &str) -> RawPosting {
        RawPosting {
            source: "greenhouse".into(),
            external_id: "101".into(),
            external_id_synthesized: false,
            title: title.into(),
            company: "Acme AI".into(),
            location: Some("Remote - US".into()),
            description: description.into(),
            job_url: "https://boards.greenhouse.io/acmeai/jobs/101".into(),
            apply_url: None,
            date_posted: None,
            employment_type: None,
            remote_status: None,
            salary_range: None,
        }
    }

    #[test]
    fn enriched_job_carries_sections_skills_and_inferred_fields() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let extractor = SkillExtractor::new(&KeywordDictionary::from_workspace_root(&root).unwrap()).unwrap();
        let scraped = Utc.with_ymd_and_hms(2026, 3, 10, 6, 0, 0).single().unwrap();
        let raw = posting(
            "Senior Forward Deployed Engineer",
            "Responsibilities:\n- Deploy LLM agents for customers\nQualifications:\n- 3 yrs Python\n- AWS",
        );

        let job = enrich_posting(&extractor, &raw, scraped);
        assert_eq!(job.date_scraped, scraped);
        assert_eq!(job.experience_level.as_deref(), Some("senior"));
        assert_eq!(job.remote_status.as_deref(), Some("remote"));
        assert_eq!(job.sections.responsibilities.as_deref(), Some("- Deploy LLM agents for customers"));
        assert!(job.skills.required_skills.contains(&"Python".to_string()));
        assert!(job.skills.technologies.contains(&"AWS".to_string()));
        assert!(job.skills.ai_ml_keywords.contains(&"LLMs".to_string()));
        assert!(job.relevance_score >= 50.0 && job.relevance_score <= MAX_SCORE);
        assert!(job.is_active);
    }

    #[test]
    fn source_remote_status_is_kept() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let extractor = SkillExtractor::new(&KeywordDictionary::from_workspace_root(&root).unwrap()).unwrap();
        let mut raw = posting("FDE", "");
        raw.remote_status = Some("hybrid".into());
        let job = enrich_posting(&extractor, &raw, Utc::now());
        assert_eq!(job.remote_status.as_deref(), Some("hybrid"));
        assert!(job.sections.is_empty());
    }
}
