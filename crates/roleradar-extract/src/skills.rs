use std::collections::BTreeMap;

use regex::Regex;
use roleradar_core::{JobSections, NormalizedJob, SkillFrequency, SkillSet};

use crate::dictionary::{compile_forms, DictionaryError, KeywordDictionary, ScoringWeights, SkillEntry};

pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone)]
struct CompiledSkill {
    name: String,
    pattern: Regex,
}

#[derive(Debug, Clone)]
struct CompiledRole {
    phrase: String,
    pattern: Regex,
    weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub skills: SkillSet,
    pub relevance_score: f64,
}

/// Keyword matcher and relevance scorer compiled from a [`KeywordDictionary`].
///
/// Pure: the same text and dictionary version always produce the same result.
#[derive(Debug, Clone)]
pub struct SkillExtractor {
    version: u32,
    required_skills: Vec<CompiledSkill>,
    bonus_skills: Vec<CompiledSkill>,
    technologies: Vec<CompiledSkill>,
    ai_ml_keywords: Vec<CompiledSkill>,
    role_phrases: Vec<CompiledRole>,
    scoring: ScoringWeights,
}

fn compile_category(entries: &[SkillEntry]) -> Result<Vec<CompiledSkill>, DictionaryError> {
    entries
        .iter()
        .map(|entry| {
            Ok(CompiledSkill {
                name: entry.name.clone(),
                pattern: compile_forms(&entry.name, &entry.surface_forms())?,
            })
        })
        .collect()
}

/// Canonical names in dictionary order, each at most once.
fn matched_names(skills: &[CompiledSkill], haystack: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for skill in skills {
        if skill.pattern.is_match(haystack) && !out.contains(&skill.name) {
            out.push(skill.name.clone());
        }
    }
    out
}

fn capped(hits: usize, per_hit: f64, cap: f64) -> f64 {
    (hits as f64 * per_hit).min(cap)
}

impl SkillExtractor {
    pub fn new(dictionary: &KeywordDictionary) -> Result<Self, DictionaryError> {
        let categories = &dictionary.categories;
        let role_phrases = dictionary
            .role_phrases
            .iter()
            .map(|role| {
                Ok(CompiledRole {
                    phrase: role.phrase.clone(),
                    pattern: compile_forms(&role.phrase, &[role.phrase.as_str()])?,
                    weight: role.weight,
                })
            })
            .collect::<Result<Vec<_>, DictionaryError>>()?;

        Ok(Self {
            version: dictionary.version,
            required_skills: compile_category(&categories.required_skills)?,
            bonus_skills: compile_category(&categories.bonus_skills)?,
            technologies: compile_category(&categories.technologies)?,
            ai_ml_keywords: compile_category(&categories.ai_ml_keywords)?,
            role_phrases,
            scoring: dictionary.scoring,
        })
    }

    pub fn dictionary_version(&self) -> u32 {
        self.version
    }

    pub fn extract(&self, text: &str, sections: &JobSections) -> Extraction {
        self.extract_posting("", text, sections)
    }

    /// Like [`extract`](Self::extract), but role phrases in `title` count at full weight.
    pub fn extract_posting(&self, title: &str, text: &str, sections: &JobSections) -> Extraction {
        let haystack = scan_text(text, sections);
        let skills = SkillSet {
            required_skills: matched_names(&self.required_skills, &haystack),
            bonus_skills: matched_names(&self.bonus_skills, &haystack),
            technologies: matched_names(&self.technologies, &haystack),
            ai_ml_keywords: matched_names(&self.ai_ml_keywords, &haystack),
        };
        let relevance_score = self.score(title, &haystack, &skills);
        Extraction { skills, relevance_score }
    }

    /// Role phrases matched in the title or body, strongest first.
    pub fn matched_role_phrases(&self, title: &str, text: &str) -> Vec<&str> {
        let mut hits = self
            .role_phrases
            .iter()
            .filter(|role| role.pattern.is_match(title) || role.pattern.is_match(text))
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        hits.into_iter().map(|role| role.phrase.as_str()).collect()
    }

    fn role_weight(&self, title: &str, haystack: &str) -> f64 {
        self.role_phrases
            .iter()
            .map(|role| {
                if role.pattern.is_match(title) {
                    role.weight
                } else if role.pattern.is_match(haystack) {
                    role.weight * self.scoring.text_role_factor
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max)
    }

    fn score(&self, title: &str, haystack: &str, skills: &SkillSet) -> f64 {
        let s = &self.scoring;
        let raw = self.role_weight(title, haystack)
            + capped(skills.ai_ml_keywords.len(), s.ai_ml_per_hit, s.ai_ml_cap)
            + capped(skills.required_skills.len(), s.required_per_hit, s.required_cap)
            + capped(skills.technologies.len(), s.technology_per_hit, s.technology_cap);
        (raw.clamp(0.0, MAX_SCORE) * 10.0).round() / 10.0
    }
}

fn scan_text(text: &str, sections: &JobSections) -> String {
    let mut haystack = text.to_string();
    for section in [
        &sections.responsibilities,
        &sections.qualifications,
        &sections.nice_to_have,
        &sections.about_role,
        &sections.about_company,
    ]
    .into_iter()
    .flatten()
    {
        haystack.push('\n');
        haystack.push_str(section);
    }
    haystack
}

/// How many stored jobs mention each skill, most frequent first.
pub fn skill_frequencies(jobs: &[NormalizedJob]) -> Vec<SkillFrequency> {
    let mut counts: BTreeMap<(&'static str, &str), usize> = BTreeMap::new();
    for job in jobs {
        let skills = &job.record.skills;
        for (category, names) in [
            ("required_skills", &skills.required_skills),
            ("bonus_skills", &skills.bonus_skills),
            ("technologies", &skills.technologies),
            ("ai_ml_keywords", &skills.ai_ml_keywords),
        ] {
            for name in names {
                *counts.entry((category, name.as_str())).or_default() += 1;
            }
        }
    }

    let mut out = counts
        .into_iter()
        .map(|((category, skill), frequency)| SkillFrequency {
            skill: skill.to_string(),
            category: category.to_string(),
            frequency,
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::Utc;
    use roleradar_core::NewJob;

    use super::*;
    use crate::sections::parse_sections;

    fn workspace_extractor() -> SkillExtractor {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        SkillExtractor::new(&KeywordDictionary::from_workspace_root(&root).unwrap()).unwrap()
    }

    fn small_extractor() -> SkillExtractor {
        let yaml = r#"
version: 1
categories:
  required_skills:
    - name: Python
      patterns: [python]
    - name: SQL
  technologies:
    - name: AWS
      patterns: [aws, amazon web services]
  ai_ml_keywords:
    - {name: LLMs, patterns: [llm, llms]}
    - {name: RAG, patterns: [rag]}
    - {name: Agents, patterns: [agents]}
    - {name: Evals, patterns: [evals]}
    - {name: Embeddings, patterns: [embeddings]}
    - {name: Fine-Tuning, patterns: [fine-tuning]}
role_phrases:
  - phrase: forward deployed
    weight: 50
  - phrase: solutions engineer
    weight: 40
"#;
        let dictionary = KeywordDictionary::from_yaml_str(yaml, Path::new("inline.yaml")).unwrap();
        SkillExtractor::new(&dictionary).unwrap()
    }

    #[test]
    fn python_is_found_in_qualifications() {
        let text = "Responsibilities:\n- Build APIs\nQualifications:\n- 3 yrs Python";
        let sections = parse_sections(text);
        let extraction = workspace_extractor().extract(text, &sections);
        assert!(extraction.skills.required_skills.contains(&"Python".to_string()));
    }

    #[test]
    fn matches_follow_dictionary_order_without_duplicates() {
        let extraction = small_extractor().extract("sql, Python, PYTHON and more python", &JobSections::default());
        assert_eq!(extraction.skills.required_skills, vec!["Python", "SQL"]);
        assert!(extraction.skills.bonus_skills.is_empty());
    }

    #[test]
    fn title_role_phrase_counts_fully_and_body_phrase_counts_half() {
        let extractor = small_extractor();
        let text = "We ship LLM and RAG systems in Python on AWS.";
        let titled = extractor.extract_posting("Forward Deployed Engineer", text, &JobSections::default());
        assert_eq!(titled.relevance_score, 50.0 + 10.0 + 2.0 + 2.0);

        let body_only = extractor.extract_posting(
            "Software Engineer",
            &format!("{text} You will work as a forward deployed partner."),
            &JobSections::default(),
        );
        assert_eq!(body_only.relevance_score, 25.0 + 10.0 + 2.0 + 2.0);
    }

    #[test]
    fn strongest_role_phrase_wins() {
        let extractor = small_extractor();
        let score = extractor
            .extract_posting("Forward Deployed Solutions Engineer", "", &JobSections::default())
            .relevance_score;
        assert_eq!(score, 50.0);
        assert_eq!(
            extractor.matched_role_phrases("Forward Deployed Solutions Engineer", ""),
            vec!["forward deployed", "solutions engineer"]
        );
    }

    #[test]
    fn ai_ml_contribution_is_capped() {
        let text = "llm rag agents evals embeddings fine-tuning";
        let extraction = small_extractor().extract(text, &JobSections::default());
        assert_eq!(extraction.skills.ai_ml_keywords.len(), 6);
        assert_eq!(extraction.relevance_score, 25.0);
    }

    #[test]
    fn score_stays_within_bounds_for_keyword_soup() {
        let extractor = workspace_extractor();
        let soup = "Forward Deployed FDE solutions engineer LLM RAG agents evals embeddings PyTorch \
                    Python TypeScript Java Go golang SQL GraphQL gRPC React Kafka AWS GCP Azure \
                    Docker Kubernetes Terraform Snowflake Databricks";
        let extraction = extractor.extract_posting("Forward Deployed Engineer", soup, &JobSections::default());
        assert!(extraction.relevance_score <= MAX_SCORE);
        assert_eq!(extraction.relevance_score, MAX_SCORE);

        let empty = extractor.extract_posting("", "", &JobSections::default());
        assert_eq!(empty.relevance_score, 0.0);
        assert_eq!(empty.skills, SkillSet::default());
    }

    #[test]
    fn adding_keywords_never_lowers_the_score() {
        let extractor = workspace_extractor();
        let keywords = [
            "python", "llm", "kubernetes", "rag", "sql", "aws", "customer-facing", "agents", "react",
            "snowflake", "evals", "golang", "terraform", "forward deployed", "embeddings",
        ];
        let mut text = String::from("Engineer role.");
        let mut last = extractor.extract(&text, &JobSections::default()).relevance_score;
        for keyword in keywords {
            text.push(' ');
            text.push_str(keyword);
            let next = extractor.extract(&text, &JobSections::default()).relevance_score;
            assert!(next >= last, "{keyword}: {next} < {last}");
            last = next;
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = workspace_extractor();
        let text = "About the role\nBuild RAG pipelines with Python and Postgres on GCP.";
        let sections = parse_sections(text);
        assert_eq!(extractor.extract(text, &sections), extractor.extract(text, &sections));
    }

    fn job_with(required: &[&str], ai: &[&str]) -> NormalizedJob {
        NormalizedJob::new(
            1,
            NewJob {
                source: "lever".into(),
                external_id: "x".into(),
                title: "FDE".into(),
                company: "Acme".into(),
                location: None,
                job_url: "https://jobs.example.com/x".into(),
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
                    required_skills: required.iter().map(ToString::to_string).collect(),
                    ai_ml_keywords: ai.iter().map(ToString::to_string).collect(),
                    ..SkillSet::default()
                },
                relevance_score: 0.0,
                is_active: true,
            },
        )
    }

    #[test]
    fn frequencies_count_jobs_per_skill() {
        let jobs = vec![
            job_with(&["Python", "SQL"], &["LLMs"]),
            job_with(&["Python"], &["LLMs", "RAG"]),
            job_with(&["Python"], &[]),
        ];
        let table = skill_frequencies(&jobs);
        assert_eq!(table[0].skill, "Python");
        assert_eq!(table[0].category, "required_skills");
        assert_eq!(table[0].frequency, 3);
        assert_eq!(table[1].skill, "LLMs");
        assert_eq!(table[1].frequency, 2);
        assert_eq!(table.len(), 4);
    }
}
