use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("reading {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid pattern {pattern:?} for skill {skill}")]
    Pattern {
        skill: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid keyword dictionary: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    /// Surface forms; the canonical name is matched when empty.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl SkillEntry {
    pub fn surface_forms(&self) -> Vec<&str> {
        if self.patterns.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.patterns.iter().map(String::as_str).collect()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DictionaryCategories {
    #[serde(default)]
    pub required_skills: Vec<SkillEntry>,
    #[serde(default)]
    pub bonus_skills: Vec<SkillEntry>,
    #[serde(default)]
    pub technologies: Vec<SkillEntry>,
    #[serde(default)]
    pub ai_ml_keywords: Vec<SkillEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RolePhrase {
    pub phrase: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoringWeights {
    pub ai_ml_per_hit: f64,
    pub ai_ml_cap: f64,
    pub required_per_hit: f64,
    pub required_cap: f64,
    pub technology_per_hit: f64,
    pub technology_cap: f64,
    /// Multiplier for role phrases found in the body rather than the title.
    pub text_role_factor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            ai_ml_per_hit: 5.0,
            ai_ml_cap: 25.0,
            required_per_hit: 2.0,
            required_cap: 15.0,
            technology_per_hit: 2.0,
            technology_cap: 10.0,
            text_role_factor: 0.5,
        }
    }
}

/// Versioned keyword dictionary, normally `rules/keywords.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordDictionary {
    pub version: u32,
    #[serde(default)]
    pub categories: DictionaryCategories,
    #[serde(default)]
    pub role_phrases: Vec<RolePhrase>,
    #[serde(default)]
    pub scoring: ScoringWeights,
}

impl KeywordDictionary {
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self, DictionaryError> {
        let dictionary: Self = serde_yaml::from_str(text).map_err(|source| DictionaryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        dictionary.validate()?;
        Ok(dictionary)
    }

    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let text = std::fs::read_to_string(path).map_err(|source| DictionaryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let dictionary = Self::from_yaml_str(&text, path)?;
        debug!(
            path = %path.display(),
            version = dictionary.version,
            entries = dictionary.entry_count(),
            "loaded keyword dictionary"
        );
        Ok(dictionary)
    }

    pub fn from_workspace_root(root: &Path) -> Result<Self, DictionaryError> {
        Self::load(&root.join("rules").join("keywords.yaml"))
    }

    pub fn entry_count(&self) -> usize {
        let c = &self.categories;
        c.required_skills.len() + c.bonus_skills.len() + c.technologies.len() + c.ai_ml_keywords.len()
    }

    /// Rejects negative or non-finite weights and a zero version.
    fn validate(&self) -> Result<(), DictionaryError> {
        if self.version == 0 {
            return Err(DictionaryError::Invalid("version must be at least 1".into()));
        }
        let s = &self.scoring;
        let weights = [
            s.ai_ml_per_hit,
            s.ai_ml_cap,
            s.required_per_hit,
            s.required_cap,
            s.technology_per_hit,
            s.technology_cap,
            s.text_role_factor,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DictionaryError::Invalid("scoring weights must be finite and non-negative".into()));
        }
        if let Some(bad) = self
            .role_phrases
            .iter()
            .find(|r| !r.weight.is_finite() || r.weight < 0.0 || r.phrase.trim().is_empty())
        {
            return Err(DictionaryError::Invalid(format!("bad role phrase {:?}", bad.phrase)));
        }
        Ok(())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive, boundary-anchored regex for one surface form.
///
/// `\b` only works next to word characters, so forms such as `c++`, `c#`
/// or `.net` are anchored on non-word characters or the text edges instead.
pub(crate) fn surface_pattern(form: &str) -> String {
    let form = form.trim();
    let escaped = regex::escape(form);
    let left = match form.chars().next() {
        Some(c) if is_word_char(c) => r"\b",
        _ => r"(?:^|\W)",
    };
    let right = match form.chars().last() {
        Some(c) if is_word_char(c) => r"\b",
        _ => r"(?:\W|$)",
    };
    format!("{left}{escaped}{right}")
}

pub(crate) fn compile_forms(skill: &str, forms: &[&str]) -> Result<Regex, DictionaryError> {
    let alternation = forms
        .iter()
        .filter(|f| !f.trim().is_empty())
        .map(|f| surface_pattern(f))
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        return Err(DictionaryError::Invalid(format!("skill {skill} has no usable patterns")));
    }
    let pattern = format!("(?i)(?:{alternation})");
    Regex::new(&pattern).map_err(|source| DictionaryError::Pattern {
        skill: skill.to_string(),
        pattern,
        source,
    })
}
