use roleradar_core::JobSections;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Responsibilities,
    Qualifications,
    NiceToHave,
    AboutRole,
    AboutCompany,
}

impl SectionKind {
    const ALL: [SectionKind; 5] = [
        Self::Responsibilities,
        Self::Qualifications,
        Self::NiceToHave,
        Self::AboutRole,
        Self::AboutCompany,
    ];

    fn index(self) -> usize {
        match self {
            Self::Responsibilities => 0,
            Self::Qualifications => 1,
            Self::NiceToHave => 2,
            Self::AboutRole => 3,
            Self::AboutCompany => 4,
        }
    }
}

const HEADINGS: &[(SectionKind, &[&str])] = &[
    (
        SectionKind::Responsibilities,
        &[
            "responsibilities",
            "key responsibilities",
            "your responsibilities",
            "what you'll do",
            "what you will do",
            "what you'll be doing",
            "what you will be doing",
            "your role",
            "the role",
            "you will",
            "in this role",
            "in this role you will",
            "job duties",
            "duties",
            "duties and responsibilities",
            "day to day",
            "your impact",
        ],
    ),
    (
        SectionKind::Qualifications,
        &[
            "qualifications",
            "requirements",
            "minimum qualifications",
            "basic qualifications",
            "required qualifications",
            "what we're looking for",
            "what we are looking for",
            "who you are",
            "about you",
            "you have",
            "you bring",
            "you should have",
            "must have",
            "must haves",
            "required skills",
            "skills and experience",
            "ideal candidate",
            "the ideal candidate",
        ],
    ),
    (
        SectionKind::NiceToHave,
        &[
            "nice to have",
            "nice to haves",
            "bonus",
            "bonus points",
            "preferred",
            "preferred qualifications",
            "preferred skills",
            "plus",
            "desired skills",
            "extra credit",
            "you might also have",
        ],
    ),
    (
        SectionKind::AboutRole,
        &[
            "about the role",
            "about this role",
            "about the position",
            "about this position",
            "the opportunity",
            "overview",
            "role overview",
            "position summary",
            "job summary",
        ],
    ),
    (
        SectionKind::AboutCompany,
        &[
            "about us",
            "about the company",
            "who we are",
            "our company",
            "company description",
            "company overview",
        ],
    ),
];

/// Longest "About <Name>" line still treated as a company heading.
const ABOUT_NAME_MAX_CHARS: usize = 40;
const ABOUT_NAME_MAX_WORDS: usize = 4;

/// `- x`, `* x`, `• x` and `1. x` / `1) x` list items.
fn is_list_item(line: &str) -> bool {
    let t = line.trim_start();
    if t.starts_with("- ") || t.starts_with("* ") || t.starts_with('•') {
        return true;
    }
    let digits = t.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(t[digits..].chars().next(), Some('.' | ')'))
}

/// "About Acme AI" style company blurb headings. Never matches list items or
/// phrases carrying numbers ("about 5 years").
fn is_about_name(normalized: &str) -> bool {
    let Some(rest) = normalized.strip_prefix("about ") else {
        return false;
    };
    !rest.is_empty()
        && normalized.chars().count() <= ABOUT_NAME_MAX_CHARS
        && rest.split_whitespace().count() <= ABOUT_NAME_MAX_WORDS
        && !rest.chars().any(|c| c.is_ascii_digit())
}

fn normalize_heading(line: &str) -> String {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '-' | '•') || c.is_whitespace())
        .trim_end_matches(|c: char| matches!(c, ':' | '-' | '.' | '—' | '*') || c.is_whitespace());
    stripped
        .replace(['\u{2019}', '\u{2018}'], "'")
        .replace('-', " ")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn match_heading(normalized: &str, allow_about_name: bool) -> Option<SectionKind> {
    if normalized.is_empty() {
        return None;
    }
    for (kind, phrases) in HEADINGS {
        if phrases.contains(&normalized) {
            return Some(*kind);
        }
    }
    if allow_about_name && is_about_name(normalized) {
        return Some(SectionKind::AboutCompany);
    }
    None
}

/// Classifies a single line as a section heading.
///
/// Returns the section and, for `Heading: inline content` lines, the inline
/// content that opens the section.
pub fn classify_heading(line: &str) -> Option<(SectionKind, Option<String>)> {
    let allow_about_name = !is_list_item(line);
    if let Some(kind) = match_heading(&normalize_heading(line), allow_about_name) {
        return Some((kind, None));
    }
    let (head, rest) = line.split_once(':')?;
    let kind = match_heading(&normalize_heading(head), allow_about_name)?;
    let rest = rest.trim();
    if rest.is_empty() {
        Some((kind, None))
    } else {
        Some((kind, Some(rest.to_string())))
    }
}

fn finish(lines: &[String]) -> Option<String> {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Splits a plain-text description into semantic sections.
///
/// Text before the first recognized heading is dropped; unrecognized
/// headings stay inside whichever section precedes them. Never fails.
pub fn parse_sections(text: &str) -> JobSections {
    let mut buckets: [Vec<String>; 5] = Default::default();
    let mut current: Option<SectionKind> = None;

    for raw in text.lines() {
        let line = raw.trim_end();
        if let Some((kind, inline)) = classify_heading(line) {
            current = Some(kind);
            if let Some(inline) = inline {
                buckets[kind.index()].push(inline);
            }
            continue;
        }
        if let Some(kind) = current {
            buckets[kind.index()].push(line.trim_start().to_string());
        }
    }

    let [responsibilities, qualifications, nice_to_have, about_role, about_company] =
        SectionKind::ALL.map(|kind| finish(&buckets[kind.index()]));
    JobSections {
        responsibilities,
        qualifications,
        nice_to_have,
        about_role,
        about_company,
    }
}

/// Bullet items (`-`, `*`, `•` or numbered) from a section body, markers stripped.
pub fn bullet_points(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("• "))
                .or_else(|| strip_numbered(line))?;
            let item = item.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

fn strip_numbered(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..]
        .strip_prefix(". ")
        .or_else(|| line[digits..].strip_prefix(") "))
}
