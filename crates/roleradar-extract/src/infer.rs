const REMOTE_PHRASES: &[&str] = &[
    "fully remote",
    "100% remote",
    "remote-first",
    "remote first",
    "remote-friendly",
    "work from anywhere",
    "remote position",
    "remote role",
];

const ONSITE_PHRASES: &[&str] = &["on-site", "onsite", "in-office", "in office", "in-person", "in person"];

fn title_tokens(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Seniority from title words. Checked from the most specific level down.
pub fn infer_experience_level(title: &str) -> Option<String> {
    let tokens = title_tokens(title);
    let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));
    let lower = title.to_lowercase();

    let level = if has(&["intern", "internship"]) {
        "intern"
    } else if has(&["principal", "distinguished"]) {
        "principal"
    } else if has(&["staff"]) {
        "staff"
    } else if has(&["lead"]) || lower.contains("head of") {
        "lead"
    } else if has(&["senior", "sr", "iii"]) {
        "senior"
    } else if has(&["junior", "jr", "entry"]) || lower.contains("new grad") {
        "junior"
    } else if has(&["mid", "intermediate", "ii"]) || lower.contains("mid-level") {
        "mid"
    } else {
        return None;
    };
    Some(level.to_string())
}

/// `remote`, `hybrid` or `onsite` from the location first, then the description.
pub fn infer_remote_status(location: Option<&str>, description: &str) -> Option<String> {
    if let Some(location) = location {
        let location = location.to_lowercase();
        if location.contains("hybrid") {
            return Some("hybrid".to_string());
        }
        if location.contains("remote") {
            return Some("remote".to_string());
        }
    }

    let text = description.to_lowercase();
    let status = if text.contains("hybrid") {
        "hybrid"
    } else if REMOTE_PHRASES.iter().any(|p| text.contains(p)) {
        "remote"
    } else if ONSITE_PHRASES.iter().any(|p| text.contains(p)) {
        "onsite"
    } else {
        return None;
    };
    Some(status.to_string())
}
