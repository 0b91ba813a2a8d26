use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, TimeDelta, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::FetchError;

static RELATIVE_AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\+?\s*(minute|min|hour|hr|day|week|wk|month|mo)s?\s+ago")
        .expect("relative age pattern")
});

const BAY_AREA_PLACES: &[&str] = &[
    "san francisco",
    "sf bay",
    "bay area",
    "silicon valley",
    "palo alto",
    "mountain view",
    "sunnyvale",
    "san jose",
    "oakland",
    "berkeley",
    "redwood city",
    "menlo park",
    "san mateo",
    "fremont",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "ul", "ol", "table", "tr", "h1", "h2",
    "h3", "h4", "h5", "h6", "blockquote", "pre",
];

pub(crate) fn text_or_none(value: impl AsRef<str>) -> Option<String> {
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Message(format!("selector {css}: {e}")))
}

pub(crate) fn select_first_text(root: ElementRef<'_>, sel: &Selector) -> Option<String> {
    root.select(sel)
        .next()
        .and_then(|n| text_or_none(collapse_whitespace(&n.text().collect::<String>())))
}

pub(crate) fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

/// Renders a string or numeric JSON id as text.
pub(crate) fn json_id(value: &JsonValue, key: &str) -> Option<String> {
    match value.get(key)? {
        JsonValue::String(s) => text_or_none(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts an HTML fragment into line-oriented plain text.
///
/// Block elements start new lines and list items become `- item` lines, so
/// headings like "Responsibilities" end up on their own line. Entity-escaped
/// markup (`&lt;p&gt;...`), as served by some ATS feeds, is unescaped first.
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') && !html.contains("&lt;") {
        return tidy_lines(html);
    }

    let fragment = Html::parse_fragment(html);
    let fragment = if html.contains("&lt;") && !html.contains('<') {
        let unescaped = fragment.root_element().text().collect::<String>();
        Html::parse_fragment(&unescaped)
    } else {
        fragment
    };

    let mut out = String::new();
    render_element(fragment.root_element(), &mut out);
    tidy_lines(&out)
}

fn tidy_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if collapsed.is_empty() {
                    if !out.ends_with(char::is_whitespace) && !out.is_empty() {
                        out.push(' ');
                    }
                    continue;
                }
                if text.starts_with(char::is_whitespace) && !out.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
                out.push_str(&collapsed);
                if text.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            Node::Element(el) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                match el.name() {
                    "script" | "style" => {}
                    "br" => out.push('\n'),
                    "li" => {
                        out.push_str("\n- ");
                        render_element(child_el, out);
                        out.push('\n');
                    }
                    name if BLOCK_TAGS.contains(&name) => {
                        out.push('\n');
                        render_element(child_el, out);
                        out.push('\n');
                    }
                    _ => render_element(child_el, out),
                }
            }
            _ => {}
        }
    }
}

/// Stable substitute id for sources without a native identifier.
pub fn synthesize_external_id(title: &str, company: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(company.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(url.trim().as_bytes());
    let digest = hasher.finalize();
    format!("syn-{}", hex::encode(&digest[..12]))
}

/// Parses "today", "yesterday", "3 days ago", "2 weeks ago", "1 month ago" and friends.
/// A month counts as 30 days.
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("just now") || lower.contains("today") || lower.contains("just posted") {
        return Some(now);
    }
    if lower.contains("yesterday") {
        return Some(now - Duration::days(1));
    }

    let caps = RELATIVE_AGE.captures(&lower)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    // Out-of-range ages yield `None`.
    let delta = match caps.get(2)?.as_str() {
        "minute" | "min" => TimeDelta::try_minutes(amount),
        "hour" | "hr" => TimeDelta::try_hours(amount),
        "day" => TimeDelta::try_days(amount),
        "week" | "wk" => TimeDelta::try_weeks(amount),
        _ => amount.checked_mul(30).and_then(TimeDelta::try_days),
    }?;
    now.checked_sub_signed(delta)
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
pub fn parse_iso_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

pub fn parse_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Folds the common Bay Area spellings into one label; other locations pass through trimmed.
pub fn normalize_location(location: &str) -> Option<String> {
    let trimmed = text_or_none(location)?;
    let lower = trimmed.to_lowercase();
    if lower == "sf" || BAY_AREA_PLACES.iter().any(|place| lower.contains(place)) {
        return Some("San Francisco Bay Area".to_string());
    }
    Some(trimmed)
}

/// Maps ATS workplace labels onto `remote`, `hybrid` or `onsite`.
pub(crate) fn normalize_workplace(value: &str) -> Option<String> {
    let canonical = match value.trim().to_lowercase().as_str() {
        "remote" => "remote",
        "hybrid" => "hybrid",
        "onsite" | "on-site" | "on_site" | "in-office" | "in office" => "onsite",
        _ => return None,
    };
    Some(canonical.to_string())
}
