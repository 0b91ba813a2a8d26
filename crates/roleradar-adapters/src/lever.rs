use async_trait::async_trait;
use roleradar_core::RawPosting;
use roleradar_storage::HttpFetcher;
use serde_json::Value as JsonValue;

use crate::text::{
    html_to_text, json_id, json_str, normalize_location, normalize_workplace, parse_epoch_millis,
    text_or_none,
};
use crate::{
    AdapterContext, BoardTarget, Crawlability, FetchError, FetchOutcome, ParsedBatch, SourceAdapter,
    SourceConfig, TargetTally,
};

const API_BASE: &str = "https://api.lever.co/v0/postings";

#[derive(Debug, Clone, Copy, Default)]
pub struct LeverAdapter;

/// Parses a `GET /v0/postings/{slug}?mode=json` payload (a bare array).
pub fn parse_lever_postings(payload: &JsonValue, board: &BoardTarget) -> Result<ParsedBatch, FetchError> {
    let postings = payload
        .as_array()
        .ok_or_else(|| FetchError::Message(format!("lever board {} did not return an array", board.token)))?;

    let company = board.company_name();
    let mut batch = ParsedBatch::default();
    for posting in postings {
        batch.push(parse_posting(posting, &company));
    }
    Ok(batch)
}

fn parse_posting(posting: &JsonValue, company: &str) -> Option<RawPosting> {
    let external_id = json_id(posting, "id")?;
    let title = text_or_none(json_str(posting, &["text"])?)?;
    let job_url = text_or_none(json_str(posting, &["hostedUrl"])?)?;

    Some(RawPosting {
        source: "lever".to_string(),
        external_id,
        external_id_synthesized: false,
        title,
        company: company.to_string(),
        location: json_str(posting, &["categories", "location"]).and_then(normalize_location),
        description: assemble_description(posting),
        apply_url: json_str(posting, &["applyUrl"]).and_then(text_or_none),
        job_url,
        date_posted: posting
            .get("createdAt")
            .and_then(JsonValue::as_i64)
            .and_then(parse_epoch_millis),
        employment_type: json_str(posting, &["categories", "commitment"]).and_then(text_or_none),
        remote_status: json_str(posting, &["workplaceType"]).and_then(normalize_workplace),
        salary_range: salary_range(posting),
    })
}

/// Lever splits the body into an intro, titled lists and a closing block.
fn assemble_description(posting: &JsonValue) -> String {
    let mut parts = Vec::new();

    let intro = json_str(posting, &["descriptionPlain"])
        .map(ToString::to_string)
        .or_else(|| json_str(posting, &["description"]).map(html_to_text));
    parts.extend(intro.and_then(text_or_none));

    if let Some(lists) = posting.get("lists").and_then(JsonValue::as_array) {
        for list in lists {
            parts.extend(json_str(list, &["text"]).and_then(text_or_none));
            parts.extend(
                json_str(list, &["content"])
                    .map(html_to_text)
                    .and_then(text_or_none),
            );
        }
    }

    let closing = json_str(posting, &["additionalPlain"])
        .map(ToString::to_string)
        .or_else(|| json_str(posting, &["additional"]).map(html_to_text));
    parts.extend(closing.and_then(text_or_none));

    parts.join("\n")
}

fn salary_range(posting: &JsonValue) -> Option<String> {
    let range = posting.get("salaryRange")?;
    let min = range.get("min").and_then(JsonValue::as_f64)?;
    let max = range.get("max").and_then(JsonValue::as_f64)?;
    let currency = json_str(range, &["currency"]).unwrap_or("USD");
    let mut text = format!("{currency} {min:.0}-{max:.0}");
    if let Some(interval) = json_str(range, &["interval"]).and_then(text_or_none) {
        text.push_str(&format!(" {interval}"));
    }
    Some(text)
}

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn source_tag(&self) -> &'static str {
        "lever"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<FetchOutcome, FetchError> {
        let mut tally = TargetTally::default();
        for board in &source.boards {
            let url = format!("{API_BASE}/{}?mode=json", board.token);
            let parsed = match http.get_json::<JsonValue>(ctx.run_id, self.source_tag(), &url).await {
                Ok(payload) => parse_lever_postings(&payload, board),
                Err(err) => Err(err.into()),
            };
            match parsed {
                Ok(batch) => tally.succeeded(batch),
                Err(err) => tally.failed(self.source_tag(), &board.token, err),
            }
        }
        let mut outcome = tally.finish(self.source_tag())?;
        outcome.truncate(source.max_results);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_become_headed_sections() {
        let payload = json!([{
            "id": "9c1e2f6a-1111-4c2b-9e55-0123456789ab",
            "text": "Forward Deployed Engineer",
            "hostedUrl": "https://jobs.lever.co/acme/9c1e2f6a",
            "applyUrl": "https://jobs.lever.co/acme/9c1e2f6a/apply",
            "createdAt": 1772323200000i64,
            "categories": {"location": "New York, NY", "commitment": "Full-time"},
            "workplaceType": "hybrid",
            "descriptionPlain": "We deploy agents for enterprises.",
            "lists": [
                {"text": "What you'll do", "content": "<li>Build integrations</li><li>Run pilots</li>"},
                {"text": "Requirements", "content": "<li>Python</li>"}
            ],
            "salaryRange": {"min": 160000, "max": 210000, "currency": "USD", "interval": "per-year-salary"}
        }]);
        let board = BoardTarget { token: "acme".into(), company: Some("Acme".into()) };
        let batch = parse_lever_postings(&payload, &board).unwrap();
        let p = &batch.postings[0];
        assert_eq!(
            p.description,
            "We deploy agents for enterprises.\nWhat you'll do\n- Build integrations\n- Run pilots\nRequirements\n- Python"
        );
        assert_eq!(p.remote_status.as_deref(), Some("hybrid"));
        assert_eq!(p.employment_type.as_deref(), Some("Full-time"));
        assert_eq!(p.salary_range.as_deref(), Some("USD 160000-210000 per-year-salary"));
        assert_eq!(p.apply_url.as_deref(), Some("https://jobs.lever.co/acme/9c1e2f6a/apply"));
        assert!(p.date_posted.is_some());
    }

    #[test]
    fn non_array_payload_is_an_error() {
        let board = BoardTarget { token: "acme".into(), company: None };
        assert!(parse_lever_postings(&json!({"ok": false}), &board).is_err());
    }
}
