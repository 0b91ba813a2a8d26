use async_trait::async_trait;
use roleradar_core::RawPosting;
use roleradar_storage::HttpFetcher;
use serde_json::Value as JsonValue;

use crate::text::{html_to_text, json_id, json_str, normalize_location, parse_iso_datetime, text_or_none};
use crate::{
    AdapterContext, BoardTarget, Crawlability, FetchError, FetchOutcome, ParsedBatch, SourceAdapter,
    SourceConfig, TargetTally,
};

const API_BASE: &str = "https://boards-api.greenhouse.io/v1/boards";

/// Greenhouse job board API, one request per company board token.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreenhouseAdapter;

/// Parses a `GET /v1/boards/{token}/jobs?content=true` payload.
pub fn parse_greenhouse_board(payload: &JsonValue, board: &BoardTarget) -> Result<ParsedBatch, FetchError> {
    let jobs = payload
        .get("jobs")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| FetchError::Message(format!("greenhouse board {} has no jobs array", board.token)))?;

    let mut batch = ParsedBatch::default();
    for job in jobs {
        batch.push(parse_job(job, board));
    }
    Ok(batch)
}

fn parse_job(job: &JsonValue, board: &BoardTarget) -> Option<RawPosting> {
    let external_id = json_id(job, "id")?;
    let title = text_or_none(json_str(job, &["title"])?)?;
    let job_url = text_or_none(json_str(job, &["absolute_url"])?)?;

    let company = board
        .company
        .clone()
        .or_else(|| json_str(job, &["company_name"]).and_then(text_or_none))
        .unwrap_or_else(|| board.token.clone());
    let date_posted = json_str(job, &["first_published"])
        .or_else(|| json_str(job, &["updated_at"]))
        .and_then(parse_iso_datetime);

    Some(RawPosting {
        source: "greenhouse".to_string(),
        external_id,
        external_id_synthesized: false,
        title,
        company,
        location: json_str(job, &["location", "name"]).and_then(normalize_location),
        description: json_str(job, &["content"]).map(html_to_text).unwrap_or_default(),
        apply_url: Some(job_url.clone()),
        job_url,
        date_posted,
        employment_type: None,
        remote_status: None,
        salary_range: None,
    })
}

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn source_tag(&self) -> &'static str {
        "greenhouse"
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
            let url = format!("{API_BASE}/{}/jobs?content=true", board.token);
            let parsed = match http.get_json::<JsonValue>(ctx.run_id, self.source_tag(), &url).await {
                Ok(payload) => parse_greenhouse_board(&payload, board),
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
