use async_trait::async_trait;
use roleradar_core::RawPosting;
use roleradar_storage::HttpFetcher;
use serde_json::Value as JsonValue;

use crate::text::{
    html_to_text, json_id, json_str, normalize_location, normalize_workplace, parse_iso_datetime,
    text_or_none,
};
use crate::{
    AdapterContext, BoardTarget, Crawlability, FetchError, FetchOutcome, ParsedBatch, SourceAdapter,
    SourceConfig, TargetTally,
};

const API_BASE: &str = "https://api.ashbyhq.com/posting-api/job-board";

#[derive(Debug, Clone, Copy, Default)]
pub struct AshbyAdapter;

/// Parses the public Ashby posting API payload. Unlisted jobs are ignored.
pub fn parse_ashby_board(payload: &JsonValue, board: &BoardTarget) -> Result<ParsedBatch, FetchError> {
    let jobs = payload
        .get("jobs")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| FetchError::Message(format!("ashby board {} has no jobs array", board.token)))?;

    let company = board.company_name();
    let mut batch = ParsedBatch::default();
    for job in jobs {
        if job.get("isListed").and_then(JsonValue::as_bool) == Some(false) {
            continue;
        }
        batch.push(parse_job(job, &company));
    }
    Ok(batch)
}

fn parse_job(job: &JsonValue, company: &str) -> Option<RawPosting> {
    let external_id = json_id(job, "id")?;
    let title = text_or_none(json_str(job, &["title"])?)?;
    let job_url = text_or_none(json_str(job, &["jobUrl"])?)?;

    let description = json_str(job, &["descriptionHtml"])
        .map(html_to_text)
        .or_else(|| json_str(job, &["descriptionPlain"]).map(ToString::to_string))
        .unwrap_or_default();
    let remote_status = json_str(job, &["workplaceType"])
        .and_then(normalize_workplace)
        .or_else(|| {
            (job.get("isRemote").and_then(JsonValue::as_bool) == Some(true)).then(|| "remote".to_string())
        });

    Some(RawPosting {
        source: "ashby".to_string(),
        external_id,
        external_id_synthesized: false,
        title,
        company: company.to_string(),
        location: json_str(job, &["location"]).and_then(normalize_location),
        description,
        apply_url: json_str(job, &["applyUrl"]).and_then(text_or_none),
        job_url,
        date_posted: json_str(job, &["publishedAt"]).and_then(parse_iso_datetime),
        employment_type: json_str(job, &["employmentType"]).and_then(employment_label),
        remote_status,
        salary_range: json_str(job, &["compensation", "compensationTierSummary"]).and_then(text_or_none),
    })
}

fn employment_label(raw: &str) -> Option<String> {
    let label = match raw {
        "FullTime" => "Full-time",
        "PartTime" => "Part-time",
        "Intern" => "Internship",
        "Contract" => "Contract",
        "Temporary" => "Temporary",
        other => return text_or_none(other),
    };
    Some(label.to_string())
}

#[async_trait]
impl SourceAdapter for AshbyAdapter {
    fn source_tag(&self) -> &'static str {
        "ashby"
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
            let url = format!("{API_BASE}/{}?includeCompensation=true", board.token);
            let parsed = match http.get_json::<JsonValue>(ctx.run_id, self.source_tag(), &url).await {
                Ok(payload) => parse_ashby_board(&payload, board),
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
    fn unlisted_jobs_are_ignored_and_remote_flag_is_used() {
        let payload = json!({
            "jobs": [
                {
                    "id": "b7f0", "title": "Forward Deployed Engineer, Agents",
                    "jobUrl": "https://jobs.ashbyhq.com/acme/b7f0",
                    "location": "Remote - US", "isRemote": true,
                    "employmentType": "FullTime",
                    "publishedAt": "2026-03-02T17:00:00.000+00:00",
                    "descriptionHtml": "<p>About the role</p><p>Work with customers.</p>",
                    "compensation": {"compensationTierSummary": "$170K – $230K"}
                },
                {"id": "hidden", "title": "Internal", "jobUrl": "https://jobs.ashbyhq.com/acme/hidden", "isListed": false}
            ]
        });
        let board = BoardTarget { token: "acme".into(), company: Some("Acme".into()) };
        let batch = parse_ashby_board(&payload, &board).unwrap();
        assert_eq!(batch.postings.len(), 1);
        assert_eq!(batch.skipped, 0);
        let p = &batch.postings[0];
        assert_eq!(p.remote_status.as_deref(), Some("remote"));
        assert_eq!(p.employment_type.as_deref(), Some("Full-time"));
        assert_eq!(p.salary_range.as_deref(), Some("$170K – $230K"));
        assert_eq!(p.description, "About the role\nWork with customers.");
        assert!(p.date_posted.is_some());
    }
}
