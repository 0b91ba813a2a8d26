use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleradar_core::RawPosting;
use roleradar_storage::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::text::{
    html_to_text, normalize_location, parse_relative_date, select_first_text, selector, synthesize_external_id,
    text_or_none,
};
use crate::{
    AdapterContext, Crawlability, FetchError, FetchOutcome, ParsedBatch, SourceAdapter, SourceConfig,
    TargetTally,
};

const BASE_URL: &str = "https://www.ycombinator.com";
const DEFAULT_LISTING: &str = "https://www.ycombinator.com/jobs/role/software-engineer";

/// Work at a Startup (YC) public job board, scraped from listing HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct YCombinatorAdapter;

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{BASE_URL}{href}")
    }
}

/// `/companies/{company}/jobs/{slug}` -> (company slug, job slug)
fn path_slugs(href: &str) -> (Option<&str>, Option<&str>) {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut company = None;
    let mut job = None;
    while let Some(segment) = segments.next() {
        match segment {
            "companies" => company = segments.next(),
            "jobs" => job = segments.next(),
            _ => {}
        }
    }
    (company, job)
}

fn title_case_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a listing page into postings. Descriptions are filled in later from detail pages.
pub fn parse_yc_listing(html: &str, now: DateTime<Utc>) -> Result<ParsedBatch, FetchError> {
    let document = Html::parse_document(html);
    let job_link = selector(r#"a[href*="/companies/"][href*="/jobs/"]"#)?;
    let title_sel = selector(r#"h2, h3, [class*="title"]"#)?;
    let company_sel = selector(r#"[class*="company"]"#)?;
    let location_sel = selector(r#"[class*="location"]"#)?;
    let posted_sel = selector(r#"[class*="posted"], time"#)?;

    let mut seen = HashSet::new();
    let mut batch = ParsedBatch::default();

    for anchor in document.select(&job_link) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let job_url = absolute_url(href);
        if !seen.insert(job_url.clone()) {
            continue;
        }

        // Card metadata sits either inside the link or next to it.
        let card = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .unwrap_or(anchor);
        let lookup = |sel: &Selector| select_first_text(anchor, sel).or_else(|| select_first_text(card, sel));

        let title = lookup(&title_sel)
            .or_else(|| text_or_none(anchor.text().collect::<Vec<_>>().join(" ")));
        let Some(title) = title else {
            batch.skipped += 1;
            continue;
        };

        let (company_slug, job_slug) = path_slugs(href);
        let company = lookup(&company_sel)
            .or_else(|| company_slug.map(title_case_slug))
            .unwrap_or_else(|| "YC Company".to_string());

        let (external_id, external_id_synthesized) = match job_slug.and_then(text_or_none) {
            Some(slug) => (slug, false),
            None => (synthesize_external_id(&title, &company, &job_url), true),
        };

        batch.postings.push(RawPosting {
            source: "ycombinator".to_string(),
            external_id,
            external_id_synthesized,
            title,
            company,
            location: lookup(&location_sel).as_deref().and_then(normalize_location),
            description: String::new(),
            apply_url: Some(job_url.clone()),
            job_url,
            date_posted: lookup(&posted_sel).and_then(|t| parse_relative_date(&t, now)),
            employment_type: None,
            remote_status: None,
            salary_range: None,
        });
    }

    Ok(batch)
}

/// Extracts the description body from a job detail page as line-oriented text.
pub fn parse_yc_detail(html: &str) -> Result<Option<String>, FetchError> {
    let document = Html::parse_document(html);
    for css in [r#"div[class*="description"]"#, r#"div[class*="prose"]"#, "article"] {
        let sel = selector(css)?;
        if let Some(el) = document.select(&sel).next() {
            if let Some(text) = text_or_none(html_to_text(&el.inner_html())) {
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}

#[async_trait]
impl SourceAdapter for YCombinatorAdapter {
    fn source_tag(&self) -> &'static str {
        "ycombinator"
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::PublicHtml
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<FetchOutcome, FetchError> {
        let listing_urls = if source.listing_urls.is_empty() {
            vec![DEFAULT_LISTING.to_string()]
        } else {
            source.listing_urls.clone()
        };

        let mut tally = TargetTally::default();
        for url in &listing_urls {
            let parsed = match http.get_text(ctx.run_id, self.source_tag(), url).await {
                Ok(html) => parse_yc_listing(&html, ctx.fetched_at),
                Err(err) => Err(err.into()),
            };
            match parsed {
                Ok(batch) => tally.succeeded(batch),
                Err(err) => tally.failed(self.source_tag(), url, err),
            }
        }
        let mut outcome = tally.finish(self.source_tag())?;
        outcome.truncate(source.max_results);

        for posting in &mut outcome.postings {
            if !ctx.wants_title(&posting.title) {
                debug!(title = %posting.title, "detail fetch skipped, title off target");
                continue;
            }
            match http.get_text(ctx.run_id, self.source_tag(), &posting.job_url).await {
                Ok(html) => {
                    if let Some(description) = parse_yc_detail(&html)? {
                        posting.description = description;
                    }
                }
                Err(err) => debug!(url = %posting.job_url, error = %err, "detail page unavailable"),
            }
        }

        Ok(outcome)
    }
}
