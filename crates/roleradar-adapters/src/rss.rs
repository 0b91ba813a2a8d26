use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use roleradar_core::RawPosting;
use roleradar_storage::HttpFetcher;

use crate::text::{html_to_text, normalize_location, parse_iso_datetime, synthesize_external_id, text_or_none};
use crate::{
    AdapterContext, Crawlability, FetchError, FetchOutcome, ParsedBatch, SourceAdapter, SourceConfig, TargetTally,
};

static TITLE_AT_COMPANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+(?:at|@)\s+(.+)$").expect("title at company pattern"));

static LOCATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*location\s*:\s*(.+)$").expect("location line pattern"));

/// Job feeds in RSS 2.0, RSS 1.0 or Atom form: aggregator exports and board feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RssAdapter;

#[derive(Debug, Default)]
struct FeedEntry {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    published: Option<String>,
    author: Option<String>,
    /// Element names below the entry element, outermost first.
    path: Vec<String>,
    text: String,
}

impl FeedEntry {
    fn open(&mut self, name: String, element: &BytesStart<'_>) {
        if self.path.is_empty() && name == "link" {
            self.take_href(element);
        }
        self.path.push(name);
        self.text.clear();
    }

    fn close(&mut self) {
        let value = text_or_none(std::mem::take(&mut self.text));
        let field = match self.path.as_slice() {
            [name] => name.clone(),
            [outer, inner] if outer == "author" && inner == "name" => "author".to_string(),
            _ => String::new(),
        };
        self.path.pop();
        let Some(value) = value else {
            return;
        };
        let slot = match field.as_str() {
            "title" => &mut self.title,
            "link" => &mut self.link,
            "guid" | "id" => &mut self.guid,
            "description" | "summary" => &mut self.summary,
            "encoded" | "content" => &mut self.content,
            "pubdate" | "published" | "updated" | "date" => &mut self.published,
            "author" | "creator" => &mut self.author,
            _ => return,
        };
        slot.get_or_insert(value);
    }

    /// Atom links carry the target in `href`; only `alternate` links point at the posting.
    fn take_href(&mut self, element: &BytesStart<'_>) {
        let attr = |key: &str| {
            element
                .try_get_attribute(key)
                .ok()
                .flatten()
                .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
        };
        let alternate = matches!(attr("rel").as_deref(), None | Some("alternate"));
        if alternate && self.link.is_none() {
            self.link = attr("href").and_then(text_or_none);
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).to_ascii_lowercase()
}

fn is_entry(name: &str) -> bool {
    name == "item" || name == "entry"
}

/// Parses an RSS or Atom document into postings.
pub fn parse_feed(xml: &str) -> Result<ParsedBatch, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut batch = ParsedBatch::default();
    let mut entry: Option<FeedEntry> = None;
    let mut saw_feed = false;

    loop {
        let event = reader.read_event().map_err(|err| {
            FetchError::Message(format!("feed xml error at byte {}: {err}", reader.error_position()))
        })?;
        match event {
            Event::Start(element) => {
                let name = local_name(&element);
                saw_feed |= matches!(name.as_str(), "rss" | "feed" | "rdf");
                match entry.as_mut() {
                    Some(current) => current.open(name, &element),
                    None if is_entry(&name) => entry = Some(FeedEntry::default()),
                    None => {}
                }
            }
            Event::Empty(element) => {
                if let Some(current) = entry.as_mut() {
                    if current.path.is_empty() && local_name(&element) == "link" {
                        current.take_href(&element);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(current) = entry.as_mut() {
                    let decoded = text
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    current.text.push_str(&decoded);
                }
            }
            Event::CData(data) => {
                if let Some(current) = entry.as_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                if entry.as_ref().is_some_and(|e| e.path.is_empty()) {
                    batch.push(entry.take().and_then(entry_to_posting));
                } else if let Some(current) = entry.as_mut() {
                    current.close();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_feed {
        return Err(FetchError::Message("document is not an rss or atom feed".to_string()));
    }
    Ok(batch)
}

/// Splits aggregator titles: "Title - Company - Location" or "Title at Company".
fn split_title(raw: &str) -> (String, Option<String>, Option<String>) {
    let parts: Vec<&str> = raw.split(" - ").map(str::trim).collect();
    if let [title, company, rest @ ..] = parts.as_slice() {
        return (
            title.to_string(),
            text_or_none(company),
            rest.first().and_then(|l| text_or_none(l)),
        );
    }
    if let Some(caps) = TITLE_AT_COMPANY.captures(raw) {
        return (caps[1].trim().to_string(), text_or_none(&caps[2]), None);
    }
    (raw.trim().to_string(), None, None)
}

fn parse_feed_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text.trim())
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_iso_datetime(text))
}

fn entry_to_posting(entry: FeedEntry) -> Option<RawPosting> {
    let (title, title_company, title_location) = split_title(&entry.title?);
    let title = text_or_none(title)?;
    let permalink = entry.guid.clone().filter(|g| g.starts_with("http"));
    let job_url = entry.link.or(permalink)?;
    let company = title_company
        .or(entry.author)
        .unwrap_or_else(|| "Unknown".to_string());

    let description = entry
        .content
        .or(entry.summary)
        .map(|body| html_to_text(&body))
        .unwrap_or_default();
    let location = title_location
        .or_else(|| LOCATION_LINE.captures(&description).map(|c| c[1].to_string()))
        .and_then(|l| normalize_location(&l));

    let (external_id, external_id_synthesized) = match entry.guid {
        Some(guid) => (guid, false),
        None => {
            // Aggregator links carry per-request tracking parameters.
            let stable_url = job_url.split(['?', '#']).next().unwrap_or(&job_url);
            (synthesize_external_id(&title, &company, stable_url), true)
        }
    };

    Some(RawPosting {
        source: "rss".to_string(),
        external_id,
        external_id_synthesized,
        title,
        company,
        location,
        description,
        job_url,
        apply_url: None,
        date_posted: entry.published.as_deref().and_then(parse_feed_date),
        employment_type: None,
        remote_status: None,
        salary_range: None,
    })
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn source_tag(&self) -> &'static str {
        "rss"
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
        for url in &source.listing_urls {
            let parsed = match http.get_text(ctx.run_id, self.source_tag(), url).await {
                Ok(xml) => parse_feed(&xml),
                Err(err) => Err(err.into()),
            };
            match parsed {
                Ok(batch) => tally.succeeded(batch),
                Err(err) => tally.failed(self.source_tag(), url, err),
            }
        }
        let mut outcome = tally.finish(self.source_tag())?;
        outcome.truncate(source.max_results);
        Ok(outcome)
    }
}
