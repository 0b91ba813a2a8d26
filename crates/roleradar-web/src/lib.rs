//! Axum JSON API for RoleRadar: run trigger and progress, stored job reads, skill frequencies.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use roleradar_extract::skill_frequencies;
use roleradar_storage::{JobFilter, JobStore, PgJobStore};
use roleradar_sync::{
    lookback_cutoff, maybe_build_scheduler, Orchestrator, RadarConfig, RunRequest, TriggerRejected,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "roleradar-web";

const DEFAULT_JOB_LIMIT: usize = 100;
const MAX_JOB_LIMIT: usize = 500;
const DEFAULT_FREQUENCY_LIMIT: usize = 50;
const MAX_FREQUENCY_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { store, orchestrator }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScrapeQuery {
    days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct JobsQuery {
    source: Option<String>,
    company: Option<String>,
    min_score: Option<f64>,
    /// Jobs scraped within the last N days.
    days: Option<i64>,
    limit: Option<usize>,
}

impl JobsQuery {
    fn into_filter(self) -> JobFilter {
        JobFilter {
            source: self.source.filter(|s| !s.trim().is_empty()),
            company: self.company.filter(|c| !c.trim().is_empty()),
            min_score: self.min_score,
            posted_since: None,
            scraped_since: self.days.map(|d| lookback_cutoff(Utc::now(), d)),
            active_only: true,
            limit: Some(self.limit.unwrap_or(DEFAULT_JOB_LIMIT).min(MAX_JOB_LIMIT)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrequencyQuery {
    category: Option<String>,
    limit: Option<usize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/scrape", post(trigger_scrape_handler))
        .route("/api/scrape/progress", get(scrape_progress_handler))
        .route("/api/jobs", get(jobs_handler))
        .route("/api/jobs/{id}", get(job_detail_handler))
        .route("/api/skills/frequencies", get(skill_frequencies_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "web api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Connects the store, wires the orchestrator and optional scheduler, then serves until the process exits.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = RadarConfig::from_env();
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::connect(&config.database_url, 5).await?);
    let orchestrator = Orchestrator::from_config(&config, Arc::clone(&store)).await?;

    let scheduler = maybe_build_scheduler(&config, Arc::clone(&orchestrator)).await?;
    if let Some(scheduler) = &scheduler {
        scheduler.start().await?;
        info!(cron = %config.sync_cron, "sync scheduler started");
    }

    serve(AppState::new(store, orchestrator), config.web_port).await
}

async fn health_handler() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn trigger_scrape_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScrapeQuery>,
) -> Response {
    let request = RunRequest {
        lookback_days: query.days,
    };
    match state.orchestrator.start_run(request) {
        Ok(handle) => {
            info!(run_id = %handle.run_id, origin = "api", "run triggered");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "accepted", "run_id": handle.run_id })),
            )
                .into_response()
        }
        Err(TriggerRejected::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "rejected", "reason": "already_running" })),
        )
            .into_response(),
    }
}

async fn scrape_progress_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.orchestrator.snapshot()).into_response()
}

async fn jobs_handler(State(state): State<Arc<AppState>>, Query(query): Query<JobsQuery>) -> Response {
    match state.store.list(&query.into_filter()).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn job_detail_handler(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<i64>) -> Response {
    match state.store.get(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "job not found" }))).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn skill_frequencies_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FrequencyQuery>,
) -> Response {
    let filter = JobFilter {
        active_only: true,
        ..JobFilter::default()
    };
    match state.store.list(&filter).await {
        Ok(jobs) => {
            let limit = query.limit.unwrap_or(DEFAULT_FREQUENCY_LIMIT).min(MAX_FREQUENCY_LIMIT);
            let table: Vec<_> = skill_frequencies(&jobs)
                .into_iter()
                .filter(|f| query.category.as_deref().map_or(true, |c| f.category == c))
                .take(limit)
                .collect();
            Json(table).into_response()
        }
        Err(err) => server_error(err.into()),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("Server error: {err}") })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use roleradar_adapters::{
        AdapterContext, AdapterRegistry, Crawlability, FetchError, FetchOutcome, SourceAdapter, SourceConfig,
    };
    use roleradar_core::{JobSections, NewJob, ProgressSnapshot, RunStatus, SkillSet};
    use roleradar_extract::{KeywordDictionary, SkillExtractor};
    use roleradar_storage::{HttpClientConfig, HttpFetcher, MemoryJobStore};
    use roleradar_sync::ExtractorSource;
    use serde_json::Value;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    struct GatedAdapter {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl SourceAdapter for GatedAdapter {
        fn source_tag(&self) -> &'static str {
            "greenhouse"
        }

        fn crawlability(&self) -> Crawlability {
            Crawlability::Api
        }

        async fn fetch(
            &self,
            _http: &HttpFetcher,
            _ctx: &AdapterContext,
            _source: &SourceConfig,
        ) -> Result<FetchOutcome, FetchError> {
            self.gate.notified().await;
            Ok(FetchOutcome::default())
        }
    }

    fn extractor() -> Arc<SkillExtractor> {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let dictionary = KeywordDictionary::from_workspace_root(&root).unwrap();
        Arc::new(SkillExtractor::new(&dictionary).unwrap())
    }

    fn job(external_id: &str, company: &str, score: f64, skills: &[&str]) -> NewJob {
        NewJob {
            source: "greenhouse".into(),
            external_id: external_id.into(),
            title: "Forward Deployed Engineer".into(),
            company: company.into(),
            location: Some("New York, NY".into()),
            job_url: format!("https://boards.greenhouse.io/acme/jobs/{external_id}"),
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
                required_skills: skills.iter().map(ToString::to_string).collect(),
                ..SkillSet::default()
            },
            relevance_score: score,
            is_active: true,
        }
    }

    async fn state_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> (Arc<MemoryJobStore>, AppState) {
        let store = Arc::new(MemoryJobStore::new());
        store.insert(job("1", "Acme AI", 42.0, &["Python", "SQL"])).await.unwrap();
        store.insert(job("2", "Parcel Robotics", 77.5, &["Python"])).await.unwrap();

        let sources = adapters
            .iter()
            .map(|a| SourceConfig {
                source_id: a.source_tag().to_string(),
                display_name: a.source_tag().to_string(),
                enabled: true,
                crawlability: Crawlability::Api,
                boards: Vec::new(),
                listing_urls: Vec::new(),
                max_results: None,
                notes: None,
            })
            .collect();
        let registry: AdapterRegistry = adapters
            .into_iter()
            .map(|a| (a.source_tag().to_string(), a))
            .collect();
        let store_dyn: Arc<dyn JobStore> = store.clone();
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let orchestrator = Orchestrator::new(
            Arc::clone(&store_dyn),
            Arc::new(http),
            registry,
            sources,
            ExtractorSource::Fixed(extractor()),
        );
        (store, AppState::new(store_dyn, Arc::new(orchestrator)))
    }

    async fn body_json(resp: Response) -> Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn handler_smoke_health() {
        let (_store, state) = state_with(Vec::new()).await;
        let resp = app(state).oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn handler_smoke_jobs_are_ranked_and_filtered() {
        let (_store, state) = state_with(Vec::new()).await;
        let app = app(state);

        let resp = app.clone().oneshot(get_req("/api/jobs")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let jobs = body_json(resp).await;
        assert_eq!(jobs.as_array().unwrap().len(), 2);
        assert_eq!(jobs[0]["record"]["company"], "Parcel Robotics");

        let resp = app
            .clone()
            .oneshot(get_req("/api/jobs?company=acme%20ai&days=7"))
            .await
            .unwrap();
        let jobs = body_json(resp).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["record"]["external_id"], "1");

        let resp = app.oneshot(get_req("/api/jobs?min_score=50&limit=10")).await.unwrap();
        let jobs = body_json(resp).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["record"]["external_id"], "2");
    }

    #[tokio::test]
    async fn handler_smoke_job_detail_and_missing() {
        let (store, state) = state_with(Vec::new()).await;
        let id = store.find_by_external_id("greenhouse", "2").await.unwrap().unwrap().id;
        let app = app(state);

        let resp = app.clone().oneshot(get_req(&format!("/api/jobs/{id}"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["id"], id);

        let resp = app.oneshot(get_req("/api/jobs/9999")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handler_smoke_skill_frequencies() {
        let (_store, state) = state_with(Vec::new()).await;
        let app = app(state);

        let resp = app.clone().oneshot(get_req("/api/skills/frequencies")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let table = body_json(resp).await;
        assert_eq!(table[0]["skill"], "Python");
        assert_eq!(table[0]["frequency"], 2);

        let resp = app
            .oneshot(get_req("/api/skills/frequencies?category=technologies"))
            .await
            .unwrap();
        assert!(body_json(resp).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_smoke_store_errors_are_500() {
        let (store, state) = state_with(Vec::new()).await;
        store.set_unavailable(true);
        let resp = app(state).oneshot(get_req("/api/jobs")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn handler_smoke_trigger_then_conflict() {
        let gate = Arc::new(Notify::new());
        let adapter = GatedAdapter {
            gate: Arc::clone(&gate),
        };
        let (_store, state) = state_with(vec![Arc::new(adapter)]).await;
        let orchestrator = Arc::clone(&state.orchestrator);
        let app = app(state);

        let resp = app.clone().oneshot(post_req("/api/scrape?days=3")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let accepted = body_json(resp).await;
        assert_eq!(accepted["status"], "accepted");
        let run_id = accepted["run_id"].as_str().unwrap().to_string();

        let resp = app.clone().oneshot(post_req("/api/scrape")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let rejected = body_json(resp).await;
        assert_eq!(rejected["status"], "rejected");
        assert_eq!(rejected["reason"], "already_running");

        let resp = app.oneshot(get_req("/api/scrape/progress")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let progress: ProgressSnapshot = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(progress.run_id.map(|id| id.to_string()), Some(run_id));
        assert!(orchestrator.is_running());

        gate.notify_one();
        while orchestrator.is_running() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn huge_days_are_clamped_on_listing_and_trigger() {
        let gate = Arc::new(Notify::new());
        let adapter = GatedAdapter {
            gate: Arc::clone(&gate),
        };
        let (_store, state) = state_with(vec![Arc::new(adapter)]).await;
        let orchestrator = Arc::clone(&state.orchestrator);
        let app = app(state);

        let resp = app
            .clone()
            .oneshot(get_req("/api/jobs?days=1000000000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);

        gate.notify_one();
        let resp = app
            .clone()
            .oneshot(post_req("/api/scrape?days=1000000000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        while orchestrator.is_running() {
            tokio::task::yield_now().await;
        }

        let resp = app.oneshot(get_req("/api/scrape/progress")).await.unwrap();
        let progress: ProgressSnapshot = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(progress.status, RunStatus::Completed);
    }

    #[test]
    fn jobs_query_caps_the_limit() {
        let filter = JobsQuery {
            limit: Some(10_000),
            ..JobsQuery::default()
        }
        .into_filter();
        assert_eq!(filter.limit, Some(MAX_JOB_LIMIT));
        assert!(filter.active_only);
        assert!(filter.scraped_since.is_none());
    }
}
