//! Job control and polling endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Form, Json,
};
use haikyo_core::Location;
use haikyo_scraper::{DiscoveredTarget, JobAbortError, JobRequest, JobStatus, ScrapeTarget};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiError, AppState};

/// Form fields accepted by `/discover`, `/search` and `/scrape`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartForm {
    pub term: Option<String>,
    pub url: Option<String>,
    /// Kept as text so an empty field means "use the default".
    pub max_locations: Option<String>,
    /// Comma-separated zero-based indices.
    pub selected_ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct JobQuery {
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartResponse {
    pub status: &'static str,
    pub job_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DiscoverResponse {
    pub status: &'static str,
    pub target: String,
    pub targets: Vec<DiscoveredTarget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProgressResponse {
    pub percent: f64,
    pub message: String,
    pub status: JobStatus,
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ResultsResponse {
    pub job_id: String,
    pub locations: Option<Vec<Location>>,
    pub kml_file: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CancelResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub cancel_requested: bool,
}

/// Discovery only: lists the numbered targets a `/search` or `/scrape` with
/// the same fields would choose `selectedIds` from.
pub(super) async fn discover(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Form(form): Form<StartForm>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let target = match form.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(term) => ScrapeTarget::Search {
            term: term.to_owned(),
        },
        None => url_target(&required(&req_id, form.url.as_deref(), "term or url")?),
    };
    let request = build_request(&req_id, target, &form)?;

    let targets = state
        .registry
        .context()
        .discover(&request.target, request.max_locations)
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "discovery request failed");
            let code = match err {
                JobAbortError::NoTargets { .. } => "not_found",
                JobAbortError::Discovery { .. } => "upstream_error",
            };
            ApiError::new(req_id.0.clone(), code, err.to_string())
        })?;

    Ok(Json(DiscoverResponse {
        status: "ok",
        target: request.target.describe(),
        targets,
    }))
}

pub(super) async fn start_search(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Form(form): Form<StartForm>,
) -> Result<Json<StartResponse>, ApiError> {
    let term = required(&req_id, form.term.as_deref(), "term")?;
    let request = build_request(&req_id, ScrapeTarget::Search { term }, &form)?;
    start(&state, &req_id, request)
}

pub(super) async fn start_scrape(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Form(form): Form<StartForm>,
) -> Result<Json<StartResponse>, ApiError> {
    let raw = required(&req_id, form.url.as_deref(), "url")?;
    let request = build_request(&req_id, url_target(&raw), &form)?;
    start(&state, &req_id, request)
}

/// One URL is a listing (or a single detail page); several are explicit
/// detail pages.
fn url_target(raw: &str) -> ScrapeTarget {
    let urls: Vec<String> = raw.split_whitespace().map(str::to_owned).collect();
    match urls.as_slice() {
        [single] => ScrapeTarget::Listing {
            url: single.clone(),
        },
        _ => ScrapeTarget::Urls(urls),
    }
}

fn start(
    state: &AppState,
    req_id: &RequestId,
    request: JobRequest,
) -> Result<Json<StartResponse>, ApiError> {
    let label = request.target.describe();
    let monitor = state.registry.start(request).map_err(|conflict| {
        tracing::warn!(running = %conflict.running_job_id, "start rejected; job already running");
        ApiError::new(req_id.0.clone(), "conflict", conflict.to_string())
    })?;

    Ok(Json(StartResponse {
        status: "started",
        job_id: monitor.id().to_owned(),
        message: format!("Scraping started for {label}"),
    }))
}

fn required(req_id: &RequestId, value: Option<&str>, field: &str) -> Result<String, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                format!("{field} is required"),
            )
        })
}

fn build_request(
    req_id: &RequestId,
    target: ScrapeTarget,
    form: &StartForm,
) -> Result<JobRequest, ApiError> {
    let invalid = |message: String| ApiError::new(req_id.0.clone(), "validation_error", message);

    let max_locations = match form.max_locations.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => Some(n),
            _ => return Err(invalid(format!("maxLocations must be a positive integer, got {raw:?}"))),
        },
    };

    let selected_ids = parse_selected_ids(form.selected_ids.as_deref().unwrap_or_default())
        .map_err(|bad| invalid(format!("selectedIds contains a non-index value {bad:?}")))?;

    Ok(JobRequest {
        target,
        max_locations,
        selected_ids,
    })
}

/// Parses `"0, 2,5"` into indices; the error carries the offending item.
pub(super) fn parse_selected_ids(raw: &str) -> Result<Vec<usize>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| s.to_owned()))
        .collect()
}

pub(super) async fn progress(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ProgressResponse>, ApiError> {
    if query.job_id.is_none() && state.registry.is_empty() {
        return Ok(Json(ProgressResponse {
            percent: 0.0,
            message: "No job started".to_owned(),
            status: JobStatus::Idle,
            job_id: None,
        }));
    }

    let job = state.job(&req_id.0, query.job_id.as_deref())?;
    let snapshot = job.snapshot();
    Ok(Json(ProgressResponse {
        percent: snapshot.percent,
        message: snapshot.message,
        status: snapshot.status,
        job_id: Some(job.id().to_owned()),
    }))
}

pub(super) async fn results(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let job = state.job(&req_id.0, query.job_id.as_deref())?;
    let locations = job.board().take_results();
    let kml_file = job
        .board()
        .export_file()
        .map(|name| format!("/download/{name}"));

    Ok(Json(ResultsResponse {
        job_id: job.id().to_owned(),
        locations,
        kml_file,
    }))
}

pub(super) async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<CancelResponse>, ApiError> {
    let job = state.job(&req_id.0, Some(&job_id))?;
    let running = job.is_running();
    if running {
        job.cancel();
        tracing::info!(job_id = %job_id, "cancellation requested");
    }
    Ok(Json(CancelResponse {
        job_id,
        status: job.snapshot().status,
        cancel_requested: running,
    }))
}
