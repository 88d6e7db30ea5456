mod export;
mod jobs;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use haikyo_export::ExportOptions;
use haikyo_scraper::{JobMonitor, JobRegistry};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub export_dir: Option<PathBuf>,
    pub export_options: ExportOptions,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        let settings = registry.context().settings();
        Self {
            export_dir: settings.export_dir.clone(),
            export_options: settings.export_options.clone(),
            registry,
        }
    }

    /// The requested job, or the latest one when `job_id` is absent.
    pub(super) fn job(&self, request_id: &str, job_id: Option<&str>) -> Result<JobMonitor, ApiError> {
        self.registry.get(job_id).ok_or_else(|| {
            let message = match job_id {
                Some(id) => format!("job {id} not found"),
                None => "no job has been started".to_owned(),
            };
            ApiError::new(request_id, "not_found", message)
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/discover", post(jobs::discover))
        .route("/search", post(jobs::start_search))
        .route("/scrape", post(jobs::start_scrape))
        .route("/progress", get(jobs::progress))
        .route("/results", get(jobs::results))
        .route("/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .route("/export", get(export::export))
        .route("/download/{filename}", get(export::download))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthData { status: "ok" })
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
