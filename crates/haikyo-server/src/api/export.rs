//! Export rendering and download of job export files.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use haikyo_export::{render, ExportFormat};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{ApiError, AppState};

/// Prefix of every file a job writes into the export directory.
const EXPORT_FILE_PREFIX: &str = "haikyo_locations_";

#[derive(Debug, Deserialize)]
pub(super) struct ExportQuery {
    pub format: Option<String>,
    pub job_id: Option<String>,
}

pub(super) async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = query
        .format
        .as_deref()
        .unwrap_or("kml")
        .parse()
        .map_err(|e: haikyo_export::ExportError| {
            ApiError::new(req_id.0.clone(), "bad_request", e.to_string())
        })?;
    let job = state.job(&req_id.0, query.job_id.as_deref())?;
    if !job.snapshot().status.is_terminal() {
        return Err(ApiError::new(
            req_id.0.clone(),
            "conflict",
            format!("job {} is still running", job.id()),
        ));
    }

    let locations = job.board().partial_results();
    let body = render(format, &locations, &state.export_options).map_err(|e| {
        tracing::error!(job_id = %job.id(), error = %e, "export rendering failed");
        ApiError::new(req_id.0.clone(), "internal_error", "export rendering failed")
    })?;

    let file_name = format!("{EXPORT_FILE_PREFIX}{}.{}", job.id(), format.extension());
    Ok(attachment(format.content_type(), &file_name, body.into_bytes()))
}

pub(super) async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::new(req_id.0.clone(), "not_found", format!("{filename} not found"));

    if !is_export_file_name(&filename) {
        return Err(not_found());
    }
    let Some(dir) = state.export_dir.as_deref() else {
        return Err(not_found());
    };

    let bytes = tokio::fs::read(dir.join(&filename)).await.map_err(|e| {
        tracing::debug!(file = %filename, error = %e, "export file unavailable");
        not_found()
    })?;

    let content_type = match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("json") => ExportFormat::Json.content_type(),
        _ => ExportFormat::Kml.content_type(),
    };
    Ok(attachment(content_type, &filename, bytes))
}

/// Only plain file names this server produced; never a path.
pub(super) fn is_export_file_name(name: &str) -> bool {
    name.starts_with(EXPORT_FILE_PREFIX)
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
