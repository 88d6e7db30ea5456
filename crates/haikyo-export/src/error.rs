use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("XML write error: {0}")]
    Xml(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
}
