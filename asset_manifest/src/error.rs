use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("path conflict: {0}")]
    Conflict(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("manifest json error: {0}")]
    Json(#[from] serde_json::Error),
}
