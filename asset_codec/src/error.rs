use thiserror::Error;

use crate::chain::PayloadKind;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload too short for header: {len} < {expected}")]
    ShortHeader { len: usize, expected: usize },
    #[error("cipher error: {0}")]
    Crypt(String),
    #[error("bson error: {0}")]
    Bson(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("transform {transform} expects {expected} payload, got {found}")]
    PayloadKind {
        transform: &'static str,
        expected: PayloadKind,
        found: PayloadKind,
    },
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },
    #[error("invalid client version: {0}")]
    InvalidVersion(String),
    #[error("unsupported table: {0}")]
    UnknownTable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
