use std::fmt;
use std::path::PathBuf;

use asset_codec::CodecError;
use asset_manifest::ManifestError;
use level_migrate::MigrateError;
use thiserror::Error;

use crate::store::StoreError;

/// Coarse failure classes a caller can branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Schema,
    ExternalTool,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Schema => "schema",
            ErrorKind::ExternalTool => "external tool",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("schema: {0}")]
    Schema(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("plan: {0}")]
    Plan(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("package: {0}")]
    Package(#[from] zip::result::ZipError),
}

fn codec_kind(err: &CodecError) -> ErrorKind {
    match err {
        CodecError::ExternalTool { .. } | CodecError::Io(_) => ErrorKind::ExternalTool,
        _ => ErrorKind::Schema,
    }
}

impl MergeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::NotFound(_) => ErrorKind::NotFound,
            MergeError::Conflict(_) => ErrorKind::Conflict,
            MergeError::Schema(_) | MergeError::Plan(_) => ErrorKind::Schema,
            MergeError::Manifest(err) => match err {
                ManifestError::NotFound(_) => ErrorKind::NotFound,
                ManifestError::Conflict(_) => ErrorKind::Conflict,
                ManifestError::Schema(_) | ManifestError::Json(_) => ErrorKind::Schema,
            },
            MergeError::Codec(err) => codec_kind(err),
            MergeError::Migrate(err) => match err {
                MigrateError::Codec(err) => codec_kind(err),
                MigrateError::Schema(_) | MigrateError::LegacyDecode { .. } => ErrorKind::Schema,
            },
            MergeError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            MergeError::Store(_) | MergeError::Io { .. } | MergeError::Package(_) => {
                ErrorKind::ExternalTool
            }
        }
    }
}
