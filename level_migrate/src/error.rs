use asset_codec::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("level schema: {0}")]
    Schema(String),
    #[error("legacy level {level_id}: not bson ({bson}) and not encrypted json ({json})")]
    LegacyDecode {
        level_id: String,
        bson: CodecError,
        json: CodecError,
    },
}
