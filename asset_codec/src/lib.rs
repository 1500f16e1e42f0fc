//! Reversible payload codecs for table, level and manifest assets.
#![forbid(unsafe_code)]

pub mod chain;
pub mod crypt;
mod error;
pub mod header;
pub mod known_table;
pub mod schema;
pub mod version;

pub use chain::{CodecChain, CodecContext, Payload, PayloadKind, Transform};
pub use error::CodecError;
pub use known_table::{level_chain, manifest_chain, ChainKind, KnownTable, TableSpec};
pub use schema::{
    Document, FlatcCodec, JsonSchemaCodec, SchemaCodec, LEVEL_SCHEMA, MANIFEST_SCHEMA,
};
pub use version::ClientVersion;
