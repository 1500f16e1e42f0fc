use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bson::{Bson, Document as BsonDocument};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::crypt::{decrypt_data, encrypt_data};
use crate::header::{add_header, remove_header};
use crate::schema::{Document, SchemaCodec};
use crate::{ClientVersion, CodecError};

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    Document(Document),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Bytes,
    Text,
    Document,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PayloadKind::Bytes => "bytes",
            PayloadKind::Text => "text",
            PayloadKind::Document => "document",
        };
        write!(f, "{}", label)
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bytes(_) => PayloadKind::Bytes,
            Payload::Text(_) => PayloadKind::Text,
            Payload::Document(_) => PayloadKind::Document,
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, CodecError> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(kind_error("output", PayloadKind::Bytes, &other)),
        }
    }

    pub fn into_document(self) -> Result<Document, CodecError> {
        match self {
            Payload::Document(document) => Ok(document),
            other => Err(kind_error("output", PayloadKind::Document, &other)),
        }
    }

    pub fn into_text(self) -> Result<String, CodecError> {
        match self {
            Payload::Text(text) => Ok(text),
            other => Err(kind_error("output", PayloadKind::Text, &other)),
        }
    }
}

fn kind_error(transform: &'static str, expected: PayloadKind, found: &Payload) -> CodecError {
    CodecError::PayloadKind {
        transform,
        expected,
        found: found.kind(),
    }
}

/// Collaborators a chain needs while running: the schema codec and, when
/// set, the directory that `Dump` steps write into.
#[derive(Clone, Copy)]
pub struct CodecContext<'a> {
    pub schema: &'a dyn SchemaCodec,
    pub dump_dir: Option<&'a Path>,
}

impl<'a> CodecContext<'a> {
    pub fn new(schema: &'a dyn SchemaCodec) -> Self {
        Self {
            schema,
            dump_dir: None,
        }
    }

    pub fn with_dump_dir(mut self, dump_dir: Option<&'a Path>) -> Self {
        self.dump_dir = dump_dir;
        self
    }
}

/// One reversible step. `decode` runs forward, `encode` is its inverse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    Header,
    Crypt,
    Utf8,
    Json,
    /// Documents map onto plain JSON: doubles, 32/64-bit integers, strings,
    /// booleans, null, arrays and sub-documents. Integers re-encode as
    /// int32 when they fit and int64 otherwise, so an int64 holding a small
    /// value does not round-trip byte for byte. Non-finite doubles and
    /// other element types are rejected on decode.
    Bson,
    Schema {
        version: ClientVersion,
        name: String,
    },
    Dump {
        label: String,
    },
}

impl Transform {
    pub fn schema(version: &ClientVersion, name: &str) -> Self {
        Transform::Schema {
            version: version.clone(),
            name: name.to_string(),
        }
    }

    pub fn dump(label: impl Into<String>) -> Self {
        Transform::Dump {
            label: label.into(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Transform::Header => "header",
            Transform::Crypt => "crypt",
            Transform::Utf8 => "utf8",
            Transform::Json => "json",
            Transform::Bson => "bson",
            Transform::Schema { .. } => "schema",
            Transform::Dump { .. } => "dump",
        }
    }

    pub fn decode(&self, payload: Payload, ctx: &CodecContext<'_>) -> Result<Payload, CodecError> {
        match (self, payload) {
            (Transform::Header, Payload::Bytes(bytes)) => {
                Ok(Payload::Bytes(remove_header(&bytes)?))
            }
            (Transform::Crypt, Payload::Bytes(bytes)) => Ok(Payload::Bytes(decrypt_data(&bytes)?)),
            (Transform::Utf8, Payload::Bytes(bytes)) => {
                Ok(Payload::Text(String::from_utf8(bytes)?))
            }
            (Transform::Json, Payload::Text(text)) => {
                Ok(Payload::Document(serde_json::from_str(&text)?))
            }
            (Transform::Bson, Payload::Bytes(bytes)) => Ok(Payload::Document(bson_decode(&bytes)?)),
            (Transform::Schema { version, name }, Payload::Bytes(bytes)) => Ok(Payload::Document(
                ctx.schema.decode(&bytes, version, name)?,
            )),
            (Transform::Dump { label }, payload) => {
                dump_payload(ctx, &format!("{}_pre", label), &payload);
                Ok(payload)
            }
            (transform, payload) => Err(kind_error(
                transform.name(),
                transform.decoded_from(),
                &payload,
            )),
        }
    }

    pub fn encode(&self, payload: Payload, ctx: &CodecContext<'_>) -> Result<Payload, CodecError> {
        match (self, payload) {
            (Transform::Header, Payload::Bytes(bytes)) => Ok(Payload::Bytes(add_header(&bytes))),
            (Transform::Crypt, Payload::Bytes(bytes)) => Ok(Payload::Bytes(encrypt_data(&bytes))),
            (Transform::Utf8, Payload::Text(text)) => Ok(Payload::Bytes(text.into_bytes())),
            (Transform::Json, Payload::Document(document)) => {
                Ok(Payload::Text(serde_json::to_string(&document)?))
            }
            (Transform::Bson, Payload::Document(document)) => {
                Ok(Payload::Bytes(bson_encode(document)?))
            }
            (Transform::Schema { version, name }, Payload::Document(document)) => Ok(
                Payload::Bytes(ctx.schema.encode(&document, version, name)?),
            ),
            (Transform::Dump { label }, payload) => {
                dump_payload(ctx, &format!("{}_post", label), &payload);
                Ok(payload)
            }
            (transform, payload) => Err(kind_error(
                transform.name(),
                transform.encoded_from(),
                &payload,
            )),
        }
    }

    fn decoded_from(&self) -> PayloadKind {
        match self {
            Transform::Json => PayloadKind::Text,
            _ => PayloadKind::Bytes,
        }
    }

    fn encoded_from(&self) -> PayloadKind {
        match self {
            Transform::Header | Transform::Crypt => PayloadKind::Bytes,
            Transform::Utf8 => PayloadKind::Text,
            _ => PayloadKind::Document,
        }
    }
}

fn bson_decode(bytes: &[u8]) -> Result<Document, CodecError> {
    let mut reader = bytes;
    let document =
        BsonDocument::from_reader(&mut reader).map_err(|err| CodecError::Bson(err.to_string()))?;
    bson_document_to_json(document)
}

fn bson_document_to_json(document: BsonDocument) -> Result<Document, CodecError> {
    let mut object = Map::with_capacity(document.len());
    for (key, value) in document {
        object.insert(key, bson_to_json(value)?);
    }
    Ok(Value::Object(object))
}

fn bson_to_json(value: Bson) -> Result<Value, CodecError> {
    Ok(match value {
        Bson::Null => Value::Null,
        Bson::Boolean(flag) => Value::Bool(flag),
        Bson::Int32(number) => Value::from(number),
        Bson::Int64(number) => Value::from(number),
        Bson::Double(number) => Number::from_f64(number)
            .map(Value::Number)
            .ok_or_else(|| CodecError::Bson(format!("non-finite double {}", number)))?,
        Bson::String(text) => Value::String(text),
        Bson::Array(items) => Value::Array(
            items
                .into_iter()
                .map(bson_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Bson::Document(document) => bson_document_to_json(document)?,
        other => {
            return Err(CodecError::Bson(format!(
                "unsupported element type {:?}",
                other.element_type()
            )))
        }
    })
}

fn json_to_bson(value: Value) -> Result<Bson, CodecError> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                i32::try_from(int).map_or(Bson::Int64(int), Bson::Int32)
            } else if let Some(float) = number.as_f64().filter(|_| number.is_f64()) {
                Bson::Double(float)
            } else {
                return Err(CodecError::Bson(format!("integer {} exceeds int64", number)));
            }
        }
        Value::String(text) => Bson::String(text),
        Value::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(json_to_bson)
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(object) => Bson::Document(json_object_to_bson(object)?),
    })
}

fn json_object_to_bson(object: Map<String, Value>) -> Result<BsonDocument, CodecError> {
    let mut document = BsonDocument::new();
    for (key, value) in object {
        document.insert(key, json_to_bson(value)?);
    }
    Ok(document)
}

fn bson_encode(document: Document) -> Result<Vec<u8>, CodecError> {
    let Value::Object(object) = document else {
        return Err(CodecError::Bson("top-level value is not a document".to_string()));
    };
    let mut out = Vec::new();
    json_object_to_bson(object)?
        .to_writer(&mut out)
        .map_err(|err| CodecError::Bson(err.to_string()))?;
    Ok(out)
}

fn dump_payload(ctx: &CodecContext<'_>, name: &str, payload: &Payload) {
    let Some(dir) = ctx.dump_dir else {
        return;
    };
    let (path, result) = match payload {
        Payload::Bytes(bytes) => {
            let path = dump_path(dir, name, "bin");
            let result = fs::write(&path, bytes);
            (path, result)
        }
        Payload::Text(text) => {
            let path = dump_path(dir, name, "txt");
            let result = fs::write(&path, text);
            (path, result)
        }
        Payload::Document(document) => {
            let path = dump_path(dir, name, "json");
            let result = serde_json::to_string_pretty(document)
                .map_err(std::io::Error::from)
                .and_then(|text| fs::write(&path, text));
            (path, result)
        }
    };
    match result {
        Ok(()) => debug!(path = %path.display(), "dumped payload"),
        Err(err) => warn!(path = %path.display(), error = %err, "payload dump failed"),
    }
}

fn dump_path(dir: &Path, name: &str, extension: &str) -> PathBuf {
    let _ = fs::create_dir_all(dir);
    dir.join(format!("{}.{}", name, extension))
}

/// Ordered list of transforms. Decoding folds front to back, encoding folds
/// back to front through the inverses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodecChain {
    transforms: Vec<Transform>,
}

impl CodecChain {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn then(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn decode(&self, data: Vec<u8>, ctx: &CodecContext<'_>) -> Result<Payload, CodecError> {
        self.transforms
            .iter()
            .try_fold(Payload::Bytes(data), |payload, transform| {
                transform.decode(payload, ctx)
            })
    }

    pub fn encode(&self, payload: Payload, ctx: &CodecContext<'_>) -> Result<Vec<u8>, CodecError> {
        self.transforms
            .iter()
            .rev()
            .try_fold(payload, |payload, transform| transform.encode(payload, ctx))?
            .into_bytes()
    }

    pub fn apply<F>(
        &self,
        data: Vec<u8>,
        ctx: &CodecContext<'_>,
        modify: F,
    ) -> Result<Vec<u8>, CodecError>
    where
        F: FnOnce(Payload) -> Result<Payload, CodecError>,
    {
        let decoded = self.decode(data, ctx)?;
        let modified = modify(decoded)?;
        self.encode(modified, ctx)
    }
}
