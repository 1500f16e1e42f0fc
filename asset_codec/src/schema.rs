use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::{ClientVersion, CodecError};

pub type Document = serde_json::Value;

pub const LEVEL_SCHEMA: &str = "prts___levels";
pub const MANIFEST_SCHEMA: &str = "resource_manifest";

/// Binary structured-schema codec selected by client version.
pub trait SchemaCodec {
    fn decode(
        &self,
        data: &[u8],
        version: &ClientVersion,
        schema: &str,
    ) -> Result<Document, CodecError>;

    fn encode(
        &self,
        document: &Document,
        version: &ClientVersion,
        schema: &str,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Runs the external `flatc` compiler against `{fbs_root}/{version}/{schema}.fbs`.
#[derive(Clone, Debug)]
pub struct FlatcCodec {
    program: PathBuf,
    fbs_root: PathBuf,
}

const PAYLOAD_STEM: &str = "payload";

impl FlatcCodec {
    pub fn new(fbs_root: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("flatc"),
            fbs_root: fbs_root.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn schema_path(&self, version: &ClientVersion, schema: &str) -> PathBuf {
        self.fbs_root
            .join(version.as_str())
            .join(format!("{}.fbs", schema))
    }

    fn run(&self, args: &[&OsStr], schema: &str) -> Result<(), CodecError> {
        let output = Command::new(&self.program)
            .args(["--strict-json", "--natural-utf8", "--no-warnings"])
            .args(args)
            .output()
            .map_err(|err| self.tool_error(format!("spawn failed: {}", err)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.tool_error(format!(
                "{} exited with {}: {}",
                schema,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn tool_error(&self, message: String) -> CodecError {
        CodecError::ExternalTool {
            tool: self.program.display().to_string(),
            message,
        }
    }
}

fn read_output(path: &Path, program: &Path) -> Result<Vec<u8>, CodecError> {
    fs::read(path).map_err(|err| CodecError::ExternalTool {
        tool: program.display().to_string(),
        message: format!("missing output {}: {}", path.display(), err),
    })
}

impl SchemaCodec for FlatcCodec {
    fn decode(
        &self,
        data: &[u8],
        version: &ClientVersion,
        schema: &str,
    ) -> Result<Document, CodecError> {
        let fbs_path = self.schema_path(version, schema);
        let dir = tempfile::tempdir()?;
        let bin_path = dir.path().join(format!("{}.bin", PAYLOAD_STEM));
        let json_path = dir.path().join(format!("{}.json", PAYLOAD_STEM));
        fs::write(&bin_path, data)?;
        debug!(schema, version = %version, bytes = data.len(), "flatc decode");
        self.run(
            &[
                OsStr::new("--json"),
                OsStr::new("--raw-binary"),
                OsStr::new("-o"),
                dir.path().as_os_str(),
                fbs_path.as_os_str(),
                OsStr::new("--"),
                bin_path.as_os_str(),
            ],
            schema,
        )?;
        let text = read_output(&json_path, &self.program)?;
        Ok(serde_json::from_slice(&text)?)
    }

    fn encode(
        &self,
        document: &Document,
        version: &ClientVersion,
        schema: &str,
    ) -> Result<Vec<u8>, CodecError> {
        let fbs_path = self.schema_path(version, schema);
        let dir = tempfile::tempdir()?;
        let bin_path = dir.path().join(format!("{}.bin", PAYLOAD_STEM));
        let json_path = dir.path().join(format!("{}.json", PAYLOAD_STEM));
        fs::write(&json_path, serde_json::to_vec(document)?)?;
        debug!(schema, version = %version, "flatc encode");
        self.run(
            &[
                OsStr::new("--binary"),
                OsStr::new("-o"),
                dir.path().as_os_str(),
                fbs_path.as_os_str(),
                json_path.as_os_str(),
            ],
            schema,
        )?;
        read_output(&bin_path, &self.program)
    }
}

/// Treats schema-encoded payloads as compact JSON text. Used for decoded
/// manifest dumps and pipelines that run without the schema compiler.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSchemaCodec;

impl SchemaCodec for JsonSchemaCodec {
    fn decode(
        &self,
        data: &[u8],
        _version: &ClientVersion,
        _schema: &str,
    ) -> Result<Document, CodecError> {
        Ok(serde_json::from_slice(data)?)
    }

    fn encode(
        &self,
        document: &Document,
        _version: &ClientVersion,
        _schema: &str,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_path_layout() {
        let codec = FlatcCodec::new("fbs");
        let version = ClientVersion::parse("2.6.91").expect("version ok");
        assert_eq!(
            codec.schema_path(&version, LEVEL_SCHEMA),
            Path::new("fbs").join("2.6.91").join("prts___levels.fbs")
        );
    }

    #[test]
    fn missing_program_is_external_tool_error() {
        let codec = FlatcCodec::new("fbs").with_program("definitely-not-flatc-binary");
        let version = ClientVersion::parse("2.6.91").expect("version ok");
        let err = codec
            .decode(b"\x00\x01", &version, LEVEL_SCHEMA)
            .expect_err("spawn must fail");
        assert!(matches!(err, CodecError::ExternalTool { .. }));
    }

    #[test]
    fn json_codec_round_trips_documents() {
        let version = ClientVersion::parse("2.6.91").expect("version ok");
        let doc = json!({"b": 1, "a": [1, 2, {"z": null}]});
        let bytes = JsonSchemaCodec
            .encode(&doc, &version, MANIFEST_SCHEMA)
            .expect("encode ok");
        assert_eq!(bytes, br#"{"b":1,"a":[1,2,{"z":null}]}"#);
        let back = JsonSchemaCodec
            .decode(&bytes, &version, MANIFEST_SCHEMA)
            .expect("decode ok");
        assert_eq!(back, doc);
    }
}
