use std::fmt;

use asset_codec::version::is_before;
use asset_codec::ClientVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ManifestError;

/// Manifests up to this client version carry `isCacheable` and
/// `directDependencies` instead of `props`.
pub const LAST_OLDER_GENERATION: &str = "2.4.61";
/// Releases before this client version ship no decodable manifest.
pub const FIRST_NATIVE_MANIFEST: &str = "2.4.01";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    pub client_version: ClientVersion,
    pub res_version: String,
}

impl Release {
    pub fn new(client_version: ClientVersion, res_version: impl Into<String>) -> Self {
        Self {
            client_version,
            res_version: res_version.into(),
        }
    }

    pub fn parse(client_version: &str, res_version: &str) -> Result<Self, ManifestError> {
        let client_version = ClientVersion::parse(client_version)
            .map_err(|err| ManifestError::Schema(err.to_string()))?;
        Ok(Self::new(client_version, res_version))
    }

    pub fn is_older_generation(&self) -> bool {
        !self.newer_than(LAST_OLDER_GENERATION)
    }

    pub fn needs_legacy_manifest(&self) -> bool {
        is_before(&self.client_version, FIRST_NATIVE_MANIFEST)
    }

    fn newer_than(&self, threshold: &str) -> bool {
        match ClientVersion::parse(threshold) {
            Ok(threshold) => self.client_version > threshold,
            Err(_) => true,
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_version, self.res_version)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManifest {
    #[serde(default)]
    pub bundles: Vec<BundleRecord>,
    #[serde(default)]
    pub asset_to_bundle_list: Vec<AssetRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cacheable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scc_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_dependencies: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_dependencies: Option<Vec<usize>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub bundle_index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceManifest {
    pub fn from_document(document: Value) -> Result<Self, ManifestError> {
        Ok(serde_json::from_value(document)?)
    }

    pub fn to_document(&self) -> Result<Value, ManifestError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn bundle_position(&self, name: &str) -> Option<usize> {
        self.bundles.iter().position(|bundle| bundle.name == name)
    }

    /// Bundle holding the first asset named exactly `asset_name`.
    pub fn bundle_for_asset(&self, asset_name: &str) -> Result<&BundleRecord, ManifestError> {
        self.find_bundle(|asset| asset.asset_name == asset_name)
            .ok_or_else(|| ManifestError::NotFound(asset_name.to_string()))
    }

    /// Bundle holding the first asset whose name starts with `prefix`.
    pub fn bundle_for_prefix(&self, prefix: &str) -> Result<&BundleRecord, ManifestError> {
        self.find_bundle(|asset| asset.asset_name.starts_with(prefix))
            .ok_or_else(|| ManifestError::NotFound(prefix.to_string()))
    }

    fn find_bundle(&self, matches: impl Fn(&AssetRecord) -> bool) -> Option<&BundleRecord> {
        self.asset_to_bundle_list
            .iter()
            .find(|asset| matches(asset))
            .and_then(|asset| self.bundles.get(asset.bundle_index))
    }
}
