use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{AssetRecord, BundleRecord, ManifestError, ResourceManifest};

/// Bundle and asset listing stored in the index container of releases that
/// predate the native manifest.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    #[serde(default)]
    pub bundles: Vec<IndexBundle>,
    #[serde(default)]
    pub asset_to_bundle_list: Vec<IndexAsset>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexBundle {
    pub name: String,
    #[serde(default)]
    pub is_cacheable: Flag,
    #[serde(default)]
    pub scc_index: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAsset {
    pub asset_name: String,
    pub bundle_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}

/// Type trees store booleans either natively or as integers.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

impl Flag {
    pub fn as_bool(self) -> bool {
        match self {
            Flag::Bool(value) => value,
            Flag::Int(value) => value != 0,
        }
    }
}

/// Dependency table of the engine's bundle manifest object, keyed by numeric
/// bundle id.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DependencyDocument {
    #[serde(rename = "AssetBundleNames", default)]
    pub names: Vec<(i64, String)>,
    #[serde(rename = "AssetBundleInfos", default)]
    pub infos: Vec<(i64, DependencyInfo)>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DependencyInfo {
    #[serde(rename = "AssetBundleDependencies", default)]
    pub dependencies: Vec<i64>,
}

impl IndexDocument {
    pub fn from_document(document: Value) -> Result<Self, ManifestError> {
        serde_json::from_value(document)
            .map_err(|err| ManifestError::Schema(format!("index document: {}", err)))
    }
}

impl DependencyDocument {
    pub fn from_document(document: Value) -> Result<Self, ManifestError> {
        serde_json::from_value(document)
            .map_err(|err| ManifestError::Schema(format!("dependency document: {}", err)))
    }

    fn dependency_names(&self) -> Result<HashMap<&str, Vec<&str>>, ManifestError> {
        let names: HashMap<i64, &str> = self
            .names
            .iter()
            .map(|(id, name)| (*id, name.as_str()))
            .collect();
        let resolve = |id: &i64| {
            names
                .get(id)
                .copied()
                .ok_or_else(|| ManifestError::Schema(format!("unknown bundle id {}", id)))
        };

        let mut out = HashMap::with_capacity(self.infos.len());
        for (id, info) in &self.infos {
            let deps = info
                .dependencies
                .iter()
                .map(resolve)
                .collect::<Result<Vec<_>, _>>()?;
            out.insert(resolve(id)?, deps);
        }
        Ok(out)
    }
}

/// Rebuilds the native manifest shape from the two legacy documents.
pub fn build_legacy_manifest(
    index: &IndexDocument,
    dependencies: &DependencyDocument,
) -> Result<ResourceManifest, ManifestError> {
    let dep_names = dependencies.dependency_names()?;
    let positions: HashMap<&str, usize> = index
        .bundles
        .iter()
        .enumerate()
        .map(|(position, bundle)| (bundle.name.as_str(), position))
        .collect();
    let position_of = |name: &str| {
        positions
            .get(name)
            .copied()
            .ok_or_else(|| ManifestError::Schema(format!("bundle {} missing from index", name)))
    };

    let mut bundles = Vec::with_capacity(index.bundles.len());
    for bundle in &index.bundles {
        let mut all_dependencies = Vec::new();
        if let Some(deps) = dep_names.get(bundle.name.as_str()) {
            for dep in deps {
                all_dependencies.push(position_of(dep)?);
            }
        }
        bundles.push(BundleRecord {
            name: bundle.name.clone(),
            is_cacheable: Some(bundle.is_cacheable.as_bool()),
            scc_index: Some(bundle.scc_index),
            all_dependencies: Some(all_dependencies),
            ..BundleRecord::default()
        });
    }

    let mut assets = Vec::with_capacity(index.asset_to_bundle_list.len());
    for asset in &index.asset_to_bundle_list {
        assets.push(AssetRecord {
            asset_name: asset.asset_name.clone(),
            bundle_index: position_of(&asset.bundle_name)?,
            name: asset.name.clone(),
            path: asset.path.clone(),
            extra: Map::new(),
        });
    }

    debug!(
        bundles = bundles.len(),
        assets = assets.len(),
        "rebuilt legacy manifest"
    );
    Ok(ResourceManifest {
        bundles,
        asset_to_bundle_list: assets,
        extra: Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> IndexDocument {
        IndexDocument::from_document(json!({
            "bundles": [
                {"name": "arts/clue_hub.ab", "isCacheable": 1, "sccIndex": 2},
                {"name": "anon/scripts.ab", "isCacheable": 0, "sccIndex": 0},
                {"name": "ui/common.ab", "isCacheable": true, "sccIndex": 1}
            ],
            "assetToBundleList": [
                {"assetName": "arts/clue_hub", "bundleName": "arts/clue_hub.ab"},
                {
                    "assetName": "ui/common/frame",
                    "bundleName": "ui/common.ab",
                    "name": "frame.prefab",
                    "path": "p"
                }
            ]
        }))
        .expect("index ok")
    }

    #[test]
    fn translates_ids_into_positions() {
        let deps = DependencyDocument::from_document(json!({
            "AssetBundleNames": [
                [10, "ui/common.ab"],
                [11, "anon/scripts.ab"],
                [12, "arts/clue_hub.ab"]
            ],
            "AssetBundleInfos": [
                [12, {"AssetBundleDependencies": [11, 10]}],
                [10, {"AssetBundleDependencies": []}]
            ]
        }))
        .expect("deps ok");
        let manifest = build_legacy_manifest(&index(), &deps).expect("build ok");

        assert_eq!(manifest.bundles[0].all_dependencies, Some(vec![1, 2]));
        assert_eq!(manifest.bundles[1].all_dependencies, Some(vec![]));
        assert_eq!(manifest.bundles[0].is_cacheable, Some(true));
        assert_eq!(manifest.bundles[1].is_cacheable, Some(false));
        assert_eq!(manifest.bundles[2].is_cacheable, Some(true));
        assert_eq!(manifest.bundles[0].props, None);
        assert_eq!(manifest.asset_to_bundle_list[1].bundle_index, 2);
        assert_eq!(manifest.asset_to_bundle_list[0].name, "");
        assert_eq!(manifest.asset_to_bundle_list[1].path, "p");
    }

    #[test]
    fn unknown_names_are_schema_errors() {
        let deps = DependencyDocument::from_document(json!({
            "AssetBundleNames": [[1, "ui/gone.ab"]],
            "AssetBundleInfos": [[1, {"AssetBundleDependencies": []}]]
        }))
        .expect("deps ok");
        let mut index = index();
        index.asset_to_bundle_list[0].bundle_name = "ui/gone.ab".to_string();
        assert!(matches!(
            build_legacy_manifest(&index, &deps),
            Err(ManifestError::Schema(_))
        ));

        let dangling_id = DependencyDocument::from_document(json!({
            "AssetBundleNames": [],
            "AssetBundleInfos": [[3, {"AssetBundleDependencies": []}]]
        }))
        .expect("deps ok");
        assert!(matches!(
            build_legacy_manifest(&self::index(), &dangling_id),
            Err(ManifestError::Schema(_))
        ));
    }
}
