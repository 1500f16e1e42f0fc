use std::collections::{BTreeSet, HashMap};

use asset_manifest::{
    asset_name_from_tree_path, tree_path_for_asset, AssetRecord, BundleRecord, PathTree,
    ResourceManifest,
};
use serde_json::Map;
use tracing::{debug, info};

use crate::snapshot::ReleaseSnapshot;
use crate::MergeError;

/// Bundle shared by every release's activities; renamed per source release.
pub const ACTIVITIES_BUNDLE: &str = "gamedata/levels/activities.ab";
pub const ANON_PREFIX: &str = "anon/";
pub const ACTIVITY_LEVELS_DIR: &str = "gamedata/levels/activities/";

const GAMEDATA_PREFIX: &str = "gamedata/";
const ACTIVITY_DIR: &str = "activity";
const ZONEMAPS_DIR: &str = "zonemaps";
const ZONEMAP_ALIAS_DIR: &str = "ui/zonemaps";

/// Source paths are pulled forward unless they are game data outside the
/// activity levels.
pub fn is_merge_path_allowed(path: &str) -> bool {
    !path.starts_with(GAMEDATA_PREFIX) || path.starts_with(ACTIVITY_LEVELS_DIR)
}

pub fn is_anon_bundle(name: &str) -> bool {
    name.starts_with(ANON_PREFIX)
}

pub fn destination_bundle_name(bundle: &str, res_version: &str) -> String {
    if bundle == ACTIVITIES_BUNDLE {
        format!("gamedata/levels/activities-{}.ab", res_version)
    } else {
        bundle.to_string()
    }
}

/// Overlay leaf: an asset of one source release and the bundle it ships in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayLeaf {
    pub source: usize,
    pub asset: usize,
    pub bundle_name: String,
}

/// A source bundle selected for the package, keyed elsewhere by final name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergerBundle {
    pub source: usize,
    pub bundle: usize,
    pub dependency_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelMigrationPlan {
    pub bundle_name: String,
    pub source: usize,
    pub level_ids: BTreeSet<String>,
}

pub struct ManifestMerger<'a> {
    target: &'a ReleaseSnapshot,
    sources: &'a [ReleaseSnapshot],
    overlay: PathTree<OverlayLeaf>,
    bundles: Vec<(String, MergerBundle)>,
    bundle_index: HashMap<String, usize>,
}

impl<'a> ManifestMerger<'a> {
    /// `sources` are in priority order, highest first.
    pub fn new(target: &'a ReleaseSnapshot, sources: &'a [ReleaseSnapshot]) -> Self {
        Self {
            target,
            sources,
            overlay: PathTree::new(),
            bundles: Vec::new(),
            bundle_index: HashMap::new(),
        }
    }

    pub fn target(&self) -> &'a ReleaseSnapshot {
        self.target
    }

    pub fn sources(&self) -> &'a [ReleaseSnapshot] {
        self.sources
    }

    pub fn overlay(&self) -> &PathTree<OverlayLeaf> {
        &self.overlay
    }

    pub fn bundles(&self) -> impl Iterator<Item = (&str, &MergerBundle)> {
        self.bundles
            .iter()
            .map(|(name, bundle)| (name.as_str(), bundle))
    }

    pub fn merger_bundle(&self, name: &str) -> Option<&MergerBundle> {
        self.bundle_index
            .get(name)
            .and_then(|&index| self.bundles.get(index))
            .map(|(_, bundle)| bundle)
    }

    pub fn merge_sources(&mut self) -> Result<(), MergeError> {
        for source in 0..self.sources.len() {
            self.merge_source(source)?;
        }
        Ok(())
    }

    /// Adds every eligible leaf of one source that neither the target nor a
    /// higher-priority source already provides. Returns the accepted count.
    pub fn merge_source(&mut self, source: usize) -> Result<usize, MergeError> {
        let sources = self.sources;
        let snapshot = sources
            .get(source)
            .ok_or_else(|| MergeError::NotFound(format!("source {}", source)))?;

        let mut accepted = 0;
        for (path, &asset) in snapshot.tree.paths().leaves() {
            if self.target.tree.paths().contains_leaf(&path)? {
                continue;
            }
            if self.overlay.contains_leaf(&path)? {
                continue;
            }
            if !is_merge_path_allowed(&path) {
                continue;
            }
            let (bundle, node) = snapshot.asset_bundle(asset).ok_or_else(|| {
                MergeError::Schema(format!("asset {} of {} has no bundle", path, snapshot.release))
            })?;
            let bundle_name = destination_bundle_name(&node.name, &snapshot.release.res_version);
            self.overlay.insert(
                &path,
                OverlayLeaf {
                    source,
                    asset,
                    bundle_name: bundle_name.clone(),
                },
            )?;
            self.add_bundle_closure(source, bundle, bundle_name);
            accepted += 1;
        }
        info!(
            release = %snapshot.release,
            accepted,
            bundles = self.bundles.len(),
            "merged source release"
        );
        Ok(accepted)
    }

    /// Selects `bundle` under `name` and, transitively, its non-anonymous
    /// dependencies, stopping at anything the target or this merge has.
    fn add_bundle_closure(&mut self, source: usize, bundle: usize, name: String) {
        if self.target.graph.contains(&name) || self.bundle_index.contains_key(&name) {
            return;
        }
        let sources = self.sources;
        let graph = &sources[source].graph;
        let dependencies: Vec<(usize, &str)> = graph
            .node(bundle)
            .map(|node| node.all_dependencies.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|&dep| graph.node(dep).map(|node| (dep, node.name.as_str())))
            .filter(|(_, dep_name)| !is_anon_bundle(dep_name))
            .collect();

        debug!(bundle = %name, dependencies = dependencies.len(), "selected bundle");
        self.bundle_index.insert(name.clone(), self.bundles.len());
        self.bundles.push((
            name,
            MergerBundle {
                source,
                bundle,
                dependency_names: dependencies
                    .iter()
                    .map(|(_, dep_name)| dep_name.to_string())
                    .collect(),
            },
        ));

        for (dep, dep_name) in dependencies {
            self.add_bundle_closure(source, dep, dep_name.to_string());
        }
    }

    /// Makes the overlay asset `from` also addressable as `to`.
    pub fn copy_tree_node(&mut self, from: &str, to: &str) -> Result<(), MergeError> {
        let from_path = tree_path_for_asset(from);
        let leaf = self
            .overlay
            .leaf_at(&from_path)?
            .cloned()
            .ok_or_else(|| MergeError::NotFound(format!("overlay path {}", from_path)))?;
        self.overlay.insert(&tree_path_for_asset(to), leaf)?;
        Ok(())
    }

    /// Aliases `activity/<x>/zonemaps/<z>` at `ui/zonemaps/<z>`.
    pub fn copy_zonemap_nodes(&mut self) -> Result<usize, MergeError> {
        let Some(activity) = self.overlay.lookup_dir(ACTIVITY_DIR)? else {
            return Ok(0);
        };
        let mut zonemaps = Vec::new();
        for &child in self.overlay.children(activity) {
            if !self.overlay.is_dir(child) {
                continue;
            }
            let Some(dir) = self.overlay.child(child, ZONEMAPS_DIR) else {
                continue;
            };
            for &zonemap in self.overlay.children(dir) {
                if !self.overlay.is_dir(zonemap) {
                    zonemaps.push((
                        self.overlay.path(zonemap),
                        self.overlay.name(zonemap).to_string(),
                    ));
                }
            }
        }

        for (path, name) in &zonemaps {
            let alias = format!("{}/{}", ZONEMAP_ALIAS_DIR, name);
            self.copy_tree_node(
                asset_name_from_tree_path(path),
                asset_name_from_tree_path(&alias),
            )?;
        }
        debug!(count = zonemaps.len(), "aliased zonemaps");
        Ok(zonemaps.len())
    }

    /// Bundles holding the merged activity levels and the level ids to
    /// migrate inside them.
    pub fn level_migrations(&self) -> Result<Vec<LevelMigrationPlan>, MergeError> {
        let Some(dir) = self.overlay.lookup_dir(ACTIVITY_LEVELS_DIR)? else {
            return Ok(Vec::new());
        };
        let mut level_ids = BTreeSet::new();
        let mut bundle_names: Vec<&str> = Vec::new();
        for (path, leaf) in self.overlay.leaves_under(dir) {
            if self.bundle_index.contains_key(&leaf.bundle_name)
                && !bundle_names.contains(&leaf.bundle_name.as_str())
            {
                bundle_names.push(&leaf.bundle_name);
            }
            let file_name = path.rsplit('/').next().unwrap_or(&path);
            level_ids.insert(asset_name_from_tree_path(file_name).to_string());
        }

        let mut plans = Vec::with_capacity(bundle_names.len());
        for name in bundle_names {
            let bundle = self
                .merger_bundle(name)
                .ok_or_else(|| MergeError::NotFound(format!("merger bundle {}", name)))?;
            plans.push(LevelMigrationPlan {
                bundle_name: name.to_string(),
                source: bundle.source,
                level_ids: level_ids.clone(),
            });
        }
        Ok(plans)
    }

    /// Target manifest plus one record per selected bundle and per overlay
    /// leaf, with every reference resolved to a final position.
    pub fn build_mod(&self) -> Result<ResourceManifest, MergeError> {
        let mut manifest = self.target.manifest.clone();
        let older = self.target.is_older_generation();
        let mut next_scc = self.target.graph.max_scc_index().unwrap_or(-1).max(-1) + 1;

        for (name, selected) in &self.bundles {
            let origin = self.sources[selected.source]
                .graph
                .node(selected.bundle)
                .ok_or_else(|| MergeError::NotFound(format!("origin of bundle {}", name)))?;
            let mut record = BundleRecord {
                name: name.clone(),
                scc_index: Some(next_scc),
                ..BundleRecord::default()
            };
            if older {
                record.is_cacheable = Some(origin.is_cacheable);
            } else {
                record.props = Some(origin.props);
            }
            manifest.bundles.push(record);
            next_scc += 1;
        }

        let positions: HashMap<String, usize> = manifest
            .bundles
            .iter()
            .enumerate()
            .map(|(position, bundle)| (bundle.name.clone(), position))
            .collect();
        let resolve = |name: &str| {
            positions
                .get(name)
                .copied()
                .ok_or_else(|| MergeError::NotFound(format!("bundle {} in rebuilt manifest", name)))
        };

        for (name, selected) in &self.bundles {
            let position = resolve(name.as_str())?;
            let dependencies = selected
                .dependency_names
                .iter()
                .map(|dep| resolve(dep.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let record = &mut manifest.bundles[position];
            if older {
                record.direct_dependencies = Some(dependencies.clone());
            }
            record.all_dependencies = Some(dependencies);
        }

        for (path, leaf) in self.overlay.leaves() {
            let asset = self.sources[leaf.source].asset(leaf.asset).ok_or_else(|| {
                MergeError::NotFound(format!("asset {} of source {}", leaf.asset, leaf.source))
            })?;
            manifest.asset_to_bundle_list.push(AssetRecord {
                asset_name: asset_name_from_tree_path(&path).to_string(),
                bundle_index: resolve(leaf.bundle_name.as_str())?,
                name: asset.name.clone(),
                path: asset.path.clone(),
                extra: Map::new(),
            });
        }

        info!(
            bundles = self.bundles.len(),
            assets = self.overlay.leaf_count(),
            total_bundles = manifest.bundles.len(),
            "rebuilt manifest"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_manifest::Release;
    use serde_json::{json, Value};

    fn snapshot(client: &str, res: &str, doc: Value) -> ReleaseSnapshot {
        let release = Release::parse(client, res).expect("release ok");
        let manifest = ResourceManifest::from_document(doc).expect("manifest ok");
        ReleaseSnapshot::build(release, manifest).expect("snapshot ok")
    }

    fn target() -> ReleaseSnapshot {
        snapshot(
            "2.6.91",
            "target",
            json!({
                "bundles": [
                    {"name": "anon/shared.ab", "props": 0, "sccIndex": 0},
                    {"name": "ui/common.ab", "props": 1, "sccIndex": 4, "allDependencies": [0]},
                    {"name": "gamedata/levels/activities.ab", "props": 0, "sccIndex": 2}
                ],
                "assetToBundleList": [
                    {
                        "assetName": "ui/common/frame",
                        "bundleIndex": 1,
                        "name": "frame.prefab",
                        "path": "p0"
                    }
                ]
            }),
        )
    }

    fn source_one() -> ReleaseSnapshot {
        snapshot(
            "2.6.61",
            "s1",
            json!({
                "bundles": [
                    {"name": "x.ab", "props": 3, "sccIndex": 0, "allDependencies": [1, 2, 3]},
                    {"name": "anon/s1.ab", "props": 0, "sccIndex": 1},
                    {"name": "ui/common.ab", "props": 1, "sccIndex": 2},
                    {"name": "y.ab", "props": 5, "sccIndex": 3, "allDependencies": [4]},
                    {"name": "z.ab", "props": 6, "sccIndex": 4},
                    {"name": "gamedata/levels/activities.ab", "props": 0, "sccIndex": 5},
                    {"name": "gamedata/excel.ab", "props": 0, "sccIndex": 6}
                ],
                "assetToBundleList": [
                    {"assetName": "a/b.lvl", "bundleIndex": 0, "name": "b.lvl", "path": "p1"},
                    {
                        "assetName": "ui/common/frame",
                        "bundleIndex": 2,
                        "name": "frame.prefab",
                        "path": "p2"
                    },
                    {
                        "assetName": "gamedata/levels/activities/act1/level_act1_01",
                        "bundleIndex": 5
                    },
                    {"assetName": "gamedata/excel/item_table", "bundleIndex": 6},
                    {"assetName": "activity/act1/zonemaps/zone_1", "bundleIndex": 4}
                ]
            }),
        )
    }

    fn source_two() -> ReleaseSnapshot {
        snapshot(
            "2.6.41",
            "s2",
            json!({
                "bundles": [
                    {"name": "x2.ab", "props": 9, "sccIndex": 0},
                    {"name": "w.ab", "props": 2, "sccIndex": 1}
                ],
                "assetToBundleList": [
                    {"assetName": "a/b.lvl", "bundleIndex": 0, "name": "other.lvl"},
                    {"assetName": "ui/zonemaps/x", "bundleIndex": 1}
                ]
            }),
        )
    }

    #[test]
    fn path_filter() {
        assert!(!is_merge_path_allowed("gamedata/foo.leaf"));
        assert!(!is_merge_path_allowed("gamedata/levels/obt/main/level_main_01-01.leaf"));
        assert!(is_merge_path_allowed("gamedata/levels/activities/act1/level.leaf"));
        assert!(is_merge_path_allowed("ui/zonemaps/x.leaf"));
        assert_eq!(
            destination_bundle_name(ACTIVITIES_BUNDLE, "s1"),
            "gamedata/levels/activities-s1.ab"
        );
        assert_eq!(destination_bundle_name("x.ab", "s1"), "x.ab");
    }

    #[test]
    fn higher_priority_source_wins_and_closure_is_complete() {
        let target = target();
        let sources = vec![source_one(), source_two()];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");

        let leaf = merger
            .overlay()
            .leaf_at(&tree_path_for_asset("a/b.lvl"))
            .expect("lookup ok")
            .expect("leaf exists");
        assert_eq!(leaf.source, 0);
        assert_eq!(leaf.bundle_name, "x.ab");
        assert!(!merger
            .overlay()
            .contains_leaf(&tree_path_for_asset("ui/common/frame"))
            .expect("lookup ok"));
        assert!(!merger
            .overlay()
            .contains_leaf(&tree_path_for_asset("gamedata/excel/item_table"))
            .expect("lookup ok"));
        assert!(merger
            .overlay()
            .contains_leaf(&tree_path_for_asset("ui/zonemaps/x"))
            .expect("lookup ok"));

        let names: Vec<&str> = merger.bundles().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            ["x.ab", "y.ab", "z.ab", "gamedata/levels/activities-s1.ab", "w.ab"]
        );
        let x = merger.merger_bundle("x.ab").expect("selected");
        assert_eq!(x.dependency_names, ["ui/common.ab", "y.ab"]);

        for (_, bundle) in merger.bundles() {
            for dep in &bundle.dependency_names {
                assert!(
                    target.graph.contains(dep) || merger.merger_bundle(dep).is_some(),
                    "dangling dependency {}",
                    dep
                );
            }
        }
    }

    #[test]
    fn build_mod_appends_records_with_resolved_positions() {
        let target = target();
        let sources = vec![source_one(), source_two()];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let manifest = merger.build_mod().expect("build ok");

        assert_eq!(manifest.bundles.len(), 3 + 5);
        let x = &manifest.bundles[3];
        assert_eq!(x.name, "x.ab");
        assert_eq!(x.scc_index, Some(5));
        assert_eq!(x.props, Some(3));
        assert_eq!(x.is_cacheable, None);
        assert_eq!(x.all_dependencies, Some(vec![1, 4]));
        assert_eq!(x.direct_dependencies, None);
        assert_eq!(manifest.bundles[7].scc_index, Some(9));

        for bundle in &manifest.bundles[3..] {
            for &dep in bundle.all_dependencies.as_deref().unwrap_or(&[]) {
                assert!(dep < manifest.bundles.len());
            }
        }

        let added = &manifest.asset_to_bundle_list[1..];
        let record = added
            .iter()
            .find(|asset| asset.asset_name == "a/b.lvl")
            .expect("record for a/b.lvl");
        assert_eq!(record.bundle_index, 3);
        assert_eq!(record.name, "b.lvl");
        assert_eq!(record.path, "p1");
        let level = added
            .iter()
            .find(|asset| asset.asset_name == "gamedata/levels/activities/act1/level_act1_01")
            .expect("level record");
        assert_eq!(
            manifest.bundles[level.bundle_index].name,
            "gamedata/levels/activities-s1.ab"
        );
    }

    #[test]
    fn older_generation_target_mirrors_direct_dependencies() {
        let target = snapshot(
            "2.4.61",
            "old",
            json!({
                "bundles": [{"name": "ui/common.ab", "isCacheable": true, "sccIndex": 0}],
                "assetToBundleList": []
            }),
        );
        let sources = vec![snapshot(
            "2.4.41",
            "older",
            json!({
                "bundles": [
                    {"name": "x.ab", "isCacheable": true, "sccIndex": 0, "allDependencies": [1]},
                    {"name": "ui/common.ab", "isCacheable": false, "sccIndex": 1}
                ],
                "assetToBundleList": [{"assetName": "a/b", "bundleIndex": 0}]
            }),
        )];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let manifest = merger.build_mod().expect("build ok");
        let x = &manifest.bundles[1];
        assert_eq!(x.is_cacheable, Some(true));
        assert_eq!(x.props, None);
        assert_eq!(x.scc_index, Some(1));
        assert_eq!(x.all_dependencies, Some(vec![0]));
        assert_eq!(x.direct_dependencies, Some(vec![0]));
    }

    #[test]
    fn aliases_and_zonemaps() {
        let target = target();
        let sources = vec![source_one()];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");

        assert_eq!(merger.copy_zonemap_nodes().expect("copy ok"), 1);
        let alias = merger
            .overlay()
            .leaf_at(&tree_path_for_asset("ui/zonemaps/zone_1"))
            .expect("lookup ok")
            .expect("alias exists");
        assert_eq!(alias.bundle_name, "z.ab");

        merger
            .copy_tree_node("a/b.lvl", "a/c.lvl")
            .expect("copy ok");
        let err = merger
            .copy_tree_node("a/missing", "a/d")
            .expect_err("missing source");
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
        let err = merger
            .copy_tree_node("a/b.lvl", "a/c.lvl")
            .expect_err("duplicate alias");
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);

        let manifest = merger.build_mod().expect("build ok");
        assert!(manifest
            .asset_to_bundle_list
            .iter()
            .any(|asset| asset.asset_name == "ui/zonemaps/zone_1"));
    }

    #[test]
    fn zonemaps_without_activity_dir_is_noop() {
        let target = target();
        let sources = vec![source_two()];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        assert_eq!(merger.copy_zonemap_nodes().expect("copy ok"), 0);
    }

    #[test]
    fn level_migration_plan_covers_activity_levels() {
        let target = target();
        let sources = vec![source_one()];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let plans = merger.level_migrations().expect("plan ok");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].bundle_name, "gamedata/levels/activities-s1.ab");
        assert_eq!(plans[0].source, 0);
        assert_eq!(
            plans[0].level_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            ["level_act1_01"]
        );
    }
}
