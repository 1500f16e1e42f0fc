use asset_manifest::{AssetRecord, AssetTree, BundleGraph, BundleNode, Release, ResourceManifest};
use tracing::info;

use crate::resource::Resource;
use crate::MergeError;

/// Read-only view of one release: its manifest, bundle graph and path tree.
#[derive(Clone, Debug)]
pub struct ReleaseSnapshot {
    pub release: Release,
    pub manifest: ResourceManifest,
    pub graph: BundleGraph,
    pub tree: AssetTree,
}

impl ReleaseSnapshot {
    pub fn build(release: Release, manifest: ResourceManifest) -> Result<Self, MergeError> {
        let graph = BundleGraph::build(&manifest)?;
        let tree = AssetTree::build(&manifest)?;
        info!(
            release = %release,
            bundles = graph.len(),
            assets = tree.paths().leaf_count(),
            dangling = tree.dangling().len(),
            "built release snapshot"
        );
        Ok(Self {
            release,
            manifest,
            graph,
            tree,
        })
    }

    pub fn from_resource(resource: &mut Resource<'_>) -> Result<Self, MergeError> {
        let manifest = resource.load_manifest()?.clone();
        Self::build(resource.release().clone(), manifest)
    }

    pub fn asset(&self, index: usize) -> Option<&AssetRecord> {
        self.manifest.asset_to_bundle_list.get(index)
    }

    /// Bundle owning the asset at `index`.
    pub fn asset_bundle(&self, index: usize) -> Option<(usize, &BundleNode)> {
        let bundle = self.asset(index)?.bundle_index;
        self.graph.node(bundle).map(|node| (bundle, node))
    }

    pub fn is_older_generation(&self) -> bool {
        self.release.is_older_generation()
    }
}
