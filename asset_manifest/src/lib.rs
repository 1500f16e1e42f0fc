//! Release manifests: wire shape, bundle dependency graph and asset path tree.
#![forbid(unsafe_code)]

mod error;
pub mod graph;
pub mod legacy;
pub mod manifest;
pub mod tree;

pub use error::ManifestError;
pub use graph::{BundleGraph, BundleNode};
pub use legacy::{build_legacy_manifest, DependencyDocument, IndexDocument};
pub use manifest::{AssetRecord, BundleRecord, Release, ResourceManifest};
pub use tree::{
    asset_name_from_tree_path, tree_path_for_asset, AssetTree, NodeId, PathTree, LEAF_SUFFIX,
};
