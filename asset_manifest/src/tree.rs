use std::collections::HashMap;
use std::fmt::Write as _;

use crate::{ManifestError, ResourceManifest};

/// Appended to every asset name to form its leaf path, so an asset name can
/// also be the directory prefix of other assets.
pub const LEAF_SUFFIX: &str = ".leaf";

const INDENT: &str = "    ";

pub fn tree_path_for_asset(asset_name: &str) -> String {
    format!("{}{}", asset_name, LEAF_SUFFIX)
}

pub fn asset_name_from_tree_path(path: &str) -> &str {
    path.strip_suffix(LEAF_SUFFIX).unwrap_or(path)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Clone, Debug)]
enum NodeKind<L> {
    Dir {
        children: Vec<NodeId>,
        by_name: HashMap<String, NodeId>,
    },
    Leaf(L),
}

#[derive(Clone, Debug)]
struct Node<L> {
    name: String,
    parent: Option<NodeId>,
    depth: usize,
    kind: NodeKind<L>,
}

/// Slash-separated namespace stored as an arena. Directories are created on
/// demand; children keep insertion order.
#[derive(Clone, Debug)]
pub struct PathTree<L> {
    nodes: Vec<Node<L>>,
}

impl<L> Default for PathTree<L> {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

impl<L> PathTree<L> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                parent: None,
                depth: 0,
                kind: empty_dir(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn insert(&mut self, path: &str, leaf: L) -> Result<NodeId, ManifestError> {
        let parts: Vec<&str> = segments(path).collect();
        let Some((file_name, dirs)) = parts.split_last() else {
            return Err(ManifestError::Conflict(format!("empty leaf path {:?}", path)));
        };

        let mut node = self.root();
        for dir in dirs {
            node = match self.child(node, dir) {
                Some(child) => {
                    if !self.is_dir(child) {
                        return Err(ManifestError::Conflict(format!(
                            "{} is not a directory",
                            self.path(child)
                        )));
                    }
                    child
                }
                None => self.push_child(node, dir, empty_dir()),
            };
        }

        if self.child(node, file_name).is_some() {
            return Err(ManifestError::Conflict(format!("{} already exists", path)));
        }
        Ok(self.push_child(node, file_name, NodeKind::Leaf(leaf)))
    }

    /// Resolves `path` to a node of either kind. Descending through a leaf is
    /// a conflict; a missing segment is `None`.
    pub fn lookup(&self, path: &str) -> Result<Option<NodeId>, ManifestError> {
        let mut node = self.root();
        for segment in segments(path) {
            if !self.is_dir(node) {
                return Err(ManifestError::Conflict(format!(
                    "{} is not a directory",
                    self.path(node)
                )));
            }
            match self.child(node, segment) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    pub fn lookup_dir(&self, path: &str) -> Result<Option<NodeId>, ManifestError> {
        match self.lookup(path)? {
            Some(node) if !self.is_dir(node) => Err(ManifestError::Conflict(format!(
                "{} is not a directory",
                path
            ))),
            found => Ok(found),
        }
    }

    pub fn leaf_at(&self, path: &str) -> Result<Option<&L>, ManifestError> {
        match self.lookup(path)? {
            Some(node) => match self.leaf(node) {
                Some(leaf) => Ok(Some(leaf)),
                None => Err(ManifestError::Conflict(format!("{} is not a leaf", path))),
            },
            None => Ok(None),
        }
    }

    pub fn contains_leaf(&self, path: &str) -> Result<bool, ManifestError> {
        Ok(self.leaf_at(path)?.is_some())
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.nodes[node.0].depth
    }

    pub fn is_dir(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Dir { .. })
    }

    pub fn leaf(&self, node: NodeId) -> Option<&L> {
        match &self.nodes[node.0].kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Dir { .. } => None,
        }
    }

    pub fn child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        match &self.nodes[node.0].kind {
            NodeKind::Dir { by_name, .. } => by_name.get(name).copied(),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        match &self.nodes[node.0].kind {
            NodeKind::Dir { children, .. } => children,
            NodeKind::Leaf(_) => &[],
        }
    }

    /// Slash-joined names from the root, root excluded.
    pub fn path(&self, node: NodeId) -> String {
        let mut names = Vec::with_capacity(self.depth(node));
        let mut current = Some(node);
        while let Some(id) = current {
            let entry = &self.nodes[id.0];
            if entry.parent.is_some() {
                names.push(entry.name.as_str());
            }
            current = entry.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// `node` and everything below it, pre-order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn leaves_under(&self, node: NodeId) -> Vec<(String, &L)> {
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.leaf(id).map(|leaf| (self.path(id), leaf)))
            .collect()
    }

    pub fn leaves(&self) -> Vec<(String, &L)> {
        self.leaves_under(self.root())
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Leaf(_)))
            .count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in self.descendants(self.root()).into_iter().skip(1) {
            let node = &self.nodes[id.0];
            let _ = writeln!(out, "{}{}", INDENT.repeat(node.depth - 1), node.name);
        }
        out
    }

    fn push_child(&mut self, parent: NodeId, name: &str, kind: NodeKind<L>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = self.nodes[parent.0].depth + 1;
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            depth,
            kind,
        });
        if let NodeKind::Dir { children, by_name } = &mut self.nodes[parent.0].kind {
            children.push(id);
            by_name.insert(name.to_string(), id);
        }
        id
    }
}

fn empty_dir<L>() -> NodeKind<L> {
    NodeKind::Dir {
        children: Vec::new(),
        by_name: HashMap::new(),
    }
}

/// Path tree of one release. Leaves hold positions into the manifest's
/// asset list; assets without a name are kept aside as dangling.
#[derive(Clone, Debug, Default)]
pub struct AssetTree {
    paths: PathTree<usize>,
    dangling: Vec<usize>,
}

impl AssetTree {
    pub fn build(manifest: &ResourceManifest) -> Result<Self, ManifestError> {
        let bundle_count = manifest.bundles.len();
        let mut tree = Self::default();
        for (index, asset) in manifest.asset_to_bundle_list.iter().enumerate() {
            if asset.bundle_index >= bundle_count {
                return Err(ManifestError::Schema(format!(
                    "asset {:?} references bundle {} of {}",
                    asset.asset_name, asset.bundle_index, bundle_count
                )));
            }
            if asset.asset_name.is_empty() {
                tree.dangling.push(index);
                continue;
            }
            tree.paths
                .insert(&tree_path_for_asset(&asset.asset_name), index)?;
        }
        Ok(tree)
    }

    pub fn paths(&self) -> &PathTree<usize> {
        &self.paths
    }

    pub fn dangling(&self) -> &[usize] {
        &self.dangling
    }
}
