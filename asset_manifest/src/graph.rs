use std::collections::HashMap;

use crate::{ManifestError, ResourceManifest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleNode {
    pub name: String,
    pub props: i64,
    pub scc_index: i64,
    pub is_cacheable: bool,
    pub all_dependencies: Vec<usize>,
    pub direct_dependencies: Option<Vec<usize>>,
}

/// Positional bundle list of one release with resolved dependency edges in
/// both directions. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct BundleGraph {
    nodes: Vec<BundleNode>,
    by_name: HashMap<String, usize>,
    dependents: Vec<Vec<usize>>,
}

impl BundleGraph {
    pub fn build(manifest: &ResourceManifest) -> Result<Self, ManifestError> {
        let count = manifest.bundles.len();
        let mut nodes = Vec::with_capacity(count);
        let mut by_name = HashMap::with_capacity(count);
        for (index, record) in manifest.bundles.iter().enumerate() {
            nodes.push(BundleNode {
                name: record.name.clone(),
                props: record.props.unwrap_or(0),
                scc_index: record.scc_index.unwrap_or(0),
                is_cacheable: record.is_cacheable.unwrap_or(false),
                all_dependencies: record.all_dependencies.clone().unwrap_or_default(),
                direct_dependencies: record.direct_dependencies.clone(),
            });
            by_name.insert(record.name.clone(), index);
        }

        let mut dependents = vec![Vec::new(); count];
        for (index, node) in nodes.iter().enumerate() {
            for &dep in &node.all_dependencies {
                if dep >= count {
                    return Err(ManifestError::Schema(format!(
                        "bundle {} depends on index {} of {}",
                        node.name, dep, count
                    )));
                }
                dependents[dep].push(index);
            }
        }

        Ok(Self {
            nodes,
            by_name,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[BundleNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&BundleNode> {
        self.nodes.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn by_name(&self, name: &str) -> Result<&BundleNode, ManifestError> {
        self.index_of(name)
            .and_then(|index| self.nodes.get(index))
            .ok_or_else(|| ManifestError::NotFound(format!("bundle {}", name)))
    }

    /// Bundles `index` depends on, in `allDependencies` order.
    pub fn dependencies(&self, index: usize) -> impl Iterator<Item = &BundleNode> + '_ {
        self.nodes
            .get(index)
            .map(|node| node.all_dependencies.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|&dep| self.nodes.get(dep))
    }

    /// Bundles listing `index` among their dependencies.
    pub fn dependents(&self, index: usize) -> impl Iterator<Item = &BundleNode> + '_ {
        self.dependents
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|&dep| self.nodes.get(dep))
    }

    pub fn max_scc_index(&self) -> Option<i64> {
        self.nodes.iter().map(|node| node.scc_index).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(doc: serde_json::Value) -> ResourceManifest {
        ResourceManifest::from_document(doc).expect("manifest ok")
    }

    #[test]
    fn resolves_edges_both_ways() {
        let graph = BundleGraph::build(&manifest(json!({
            "bundles": [
                {"name": "arts/clue_hub.ab", "sccIndex": 3, "allDependencies": [2, 1]},
                {"name": "ui/common.ab", "sccIndex": 1},
                {"name": "anon/scripts.ab", "sccIndex": 0},
                {"name": "ui/extra.ab", "sccIndex": 2, "allDependencies": [2]}
            ]
        })))
        .expect("graph ok");

        let deps: Vec<&str> = graph.dependencies(0).map(|node| node.name.as_str()).collect();
        assert_eq!(deps, ["anon/scripts.ab", "ui/common.ab"]);
        let users: Vec<&str> = graph.dependents(2).map(|node| node.name.as_str()).collect();
        assert_eq!(users, ["arts/clue_hub.ab", "ui/extra.ab"]);
        assert_eq!(graph.index_of("ui/extra.ab"), Some(3));
        assert_eq!(graph.max_scc_index(), Some(3));
        assert_eq!(graph.dependencies(1).count(), 0);
    }

    #[test]
    fn out_of_range_dependency_is_schema_error() {
        let err = BundleGraph::build(&manifest(json!({
            "bundles": [{"name": "a.ab", "allDependencies": [4]}]
        })))
        .expect_err("must fail");
        assert!(matches!(err, ManifestError::Schema(_)));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let graph = BundleGraph::build(&manifest(json!({"bundles": [{"name": "a.ab"}]})))
            .expect("graph ok");
        let node = graph.by_name("a.ab").expect("found");
        assert_eq!(node.props, 0);
        assert!(!node.is_cacheable);
        assert!(node.all_dependencies.is_empty());
        assert!(matches!(graph.by_name("b.ab"), Err(ManifestError::NotFound(_))));
    }
}
