//! Graph map types and builders
//!
//! Defines the core data structures for efficient graph traversal.

use std::borrow::Borrow;
use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::model::Module;

/// Stable node identifier: the module's dotted path inside the model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Create from a path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `other` lies strictly inside this node's subtree
    pub fn is_ancestor_of(&self, other: &str) -> bool {
        other.len() > self.0.len()
            && other.starts_with(self.0.as_str())
            && other[self.0.len()..].starts_with(crate::model::PATH_SEPARATOR)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Entry in the node map - tracks one traced module and its state
#[derive(Debug, Clone)]
pub struct NodeEntry {
    /// Node identifier (module path)
    pub id: NodeId,
    /// Unit kind (`Conv2d`, `QuantLinear`, `Sequential`, ...)
    pub kind: &'static str,
    /// Nesting depth, top-level modules are at depth 1
    pub depth: usize,
    /// 1-based running index among nodes at the same depth
    pub index: usize,
    /// Enclosing traced container, if any
    pub parent: Option<NodeId>,
    /// Shape entering the module
    pub input_shape: Vec<usize>,
    /// Shape leaving the module
    pub output_shape: Vec<usize>,
    /// Trainable parameters (recursive for containers)
    pub num_params: usize,
    /// Whether the module runs as one unit in the trace
    pub is_leaf: bool,
    /// Whether the module is (or contains) a quantized unit
    pub quantized: bool,
}

impl NodeEntry {
    /// `depth-index` label, e.g. `2-3`
    pub fn depth_index(&self) -> String {
        format!("{}-{}", self.depth, self.index)
    }

    /// Re-read kind, parameter count and quantized flag from the live unit
    pub fn refresh(&mut self, unit: &Module) {
        self.kind = unit.kind();
        self.num_params = unit.param_count();
        self.quantized = unit.quantized_count() > 0;
    }
}

/// Type alias for node map: node id → NodeEntry (trace order preserved)
pub type NodeMap = IndexMap<NodeId, NodeEntry>;

/// Type alias for producer map: leaf id → previous leaf id
pub type ProducerMap = FxHashMap<NodeId, NodeId>;

/// Type alias for consumer map: leaf id → [next leaf ids]
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<NodeId, SmallVec<[NodeId; 4]>>;

/// Type alias for children map: container id → [child ids]
pub type ChildrenMap = FxHashMap<NodeId, SmallVec<[NodeId; 4]>>;

/// Build producer map from leaves in execution order
///
/// Each leaf consumes the output of the leaf traced before it.
pub fn build_producer_map(nodes: &NodeMap) -> ProducerMap {
    let mut map = FxHashMap::default();
    let mut prev: Option<&NodeId> = None;

    for entry in nodes.values().filter(|e| e.is_leaf) {
        if let Some(p) = prev {
            map.insert(entry.id.clone(), p.clone());
        }
        prev = Some(&entry.id);
    }

    map
}

/// Build consumer map by inverting the producer map
pub fn build_consumer_map(nodes: &NodeMap, producers: &ProducerMap) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    // walk in trace order so consumer lists are deterministic
    for id in nodes.keys() {
        if let Some(producer) = producers.get(id) {
            map.entry(producer.clone()).or_default().push(id.clone());
        }
    }

    map
}

/// Build children map from parent links
pub fn build_children_map(nodes: &NodeMap) -> ChildrenMap {
    let mut map: ChildrenMap = FxHashMap::default();

    for entry in nodes.values() {
        if let Some(parent) = &entry.parent {
            map.entry(parent.clone()).or_default().push(entry.id.clone());
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, parent: Option<&str>, is_leaf: bool) -> NodeEntry {
        NodeEntry {
            id: NodeId::from(id),
            kind: if is_leaf { "Linear" } else { "Sequential" },
            depth: if parent.is_some() { 2 } else { 1 },
            index: 1,
            parent: parent.map(NodeId::from),
            input_shape: vec![1, 4],
            output_shape: vec![1, 4],
            num_params: 0,
            is_leaf,
            quantized: false,
        }
    }

    fn make_test_nodes() -> NodeMap {
        let mut nodes = NodeMap::new();
        for e in [
            entry("block", None, false),
            entry("block.fc1", Some("block"), true),
            entry("block.fc2", Some("block"), true),
            entry("head", None, true),
        ] {
            nodes.insert(e.id.clone(), e);
        }
        nodes
    }

    #[test]
    fn test_build_producer_map() {
        let nodes = make_test_nodes();
        let map = build_producer_map(&nodes);

        assert_eq!(map.get("block.fc2"), Some(&NodeId::from("block.fc1")));
        assert_eq!(map.get("head"), Some(&NodeId::from("block.fc2")));
        assert!(map.get("block.fc1").is_none()); // first leaf
        assert!(map.get("block").is_none()); // containers are not linked
    }

    #[test]
    fn test_build_consumer_map() {
        let nodes = make_test_nodes();
        let producers = build_producer_map(&nodes);
        let map = build_consumer_map(&nodes, &producers);

        assert_eq!(
            map.get("block.fc1").map(|v| v.as_slice()),
            Some(&[NodeId::from("block.fc2")][..])
        );
        assert!(map.get("head").is_none());
    }

    #[test]
    fn test_build_children_map() {
        let nodes = make_test_nodes();
        let map = build_children_map(&nodes);

        let children: Vec<&str> = map["block"].iter().map(|c| c.as_str()).collect();
        assert_eq!(children, vec!["block.fc1", "block.fc2"]);
    }

    #[test]
    fn test_node_id_ancestry() {
        let id = NodeId::from("features");
        assert!(id.is_ancestor_of("features.0"));
        assert!(!id.is_ancestor_of("features"));
        assert!(!id.is_ancestor_of("features2.0"));
    }
}
