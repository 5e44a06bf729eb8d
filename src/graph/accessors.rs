//! Advanced graph accessor methods
//!
//! High-level queries over a traced graph: filtering, transitive traversal
//! and aggregate statistics.

use rustc_hash::FxHashSet;

use super::context::{ModelGraph, Node};
use super::maps::NodeId;

impl<'m> ModelGraph<'m> {
    // ========================================================================
    // Filtering
    // ========================================================================

    /// Nodes executed as single units, in execution order
    pub fn leaf_nodes(&self) -> Vec<Node<'_>> {
        self.nodes().filter(|n| n.is_leaf()).collect()
    }

    /// Find nodes by unit kind
    pub fn find_nodes_by_kind(&self, kind: &str) -> Vec<Node<'_>> {
        self.nodes().filter(|n| n.kind() == kind).collect()
    }

    /// Find nodes matching any of the given kinds
    pub fn find_nodes_by_kinds(&self, kinds: &[&str]) -> Vec<Node<'_>> {
        self.nodes().filter(|n| kinds.contains(&n.kind())).collect()
    }

    /// Nodes at a given depth
    pub fn nodes_at_depth(&self, depth: usize) -> Vec<Node<'_>> {
        self.nodes().filter(|n| n.depth() == depth).collect()
    }

    /// Traced nodes inside the subtree rooted at `id` (excluding `id`)
    pub fn descendants(&self, id: &str) -> Vec<Node<'_>> {
        let root = NodeId::from(id);
        self.nodes()
            .filter(|n| root.is_ancestor_of(n.id().as_str()))
            .collect()
    }

    /// Leaf nodes whose unit can be substituted by a quantized one
    pub fn quantizable_nodes(&self) -> Vec<Node<'_>> {
        self.nodes()
            .filter(|n| n.is_leaf() && n.unit().is_quantizable())
            .collect()
    }

    // ========================================================================
    // Transitive traversal
    // ========================================================================

    /// All leaves executed before this one, nearest first
    pub fn get_predecessors(&self, id: &str) -> Vec<Node<'_>> {
        let mut result = Vec::new();
        let mut visited = FxHashSet::default();
        let mut current = self.producer_map.get(id);

        while let Some(prev) = current {
            if !visited.insert(prev.clone()) {
                break;
            }
            if let Some(node) = self.get_node(prev.as_str()) {
                result.push(node);
            }
            current = self.producer_map.get(prev.as_str());
        }

        result
    }

    /// All leaves executed after this one, nearest first
    pub fn get_successors(&self, id: &str) -> Vec<Node<'_>> {
        let mut result = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect_successors(id, &mut result, &mut visited);
        result
    }

    fn collect_successors<'a>(
        &'a self,
        id: &str,
        result: &mut Vec<Node<'a>>,
        visited: &mut FxHashSet<NodeId>,
    ) {
        if let Some(consumers) = self.consumer_map.get(id) {
            for next in consumers {
                if visited.insert(next.clone()) {
                    if let Some(node) = self.get_node(next.as_str()) {
                        result.push(node);
                    }
                    self.collect_successors(next.as_str(), result, visited);
                }
            }
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Total parameters of the traced model
    pub fn total_params(&self) -> usize {
        self.model.param_count()
    }

    /// Number of quantized units in the traced model
    pub fn quantized_node_count(&self) -> usize {
        self.model.quantized_count()
    }

    /// Parameter storage in bytes
    pub fn storage_bytes(&self) -> usize {
        self.model.storage_bytes()
    }

    /// Output shape of the whole traced model
    pub fn output_shape(&self) -> Vec<usize> {
        self.node_map
            .values()
            .rev()
            .find(|e| e.depth == 1)
            .map(|e| e.output_shape.clone())
            .unwrap_or_else(|| self.input_size.clone())
    }
}
