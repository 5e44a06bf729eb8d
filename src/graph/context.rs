//! Graph context for traced models
//!
//! `ModelGraph` is the central structure for working with a traced model.
//! It maintains efficient maps for node lookup and traversal, and holds the
//! live model it was traced from so substitutions land in place.

use crate::error::{OptResult, OptimizeError};
use crate::model::{Model, Module};

use super::maps::{ChildrenMap, ConsumerMap, NodeEntry, NodeId, NodeMap, ProducerMap};
use super::trace::Device;

/// A traced node: one module of the model plus its trace metadata
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    entry: &'a NodeEntry,
    unit: &'a Module,
}

impl<'a> Node<'a> {
    /// Node identifier
    pub fn id(&self) -> &'a NodeId {
        &self.entry.id
    }

    /// The wrapped module
    pub fn unit(&self) -> &'a Module {
        self.unit
    }

    /// Trace metadata
    pub fn entry(&self) -> &'a NodeEntry {
        self.entry
    }

    /// Unit kind
    pub fn kind(&self) -> &'static str {
        self.entry.kind
    }

    /// Nesting depth
    pub fn depth(&self) -> usize {
        self.entry.depth
    }

    /// Shape entering the unit
    pub fn input_shape(&self) -> &'a [usize] {
        &self.entry.input_shape
    }

    /// Shape leaving the unit
    pub fn output_shape(&self) -> &'a [usize] {
        &self.entry.output_shape
    }

    /// Whether the node runs as one unit in the trace
    pub fn is_leaf(&self) -> bool {
        self.entry.is_leaf
    }

    /// Whether the node is (or contains) a quantized unit
    pub fn is_quantized(&self) -> bool {
        self.entry.quantized
    }
}

/// Traced graph over a live model
///
/// The graph mutably borrows the model for its whole lifetime. Nothing else
/// can mutate the model while the graph exists, so the identifier → node
/// mapping cannot go stale; substitutions go through
/// [`ModelGraph::replace_unit`].
#[derive(Debug)]
pub struct ModelGraph<'m> {
    pub(crate) model: &'m mut Model,

    /// Input size the graph was traced with (batch dimension included)
    pub input_size: Vec<usize>,

    /// Maximum traversal depth
    pub depth: usize,

    /// Device the trace targets
    pub device: Device,

    /// Maps node id → NodeEntry (preserves trace order)
    pub node_map: NodeMap,

    /// Maps leaf id → previous leaf id
    pub producer_map: ProducerMap,

    /// Maps leaf id → next leaf ids
    pub consumer_map: ConsumerMap,

    /// Maps container id → child ids
    pub children_map: ChildrenMap,
}

impl<'m> ModelGraph<'m> {
    /// The live model
    pub fn model(&self) -> &Model {
        &*self.model
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id
    pub fn get_node(&self, id: &str) -> Option<Node<'_>> {
        let entry = self.node_map.get(id)?;
        let unit = self.model.get(entry.id.as_str())?;
        Some(Node { entry, unit })
    }

    /// Find a node by id, failing with `NodeNotFound`
    pub fn find_node_by_id(&self, id: &str) -> OptResult<Node<'_>> {
        self.get_node(id)
            .ok_or_else(|| OptimizeError::NodeNotFound(id.to_string()))
    }

    /// Get the trace entry for a node
    pub fn get_entry(&self, id: &str) -> Option<&NodeEntry> {
        self.node_map.get(id)
    }

    /// Check if a node exists
    pub fn has_node(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.node_map.len()
    }

    /// Iterate over all nodes in trace order
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> {
        self.node_map.values().filter_map(|entry| {
            self.model
                .get(entry.id.as_str())
                .map(|unit| Node { entry, unit })
        })
    }

    /// Iterate over node ids in trace order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.node_map.keys()
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Get the leaf that feeds this leaf
    pub fn get_prev_node(&self, id: &str) -> Option<Node<'_>> {
        self.producer_map
            .get(id)
            .and_then(|prev| self.get_node(prev.as_str()))
    }

    /// Get the leaves fed by this leaf
    pub fn get_next_nodes(&self, id: &str) -> Vec<Node<'_>> {
        self.consumer_map
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|next| self.get_node(next.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the traced children of a container node
    pub fn children(&self, id: &str) -> Vec<Node<'_>> {
        self.children_map
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| self.get_node(child.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the enclosing traced container
    pub fn get_parent(&self, id: &str) -> Option<Node<'_>> {
        self.node_map
            .get(id)
            .and_then(|e| e.parent.as_ref())
            .and_then(|p| self.get_node(p.as_str()))
    }
}
