//! Model tracing
//!
//! Walks a model with a concrete input size and records one node per module
//! up to a maximum depth. Expanded containers become non-leaf nodes, every
//! other module is a leaf that runs as a single unit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OptResult, OptimizeError};
use crate::model::{join_path, Model, Module, Sequential};
use crate::tensor::{format_shape, validate_input_size};

use super::context::ModelGraph;
use super::maps::{
    build_children_map, build_consumer_map, build_producer_map, NodeEntry, NodeId, NodeMap,
};

/// Device a trace targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host CPU
    #[default]
    Cpu,
}

impl Device {
    /// Device name
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            _ => Err(OptimizeError::UnsupportedDevice(s.to_string())),
        }
    }
}

/// Trace `model` into a node graph
///
/// `input_size` includes the batch dimension. Top-level modules sit at
/// depth 1; containers shallower than `depth` are expanded.
///
/// The returned graph keeps the model mutably borrowed until it is dropped.
pub fn get_graph<'m>(
    model: &'m mut Model,
    input_size: &[usize],
    depth: usize,
    device: Device,
) -> OptResult<ModelGraph<'m>> {
    if depth == 0 {
        return Err(OptimizeError::InvalidDepth(depth));
    }
    validate_input_size(input_size)?;

    let mut tracer = Tracer::new(depth);
    let output = tracer.trace_container(&model.root, "", None, 1, input_size.to_vec())?;
    let node_map = tracer.nodes;

    let producer_map = build_producer_map(&node_map);
    let consumer_map = build_consumer_map(&node_map, &producer_map);
    let children_map = build_children_map(&node_map);

    info!(
        model = %model.name,
        nodes = node_map.len(),
        leaves = node_map.values().filter(|e| e.is_leaf).count(),
        depth,
        output = %format_shape(&output),
        "traced model graph"
    );

    Ok(ModelGraph {
        model,
        input_size: input_size.to_vec(),
        depth,
        device,
        node_map,
        producer_map,
        consumer_map,
        children_map,
    })
}

/// Prefix shape errors with the path of the node that raised them
fn at_node(id: &NodeId, err: OptimizeError) -> OptimizeError {
    match err {
        OptimizeError::ShapeMismatch(msg) => {
            OptimizeError::ShapeMismatch(format!("at node '{}': {}", id, msg))
        }
        other => other,
    }
}

struct Tracer {
    max_depth: usize,
    nodes: NodeMap,
    // running index per depth, slot 0 unused
    counters: Vec<usize>,
}

impl Tracer {
    fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            nodes: NodeMap::new(),
            counters: Vec::new(),
        }
    }

    // grows with the depth actually reached, not the requested limit
    fn next_index(&mut self, depth: usize) -> usize {
        if self.counters.len() <= depth {
            self.counters.resize(depth + 1, 0);
        }
        self.counters[depth] += 1;
        self.counters[depth]
    }

    fn trace_container(
        &mut self,
        seq: &Sequential,
        prefix: &str,
        parent: Option<&NodeId>,
        depth: usize,
        input: Vec<usize>,
    ) -> OptResult<Vec<usize>> {
        let mut shape = input;

        for (name, module) in &seq.children {
            let id = NodeId::new(join_path(prefix, name));
            let index = self.next_index(depth);

            let expand = match module {
                Module::Sequential(_) => depth < self.max_depth,
                _ => false,
            };

            // parents are inserted before their children to keep trace order
            self.nodes.insert(
                id.clone(),
                NodeEntry {
                    id: id.clone(),
                    kind: module.kind(),
                    depth,
                    index,
                    parent: parent.cloned(),
                    input_shape: shape.clone(),
                    output_shape: Vec::new(),
                    num_params: module.param_count(),
                    is_leaf: !expand,
                    quantized: module.quantized_count() > 0,
                },
            );

            let output = match module {
                Module::Sequential(child) if expand => {
                    self.trace_container(child, id.as_str(), Some(&id), depth + 1, shape)?
                }
                _ => module.output_shape(&shape).map_err(|e| at_node(&id, e))?,
            };

            if let Some(entry) = self.nodes.get_mut(&id) {
                entry.output_shape = output.clone();
                debug!(
                    node = %entry.id,
                    kind = entry.kind,
                    depth_index = %entry.depth_index(),
                    output = %format_shape(&entry.output_shape),
                    params = entry.num_params,
                    "traced node"
                );
            }
            shape = output;
        }

        Ok(shape)
    }
}
