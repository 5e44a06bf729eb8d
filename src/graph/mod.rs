//! Graph tracing and manipulation for layered models
//!
//! This module provides the infrastructure for working with a model as a
//! graph of nodes:
//!
//! - [`get_graph`]: traces a model with an input size and a depth
//! - [`ModelGraph`]: central structure with O(1) lookups by node id
//! - [`maps`]: type definitions and builders for graph maps
//!
//! # Example
//!
//! ```ignore
//! use quantgraph::graph::{get_graph, Device};
//! use quantgraph::model::zoo::lenet5;
//!
//! let mut model = lenet5(0);
//! let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu)?;
//!
//! // Find nodes
//! let conv = graph.find_node_by_id("features.0")?;
//! let linears = graph.find_nodes_by_kind("Linear");
//!
//! // Traverse execution order
//! let prev = graph.get_prev_node("classifier.0");
//! let next = graph.get_next_nodes("flatten");
//!
//! println!("{}", graph.summary());
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `node_map` | node id → NodeEntry (trace order preserved) |
//! | `producer_map` | leaf id → previous leaf id |
//! | `consumer_map` | leaf id → next leaf ids |
//! | `children_map` | container id → traced child ids |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod summary;
pub mod trace;

// Re-export main types
pub use context::{ModelGraph, Node};
pub use maps::{ChildrenMap, ConsumerMap, NodeEntry, NodeId, NodeMap, ProducerMap};
pub use summary::{GraphSummary, SummaryRow};
pub use trace::{get_graph, Device};
