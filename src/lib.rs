//! # quantgraph
//!
//! Graph tracing and node-level quantization for layered neural network
//! models.
//!
//! This crate traces a model into a graph of nodes with stable identifiers,
//! and substitutes individual nodes (or every eligible unit) with quantized
//! equivalents in place.
//!
//! ## Features
//!
//! - **Tracing**: `get_graph` walks a model with an input size and a depth
//! - **Node substitution**: `quantize_node` swaps one unit inside the live model
//! - **Whole-model quantization**: `quantize` with named strategies
//! - **Pipelines**: `build_strategy` / `optimize` over `Method|Method` strings
//!
//! ## Example
//!
//! ```ignore
//! use quantgraph::prelude::*;
//!
//! let mut model = load_model("lenet5.json")?;
//! let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu)?;
//! quantize_node("features.0", &mut graph, "weight_only", Representation::Integer, 8)?;
//! println!("{}", graph.summary());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod config;
pub mod error;
pub mod graph;
pub mod io;
pub mod model;
pub mod optimize;
pub mod quant;
pub mod tensor;
pub mod traits;

// Python bindings (only with python feature)
#[cfg(feature = "python")]
pub mod python;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use quantgraph::prelude::*`
pub mod prelude {
    pub use crate::config::QuantConfig;
    pub use crate::error::{OptResult, OptimizeError};
    pub use crate::graph::{get_graph, Device, GraphSummary, ModelGraph, Node, NodeId};
    pub use crate::io::{check_model, load_model, quantize_file, save_model, ModelInfo};
    pub use crate::model::{Model, Module, Sequential};
    pub use crate::optimize::{build_strategy, optimize, Method, StrategyParams};
    pub use crate::quant::{
        list_quantization_strategies, quantize, quantize_node, quantize_with_options,
        QuantParams, QuantizationStrategy, QuantizeOptions, QuantizeReport, Representation,
    };
    pub use crate::traits::{ModelTransform, TransformChain};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{OptResult, OptimizeError};
pub use graph::{get_graph, Device, ModelGraph, Node};
pub use model::{Model, Module};
pub use optimize::{build_strategy, optimize};
pub use quant::{list_quantization_strategies, quantize, quantize_node, Representation};
pub use traits::ModelTransform;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
