//! Error types for quantgraph
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for tracing, substitution and quantization
#[derive(Error, Debug)]
pub enum OptimizeError {
    /// Strategy name is not registered
    #[error("Unknown quantization strategy: {0}")]
    UnknownStrategy(String),

    /// Representation kind could not be parsed
    #[error("Unknown representation kind: {0}")]
    UnknownRepresentation(String),

    /// Bit width outside the range allowed for a representation
    #[error("Unsupported bit width {bits} for {repr}, expected {min}..={max}")]
    UnsupportedBitWidth {
        /// Representation name
        repr: &'static str,
        /// Requested width
        bits: u8,
        /// Minimum supported
        min: u8,
        /// Maximum supported
        max: u8,
    },

    /// Optimization method could not be parsed
    #[error("Unknown optimization method: {0}")]
    UnknownMethod(String),

    /// Recognised but not implemented
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// No node with this identifier in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Unit kind has no quantized equivalent
    #[error("Node '{id}' of kind {kind} cannot be quantized")]
    NotQuantizable {
        /// Node identifier
        id: String,
        /// Unit kind
        kind: &'static str,
    },

    /// Unit was already substituted by a quantized one
    #[error("Node '{0}' is already quantized")]
    AlreadyQuantized(String),

    /// Module path does not resolve inside the model
    #[error("Invalid module path: {0}")]
    InvalidPath(String),

    /// Tensor shapes are inconsistent
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Input size given to the tracer is unusable
    #[error("Invalid input shape: {0}")]
    InvalidInputShape(String),

    /// Traversal depth must be at least one
    #[error("Invalid traversal depth: {0}, expected >= 1")]
    InvalidDepth(usize),

    /// Only CPU tracing is available
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Invalid model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for quantgraph operations
pub type OptResult<T> = Result<T, OptimizeError>;
