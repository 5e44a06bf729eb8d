//! Layered model representation
//!
//! A [`Model`] owns a root [`Sequential`] container. Containers hold an
//! ordered map of named child [`Module`]s, and any module can be addressed by
//! its dotted path from the root (`"features.0"`).
//!
//! # Example
//!
//! ```ignore
//! use quantgraph::model::{Model, Module, Sequential, Linear};
//!
//! let model = Model::from_sequential(
//!     "mlp",
//!     Sequential::new()
//!         .push("fc1", Module::Linear(Linear::new(784, 128, true)))
//!         .push("relu", Module::relu())
//!         .push("fc2", Module::Linear(Linear::new(128, 10, true))),
//! );
//! assert_eq!(model.output_shape(&[1, 784])?, vec![1, 10]);
//! ```

pub mod layers;
pub mod quantized;
pub mod zoo;

use indexmap::IndexMap;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{OptResult, OptimizeError};

pub use layers::{ActivationKind, BatchNorm2d, Conv2d, Linear, MaxPool2d};
pub use quantized::{QuantConv2d, QuantLinear};

/// Path separator between child names
pub const PATH_SEPARATOR: char = '.';

/// Join a parent path and a child name
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, name)
    }
}

// ============================================================================
// Module
// ============================================================================

/// A container or a computational unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Module {
    /// Ordered container
    Sequential(Sequential),
    /// 2D convolution
    Conv2d(Conv2d),
    /// Fully connected layer
    Linear(Linear),
    /// Batch normalisation
    BatchNorm2d(BatchNorm2d),
    /// Element-wise activation
    Activation {
        /// Which function
        kind: ActivationKind,
    },
    /// Max pooling
    MaxPool2d(MaxPool2d),
    /// Flatten all but the batch dimension
    Flatten,
    /// Inference-mode dropout (identity)
    Dropout {
        /// Drop probability during training
        p: f32,
    },
    /// Convolution with quantized weights
    QuantConv2d(QuantConv2d),
    /// Linear layer with quantized weights
    QuantLinear(QuantLinear),
}

impl Module {
    /// ReLU activation
    pub fn relu() -> Self {
        Module::Activation {
            kind: ActivationKind::ReLU,
        }
    }

    /// Kind name as shown in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Module::Sequential(_) => "Sequential",
            Module::Conv2d(_) => "Conv2d",
            Module::Linear(_) => "Linear",
            Module::BatchNorm2d(_) => "BatchNorm2d",
            Module::Activation { kind } => kind.as_str(),
            Module::MaxPool2d(_) => "MaxPool2d",
            Module::Flatten => "Flatten",
            Module::Dropout { .. } => "Dropout",
            Module::QuantConv2d(_) => "QuantConv2d",
            Module::QuantLinear(_) => "QuantLinear",
        }
    }

    /// Whether this module is a container
    pub fn is_container(&self) -> bool {
        matches!(self, Module::Sequential(_))
    }

    /// Whether this unit has a quantized equivalent
    pub fn is_quantizable(&self) -> bool {
        matches!(self, Module::Conv2d(_) | Module::Linear(_))
    }

    /// Whether this unit is already quantized
    pub fn is_quantized(&self) -> bool {
        matches!(self, Module::QuantConv2d(_) | Module::QuantLinear(_))
    }

    /// Number of trainable parameters (recursive for containers)
    pub fn param_count(&self) -> usize {
        match self {
            Module::Sequential(seq) => seq.param_count(),
            Module::Conv2d(c) => c.param_count(),
            Module::Linear(l) => l.param_count(),
            Module::BatchNorm2d(bn) => bn.param_count(),
            Module::QuantConv2d(q) => q.param_count(),
            Module::QuantLinear(q) => q.param_count(),
            Module::Activation { .. }
            | Module::MaxPool2d(_)
            | Module::Flatten
            | Module::Dropout { .. } => 0,
        }
    }

    /// Parameter storage in bytes (floats at 4 bytes, quantized codes packed)
    pub fn storage_bytes(&self) -> usize {
        match self {
            Module::Sequential(seq) => seq.children.values().map(Module::storage_bytes).sum(),
            Module::QuantConv2d(q) => q.storage_bytes(),
            Module::QuantLinear(q) => q.storage_bytes(),
            other => other.param_count() * 4,
        }
    }

    /// Number of quantized units (recursive for containers)
    pub fn quantized_count(&self) -> usize {
        match self {
            Module::Sequential(seq) => seq.children.values().map(Module::quantized_count).sum(),
            other => usize::from(other.is_quantized()),
        }
    }

    /// Output shape for a given input shape
    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        match self {
            Module::Sequential(seq) => seq.output_shape(input),
            Module::Conv2d(c) => c.output_shape(input),
            Module::Linear(l) => l.output_shape(input),
            Module::BatchNorm2d(bn) => bn.output_shape(input),
            Module::MaxPool2d(p) => p.output_shape(input),
            Module::Flatten => layers::flatten_output_shape(input),
            Module::Activation { .. } | Module::Dropout { .. } => Ok(input.to_vec()),
            Module::QuantConv2d(q) => q.output_shape(input),
            Module::QuantLinear(q) => q.output_shape(input),
        }
    }

    /// Run the unit on a tensor
    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        match self {
            Module::Sequential(seq) => seq.forward(input),
            Module::Conv2d(c) => c.forward(input),
            Module::Linear(l) => l.forward(input),
            Module::BatchNorm2d(bn) => bn.forward(input),
            Module::Activation { kind } => Ok(kind.forward(input)),
            Module::MaxPool2d(p) => p.forward(input),
            Module::Flatten => layers::flatten_forward(input),
            Module::Dropout { .. } => Ok(input.clone()),
            Module::QuantConv2d(q) => q.forward(input),
            Module::QuantLinear(q) => q.forward(input),
        }
    }
}

// ============================================================================
// Sequential
// ============================================================================

/// Ordered container of named modules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequential {
    /// Children in execution order
    pub children: IndexMap<String, Module>,
}

impl Sequential {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child
    pub fn push(mut self, name: impl Into<String>, module: Module) -> Self {
        self.children.insert(name.into(), module);
        self
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Total parameters of all children
    pub fn param_count(&self) -> usize {
        self.children.values().map(Module::param_count).sum()
    }

    /// Output shape after running every child in order
    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        self.children
            .values()
            .try_fold(input.to_vec(), |shape, m| m.output_shape(&shape))
    }

    /// Forward pass through every child in order
    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        let mut x = input.clone();
        for module in self.children.values() {
            x = module.forward(&x)?;
        }
        Ok(x)
    }

    fn lookup(&self, segments: &[&str]) -> Option<&Module> {
        let (first, rest) = segments.split_first()?;
        let child = self.children.get(*first)?;
        if rest.is_empty() {
            return Some(child);
        }
        match child {
            Module::Sequential(seq) => seq.lookup(rest),
            _ => None,
        }
    }

    fn lookup_mut(&mut self, segments: &[&str]) -> Option<&mut Module> {
        let (first, rest) = segments.split_first()?;
        let child = self.children.get_mut(*first)?;
        if rest.is_empty() {
            return Some(child);
        }
        match child {
            Module::Sequential(seq) => seq.lookup_mut(rest),
            _ => None,
        }
    }

    fn collect_unit_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, module) in &self.children {
            let path = join_path(prefix, name);
            match module {
                Module::Sequential(seq) => seq.collect_unit_paths(&path, out),
                _ => out.push(path),
            }
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// A named model owning its module tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model name
    pub name: String,
    /// Top-level modules
    pub root: Sequential,
}

impl Model {
    /// Create an empty model
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Sequential::new(),
        }
    }

    /// Wrap an existing container
    pub fn from_sequential(name: impl Into<String>, root: Sequential) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Get a module by path
    pub fn get(&self, path: &str) -> Option<&Module> {
        if path.is_empty() {
            return None;
        }
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        self.root.lookup(&segments)
    }

    /// Get a mutable module by path
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Module> {
        if path.is_empty() {
            return None;
        }
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        self.root.lookup_mut(&segments)
    }

    /// Check if a path resolves
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Replace the module at `path`, returning the old one
    pub fn replace(&mut self, path: &str, module: Module) -> OptResult<Module> {
        let slot = self
            .get_mut(path)
            .ok_or_else(|| OptimizeError::InvalidPath(path.to_string()))?;
        Ok(std::mem::replace(slot, module))
    }

    /// Paths of every non-container module, in execution order
    pub fn unit_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_unit_paths("", &mut out);
        out
    }

    /// Total trainable parameters
    pub fn param_count(&self) -> usize {
        self.root.param_count()
    }

    /// Number of quantized units
    pub fn quantized_count(&self) -> usize {
        self.root.children.values().map(Module::quantized_count).sum()
    }

    /// Parameter storage in bytes
    pub fn storage_bytes(&self) -> usize {
        self.root.children.values().map(Module::storage_bytes).sum()
    }

    /// Output shape for an input shape (batch dimension included)
    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        self.root.output_shape(input)
    }

    /// Forward pass
    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        self.root.forward(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_model() -> Model {
        Model::from_sequential(
            "test",
            Sequential::new()
                .push(
                    "features",
                    Module::Sequential(
                        Sequential::new()
                            .push("0", Module::Conv2d(Conv2d::new(1, 4, 3, true)))
                            .push("1", Module::relu()),
                    ),
                )
                .push("flatten", Module::Flatten)
                .push("fc", Module::Linear(Linear::new(4 * 6 * 6, 10, true))),
        )
    }

    #[test]
    fn test_path_lookup() {
        let model = make_test_model();

        assert_eq!(model.get("features").unwrap().kind(), "Sequential");
        assert_eq!(model.get("features.0").unwrap().kind(), "Conv2d");
        assert_eq!(model.get("fc").unwrap().kind(), "Linear");
        assert!(model.get("features.2").is_none());
        assert!(model.get("fc.0").is_none()); // fc is not a container
        assert!(model.get("").is_none());
    }

    #[test]
    fn test_replace() {
        let mut model = make_test_model();

        let old = model.replace("features.1", Module::Dropout { p: 0.5 }).unwrap();
        assert_eq!(old.kind(), "ReLU");
        assert_eq!(model.get("features.1").unwrap().kind(), "Dropout");

        let err = model.replace("missing", Module::Flatten).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidPath(_)));
    }

    #[test]
    fn test_unit_paths_order() {
        let model = make_test_model();
        assert_eq!(
            model.unit_paths(),
            vec!["features.0", "features.1", "flatten", "fc"]
        );
    }

    #[test]
    fn test_counts_and_shapes() {
        let model = make_test_model();

        assert_eq!(model.param_count(), (4 * 9 + 4) + (144 * 10 + 10));
        assert_eq!(model.storage_bytes(), model.param_count() * 4);
        assert_eq!(model.quantized_count(), 0);
        assert_eq!(model.output_shape(&[2, 1, 8, 8]).unwrap(), vec![2, 10]);
        assert!(model.output_shape(&[2, 3, 8, 8]).is_err());
    }

    #[test]
    fn test_forward_shape() {
        let model = make_test_model();
        let input = ArrayD::<f32>::ones(ndarray::IxDyn(&[1, 1, 8, 8]));
        let out = model.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 10]);
    }

    #[test]
    fn test_json_roundtrip() {
        let model = make_test_model();
        let text = serde_json::to_string(&model).unwrap();
        let back: Model = serde_json::from_str(&text).unwrap();
        assert_eq!(back, model);
    }
}
