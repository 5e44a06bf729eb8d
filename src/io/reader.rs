//! Model reader
//!
//! Load models from JSON files or strings.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{OptResult, OptimizeError};
use crate::model::{Model, Module, Sequential};

/// Load a model from a JSON file
///
/// # Example
///
/// ```ignore
/// use quantgraph::io::load_model;
///
/// let model = load_model("lenet5.json")?;
/// println!("{} parameters", model.param_count());
/// ```
pub fn load_model<P: AsRef<Path>>(path: P) -> OptResult<Model> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|e| {
        OptimizeError::InvalidModel(format!("Failed to open file '{}': {}", path.display(), e))
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        OptimizeError::InvalidModel(format!("Failed to decode model '{}': {}", path.display(), e))
    })
}

/// Load a model from JSON text
pub fn load_model_from_str(text: &str) -> OptResult<Model> {
    serde_json::from_str(text)
        .map_err(|e| OptimizeError::InvalidModel(format!("Failed to decode model: {}", e)))
}

/// Model metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Number of non-container units
    pub unit_count: usize,
    /// Number of nested containers
    pub container_count: usize,
    /// Deepest nesting level (top-level units are at 1)
    pub max_depth: usize,
    /// Trainable parameters
    pub param_count: usize,
    /// Units already quantized
    pub quantized_units: usize,
    /// Parameter storage in bytes
    pub storage_bytes: usize,
    /// Unit count per kind
    pub kinds: BTreeMap<String, usize>,
}

impl ModelInfo {
    /// Extract metadata from a model
    pub fn from_model(model: &Model) -> Self {
        let mut info = Self {
            name: model.name.clone(),
            unit_count: 0,
            container_count: 0,
            max_depth: 0,
            param_count: model.param_count(),
            quantized_units: model.quantized_count(),
            storage_bytes: model.storage_bytes(),
            kinds: BTreeMap::new(),
        };
        info.visit(&model.root, 1);
        info
    }

    fn visit(&mut self, seq: &Sequential, depth: usize) {
        for module in seq.children.values() {
            self.max_depth = self.max_depth.max(depth);
            match module {
                Module::Sequential(inner) => {
                    self.container_count += 1;
                    self.visit(inner, depth + 1);
                }
                unit => {
                    self.unit_count += 1;
                    *self.kinds.entry(unit.kind().to_string()).or_insert(0) += 1;
                }
            }
        }
    }
}

/// Get model information from a file
pub fn get_model_info<P: AsRef<Path>>(path: P) -> OptResult<ModelInfo> {
    let model = load_model(path)?;
    Ok(ModelInfo::from_model(&model))
}
