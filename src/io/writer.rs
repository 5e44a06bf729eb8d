//! Model writer
//!
//! Save models as JSON files or strings.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{OptResult, OptimizeError};
use crate::model::Model;

/// Save a model to a JSON file
///
/// # Example
///
/// ```ignore
/// use quantgraph::io::save_model;
///
/// save_model(&model, "lenet5_int8.json")?;
/// ```
pub fn save_model<P: AsRef<Path>>(model: &Model, path: P) -> OptResult<()> {
    save_model_with_stats(model, path).map(|_| ())
}

/// Encode a model as JSON text
pub fn model_to_string(model: &Model) -> OptResult<String> {
    Ok(serde_json::to_string(model)?)
}

/// Size of the encoded model in bytes
pub fn model_size(model: &Model) -> OptResult<usize> {
    Ok(serde_json::to_vec(model)?.len())
}

/// Statistics of a saved model
#[derive(Debug, Clone)]
pub struct SaveStats {
    /// Size in bytes
    pub size_bytes: usize,
    /// Number of non-container units
    pub unit_count: usize,
    /// Number of quantized units
    pub quantized_units: usize,
}

/// Save model and return statistics
pub fn save_model_with_stats<P: AsRef<Path>>(model: &Model, path: P) -> OptResult<SaveStats> {
    let bytes = serde_json::to_vec(model)?;
    let stats = SaveStats {
        size_bytes: bytes.len(),
        unit_count: model.unit_paths().len(),
        quantized_units: model.quantized_count(),
    };

    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        OptimizeError::InvalidModel(format!("Failed to create file '{}': {}", path.display(), e))
    })?;

    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes).map_err(|e| {
        OptimizeError::InvalidModel(format!("Failed to write file '{}': {}", path.display(), e))
    })?;
    writer.flush().map_err(|e| {
        OptimizeError::InvalidModel(format!("Failed to flush file '{}': {}", path.display(), e))
    })?;

    Ok(stats)
}
