//! Python bindings for quantgraph using PyO3
//!
//! This module provides Python-callable functions for tracing and quantizing
//! models stored as JSON.
//!
//! # Usage from Python
//!
//! ```python
//! import quantgraph
//!
//! print(quantgraph.list_quantization_strategies())
//!
//! # Whole-model quantization
//! result = quantgraph.quantize_model("lenet5.json", "lenet5_int8.json", "weight_only", "int", 8)
//! print(f"Quantized {result.quantized} units ({result.compression_ratio:.1f}x smaller)")
//!
//! # Single node
//! quantgraph.quantize_node("lenet5.json", "out.json", "features.0", "weight_bias", "fxp", 16)
//!
//! print(quantgraph.summarize_model("out.json", [1, 1, 28, 28], depth=2))
//! ```

use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

use crate::error::OptimizeError;
use crate::graph::{get_graph, Device};
use crate::io::{load_model, save_model, validate_model, ModelInfo};
use crate::quant::{self, QuantizeOptions, Representation};

fn to_py_err(err: OptimizeError) -> PyErr {
    match err {
        OptimizeError::Io(_) => PyIOError::new_err(err.to_string()),
        OptimizeError::NodeNotFound(_) => PyKeyError::new_err(err.to_string()),
        OptimizeError::UnknownStrategy(_)
        | OptimizeError::UnknownRepresentation(_)
        | OptimizeError::UnsupportedBitWidth { .. }
        | OptimizeError::UnknownMethod(_)
        | OptimizeError::NotQuantizable { .. }
        | OptimizeError::AlreadyQuantized(_)
        | OptimizeError::InvalidInputShape(_)
        | OptimizeError::InvalidDepth(_)
        | OptimizeError::UnsupportedDevice(_)
        | OptimizeError::InvalidModel(_)
        | OptimizeError::InvalidConfig(_) => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn parse_repr(representation: &str) -> PyResult<Representation> {
    representation.parse().map_err(to_py_err)
}

// ============================================================================
// Python-exposed result classes
// ============================================================================

/// Result of a quantization operation.
#[pyclass(name = "QuantizeResult")]
#[derive(Clone, Debug)]
pub struct PyQuantizeResult {
    /// Strategy used
    #[pyo3(get)]
    pub strategy: String,

    /// Representation and width, e.g. `int8`
    #[pyo3(get)]
    pub params: String,

    /// Number of units quantized
    #[pyo3(get)]
    pub quantized: usize,

    /// Number of units skipped because they were already quantized
    #[pyo3(get)]
    pub skipped: usize,

    /// Number of units left alone by an exclusion
    #[pyo3(get)]
    pub excluded: usize,

    /// Parameter storage before, in bytes
    #[pyo3(get)]
    pub storage_before: usize,

    /// Parameter storage after, in bytes
    #[pyo3(get)]
    pub storage_after: usize,

    /// Output file path
    #[pyo3(get)]
    pub output_path: String,
}

#[pymethods]
impl PyQuantizeResult {
    fn __repr__(&self) -> String {
        format!(
            "QuantizeResult({} {}: quantized={}, skipped={}, storage: {} → {})",
            self.strategy,
            self.params,
            self.quantized,
            self.skipped,
            self.storage_before,
            self.storage_after
        )
    }

    /// Storage reduction factor
    #[getter]
    fn compression_ratio(&self) -> f64 {
        if self.storage_after == 0 {
            1.0
        } else {
            self.storage_before as f64 / self.storage_after as f64
        }
    }
}

/// Model analysis information.
#[pyclass(name = "ModelInfo")]
#[derive(Clone, Debug)]
pub struct PyModelInfo {
    /// Model name
    #[pyo3(get)]
    pub name: String,

    /// Number of units
    #[pyo3(get)]
    pub unit_count: usize,

    /// Trainable parameters
    #[pyo3(get)]
    pub param_count: usize,

    /// Units already quantized
    #[pyo3(get)]
    pub quantized_units: usize,

    /// Unit kind distribution
    #[pyo3(get)]
    pub kinds: HashMap<String, usize>,

    /// Whether model is valid
    #[pyo3(get)]
    pub is_valid: bool,
}

#[pymethods]
impl PyModelInfo {
    fn __repr__(&self) -> String {
        format!(
            "ModelInfo(name={}, units={}, params={}, quantized={}, valid={})",
            self.name, self.unit_count, self.param_count, self.quantized_units, self.is_valid
        )
    }
}

// ============================================================================
// Python-exposed functions
// ============================================================================

/// Names of the available quantization strategies.
#[pyfunction]
fn list_quantization_strategies() -> Vec<&'static str> {
    quant::list_quantization_strategies()
}

/// Quantize every eligible unit of a model file and save the result.
///
/// Raises:
///     IOError: If a file cannot be read/written
///     ValueError: If a name or bit width is invalid
#[pyfunction]
#[pyo3(signature = (input_path, output_path, strategy = "weight_only", representation = "int", bits = 8, exclude = None))]
fn quantize_model(
    input_path: &str,
    output_path: &str,
    strategy: &str,
    representation: &str,
    bits: u8,
    exclude: Option<Vec<String>>,
) -> PyResult<PyQuantizeResult> {
    let mut options = QuantizeOptions::new(strategy, parse_repr(representation)?, bits);
    options.exclude = exclude.unwrap_or_default();

    let mut model = load_model(input_path).map_err(to_py_err)?;
    let report = quant::quantize_with_options(&mut model, &options).map_err(to_py_err)?;
    save_model(&model, output_path).map_err(to_py_err)?;

    Ok(PyQuantizeResult {
        strategy: report.strategy.clone(),
        params: report.params.to_string(),
        quantized: report.quantized.len(),
        skipped: report.skipped.len(),
        excluded: report.excluded.len(),
        storage_before: report.storage_before,
        storage_after: report.storage_after,
        output_path: output_path.to_string(),
    })
}

/// Quantize a single traced node and save the model.
///
/// Returns the kind of the substituted unit.
#[pyfunction]
#[pyo3(signature = (input_path, output_path, node_id, strategy = "weight_only", representation = "int", bits = 8, input_size = vec![1, 1, 28, 28], depth = 3))]
#[allow(clippy::too_many_arguments)]
fn quantize_node(
    input_path: &str,
    output_path: &str,
    node_id: &str,
    strategy: &str,
    representation: &str,
    bits: u8,
    input_size: Vec<usize>,
    depth: usize,
) -> PyResult<String> {
    let repr = parse_repr(representation)?;
    let mut model = load_model(input_path).map_err(to_py_err)?;

    let kind = {
        let mut graph = get_graph(&mut model, &input_size, depth, Device::Cpu).map_err(to_py_err)?;
        let unit =
            quant::quantize_node(node_id, &mut graph, strategy, repr, bits).map_err(to_py_err)?;
        unit.kind().to_string()
    };

    save_model(&model, output_path).map_err(to_py_err)?;
    Ok(kind)
}

/// Trace a model file and return its layer table.
#[pyfunction]
#[pyo3(signature = (model_path, input_size = vec![1, 1, 28, 28], depth = 3))]
fn summarize_model(model_path: &str, input_size: Vec<usize>, depth: usize) -> PyResult<String> {
    let mut model = load_model(model_path).map_err(to_py_err)?;
    let graph = get_graph(&mut model, &input_size, depth, Device::Cpu).map_err(to_py_err)?;
    Ok(graph.summary().to_string())
}

/// Analyze a model file without modifying it.
#[pyfunction]
fn analyze_model(model_path: &str) -> PyResult<PyModelInfo> {
    let model = load_model(model_path).map_err(to_py_err)?;
    let info = ModelInfo::from_model(&model);

    Ok(PyModelInfo {
        name: info.name,
        unit_count: info.unit_count,
        param_count: info.param_count,
        quantized_units: info.quantized_units,
        kinds: info.kinds.into_iter().collect(),
        is_valid: validate_model(&model).is_valid,
    })
}

/// Validate a model file.
///
/// Returns:
///     True if valid, False otherwise
#[pyfunction]
fn validate(model_path: &str) -> PyResult<bool> {
    let model = load_model(model_path).map_err(to_py_err)?;
    Ok(validate_model(&model).is_valid)
}

/// Get the version of this library.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// Module registration
// ============================================================================

/// Python module for model tracing and quantization.
#[pymodule]
#[pyo3(name = "quantgraph")]
fn quantgraph_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Classes
    m.add_class::<PyQuantizeResult>()?;
    m.add_class::<PyModelInfo>()?;

    // Functions
    m.add_function(wrap_pyfunction!(list_quantization_strategies, m)?)?;
    m.add_function(wrap_pyfunction!(quantize_model, m)?)?;
    m.add_function(wrap_pyfunction!(quantize_node, m)?)?;
    m.add_function(wrap_pyfunction!(summarize_model, m)?)?;
    m.add_function(wrap_pyfunction!(analyze_model, m)?)?;
    m.add_function(wrap_pyfunction!(validate, m)?)?;
    m.add_function(wrap_pyfunction!(version, m)?)?;

    // Module metadata
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
