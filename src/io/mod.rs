//! Model I/O module
//!
//! This module provides functions for loading, saving, and validating models
//! stored as JSON.
//!
//! # Example
//!
//! ```ignore
//! use quantgraph::io::{load_model, save_model, quantize_file};
//! use quantgraph::quant::{QuantizeOptions, Representation};
//!
//! // Load and save
//! let model = load_model("lenet5.json")?;
//! save_model(&model, "copy.json")?;
//!
//! // One-shot quantization
//! let options = QuantizeOptions::new("weight_only", Representation::Integer, 8);
//! let report = quantize_file("lenet5.json", "lenet5_int8.json", &options)?;
//! println!("{}", report);
//! ```

pub mod reader;
pub mod validation;
pub mod writer;

// Re-exports
pub use reader::{get_model_info, load_model, load_model_from_str, ModelInfo};
pub use validation::{check_model, validate_model, validate_model_with_input, ValidationResult};
pub use writer::{model_size, model_to_string, save_model, save_model_with_stats, SaveStats};

use std::path::Path;

use crate::error::OptResult;
use crate::quant::{quantize_with_options, QuantizeOptions, QuantizeReport};

/// Quantize a model file and save the result to another file
///
/// The input is validated before quantization and the output after.
pub fn quantize_file<P1: AsRef<Path>, P2: AsRef<Path>>(
    input: P1,
    output: P2,
    options: &QuantizeOptions,
) -> OptResult<QuantizeReport> {
    let mut model = load_model(input)?;
    check_model(&model)?;

    let report = quantize_with_options(&mut model, options)?;

    check_model(&model)?;
    save_model(&model, output)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::zoo::mlp;
    use crate::quant::Representation;

    #[test]
    fn test_quantize_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mlp.json");
        let output = dir.path().join("mlp_fxp8.json");
        save_model(&mlp(&[16, 8, 4], 0).unwrap(), &input).unwrap();

        let options = QuantizeOptions::new("weight_bias", Representation::FixedPoint, 8);
        let report = quantize_file(&input, &output, &options).unwrap();
        assert_eq!(report.quantized, vec!["fc1".to_string(), "fc2".to_string()]);

        let info = get_model_info(&output).unwrap();
        assert_eq!(info.quantized_units, 2);
        assert_eq!(info.kinds["QuantLinear"], 2);
    }

    #[test]
    fn test_quantize_missing_file() {
        let options = QuantizeOptions::new("weight_only", Representation::Integer, 8);
        assert!(quantize_file("/nonexistent/in.json", "/tmp/out.json", &options).is_err());
    }
}
