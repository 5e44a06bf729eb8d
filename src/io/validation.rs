//! Model validation
//!
//! Structural checks for models loaded from disk: naming, parameter
//! consistency, quantized tensor sanity and (optionally) shape flow.

use crate::error::{OptResult, OptimizeError};
use crate::model::{join_path, Model, Module, Sequential, PATH_SEPARATOR};
use crate::quant::{Param, QuantParams, QuantizedTensor};
use crate::tensor::validate_input_size;

/// Validation result with detailed issues
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the model is valid
    pub is_valid: bool,
    /// List of errors (critical issues)
    pub errors: Vec<String>,
    /// List of warnings (non-critical issues)
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.is_valid = false;
    }

    /// Add a warning
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merge with another result
    pub fn merge(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validate a model
///
/// Performs structural validation including:
/// - Child names (non-empty, no path separator)
/// - Parameter shapes of every unit
/// - Quantized tensors (bit width, code range, scale)
pub fn validate_model(model: &Model) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if model.name.trim().is_empty() {
        result.add_warning("Model has an empty name");
    }
    if model.root.is_empty() {
        result.add_warning("Model is empty (no modules)");
    }

    validate_container(&model.root, "", &mut result);
    result
}

/// Validate a model and check that `input_size` flows through it
pub fn validate_model_with_input(model: &Model, input_size: &[usize]) -> ValidationResult {
    let mut result = validate_model(model);

    if let Err(e) = validate_input_size(input_size) {
        result.add_error(e.to_string());
        return result;
    }
    if let Err(e) = model.output_shape(input_size) {
        result.add_error(e.to_string());
    }
    result
}

fn validate_container(seq: &Sequential, prefix: &str, result: &mut ValidationResult) {
    for (name, module) in &seq.children {
        let path = join_path(prefix, name);

        if name.is_empty() {
            result.add_error(format!("Empty child name under '{}'", prefix));
        } else if name.contains(PATH_SEPARATOR) {
            result.add_error(format!(
                "Child name '{}' contains the path separator '{}'",
                path, PATH_SEPARATOR
            ));
        }

        match module {
            Module::Sequential(inner) => {
                if inner.is_empty() {
                    result.add_warning(format!("Container '{}' is empty", path));
                }
                validate_container(inner, &path, result);
            }
            unit => validate_unit(unit, &path, result),
        }
    }
}

fn validate_unit(unit: &Module, path: &str, result: &mut ValidationResult) {
    match unit {
        Module::Conv2d(conv) => {
            if conv.stride == 0 {
                result.add_error(format!("Conv2d '{}' has zero stride", path));
            }
            if let Some(b) = &conv.bias {
                if b.len() != conv.out_channels() {
                    result.add_error(format!(
                        "Conv2d '{}' bias has {} entries for {} output channels",
                        path,
                        b.len(),
                        conv.out_channels()
                    ));
                }
            }
        }
        Module::Linear(linear) => {
            if let Some(b) = &linear.bias {
                if b.len() != linear.out_features() {
                    result.add_error(format!(
                        "Linear '{}' bias has {} entries for {} outputs",
                        path,
                        b.len(),
                        linear.out_features()
                    ));
                }
            }
        }
        Module::BatchNorm2d(bn) => {
            let c = bn.channels();
            if bn.beta.len() != c || bn.running_mean.len() != c || bn.running_var.len() != c {
                result.add_error(format!(
                    "BatchNorm2d '{}' has inconsistent channel vectors",
                    path
                ));
            }
            if bn.eps <= 0.0 {
                result.add_warning(format!("BatchNorm2d '{}' has non-positive eps", path));
            }
        }
        Module::MaxPool2d(pool) => {
            if pool.kernel == 0 || pool.stride == 0 {
                result.add_error(format!("MaxPool2d '{}' has zero kernel or stride", path));
            }
        }
        Module::Dropout { p } => {
            if !(0.0..1.0).contains(p) {
                result.add_warning(format!("Dropout '{}' has probability {}", path, p));
            }
        }
        Module::QuantConv2d(q) => {
            if q.weight.shape().len() != 4 {
                result.add_error(format!("QuantConv2d '{}' weight is not rank 4", path));
            }
            if q.stride == 0 {
                result.add_error(format!("QuantConv2d '{}' has zero stride", path));
            }
            validate_quantized(&q.weight, &format!("{} weight", path), result);
            validate_bias(&q.bias, q.out_channels(), path, result);
            validate_activation(q.activation, path, result);
        }
        Module::QuantLinear(q) => {
            if q.weight.shape().len() != 2 {
                result.add_error(format!("QuantLinear '{}' weight is not rank 2", path));
            }
            validate_quantized(&q.weight, &format!("{} weight", path), result);
            validate_bias(&q.bias, q.out_features(), path, result);
            validate_activation(q.activation, path, result);
        }
        Module::Activation { .. } | Module::Flatten | Module::Sequential(_) => {}
    }
}

fn validate_bias(bias: &Option<Param>, outputs: usize, path: &str, result: &mut ValidationResult) {
    if let Some(b) = bias {
        if b.len() != outputs {
            result.add_error(format!(
                "'{}' bias has {} entries for {} outputs",
                path,
                b.len(),
                outputs
            ));
        }
        if let Param::Quantized { tensor } = b {
            validate_quantized(tensor, &format!("{} bias", path), result);
        }
    }
}

fn validate_activation(activation: Option<QuantParams>, path: &str, result: &mut ValidationResult) {
    if let Some(params) = activation {
        if let Err(e) = QuantParams::new(params.repr(), params.bits()) {
            result.add_error(format!("'{}' activation: {}", path, e));
        }
    }
}

fn validate_quantized(tensor: &QuantizedTensor, what: &str, result: &mut ValidationResult) {
    let params = tensor.params;
    if let Err(e) = QuantParams::new(params.repr(), params.bits()) {
        result.add_error(format!("{}: {}", what, e));
        return;
    }
    if !tensor.scale.is_finite() || tensor.scale <= 0.0 {
        result.add_error(format!("{}: invalid scale {}", what, tensor.scale));
    }

    let (lo, hi) = (params.code_min(), params.code_max());
    let out_of_range = tensor
        .codes
        .iter()
        .filter(|&&q| (q as i64) < lo || (q as i64) > hi)
        .count();
    if out_of_range > 0 {
        result.add_error(format!(
            "{}: {} codes outside [{}, {}] for {}",
            what, out_of_range, lo, hi, params
        ));
    }
}

/// Quick validation that returns an error if invalid
pub fn check_model(model: &Model) -> OptResult<()> {
    let result = validate_model(model);
    if result.is_valid {
        Ok(())
    } else {
        Err(OptimizeError::InvalidModel(result.errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::zoo::lenet5;
    use crate::model::{Linear, Sequential};
    use crate::quant::{quantize, Representation};
    use ndarray::{arr1, Array2, IxDyn};

    #[test]
    fn test_reference_models_are_valid() {
        let result = validate_model(&lenet5(0));
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());

        let quantized = quantize(lenet5(0), "weight_bias_activation", Representation::FixedPoint, 8)
            .unwrap();
        assert!(check_model(&quantized).is_ok());
    }

    #[test]
    fn test_bad_names_and_bias() {
        let linear = Linear {
            weight: Array2::zeros((4, 3)),
            bias: Some(arr1(&[0.0, 0.0])),
        };
        let model = Model::from_sequential(
            "bad",
            Sequential::new()
                .push("a.b", Module::relu())
                .push("fc", Module::Linear(linear)),
        );

        let result = validate_model(&model);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert!(check_model(&model).is_err());
    }

    #[test]
    fn test_out_of_range_codes() {
        let mut model = quantize(lenet5(0), "weight_only", Representation::Integer, 4).unwrap();
        if let Some(Module::QuantLinear(q)) = model.get_mut("classifier.4") {
            q.weight.codes[IxDyn(&[0, 0])] = 100;
        }

        let result = validate_model(&model);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("classifier.4 weight"));
    }

    #[test]
    fn test_validate_with_input() {
        let model = lenet5(0);
        assert!(validate_model_with_input(&model, &[1, 1, 28, 28]).is_valid);

        let result = validate_model_with_input(&model, &[1, 1, 10, 10]);
        assert!(!result.is_valid);

        let result = validate_model_with_input(&model, &[]);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_empty_model_warns() {
        let result = validate_model(&Model::new("empty"));
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
