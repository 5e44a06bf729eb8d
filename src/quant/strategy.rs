//! Quantization strategies
//!
//! A strategy decides which parts of a unit are quantized. Every strategy
//! quantizes weights; they differ in whether biases and output activations
//! follow.
//!
//! | Name | Weights | Bias | Activations |
//! |------|---------|------|-------------|
//! | `weight_only` | yes | no | no |
//! | `weight_bias` | yes | yes | no |
//! | `weight_bias_activation` | yes | yes | yes |

use ndarray::{Array1, ArrayD, Dimension};

use super::repr::QuantParams;
use super::tensor::{Param, QuantizedTensor};
use crate::error::{OptResult, OptimizeError};
use crate::model::{Module, QuantConv2d, QuantLinear};

/// Parts of a unit a strategy quantizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantTargets {
    /// Weight tensors
    pub weights: bool,
    /// Bias vectors
    pub bias: bool,
    /// Output activations (dynamic, per forward pass)
    pub activations: bool,
}

/// Named quantization policy
///
/// Implementations are stateless and shared through a static registry.
pub trait QuantizationStrategy: Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    /// One-line description
    fn description(&self) -> &'static str;

    /// Parts of a unit this strategy quantizes
    fn targets(&self) -> QuantTargets;

    /// Build the quantized equivalent of a single unit
    ///
    /// `id` only labels errors. Containers are not handled here; callers
    /// walk them and quantize each eligible unit.
    fn quantize_module(&self, id: &str, unit: &Module, params: QuantParams) -> OptResult<Module> {
        quantize_unit(id, unit, params, self.targets(), self.name())
    }
}

// ============================================================================
// Built-in strategies
// ============================================================================

/// Quantize weights only
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightOnly;

impl QuantizationStrategy for WeightOnly {
    fn name(&self) -> &'static str {
        "weight_only"
    }

    fn description(&self) -> &'static str {
        "Quantize weights, keep biases and activations in full precision"
    }

    fn targets(&self) -> QuantTargets {
        QuantTargets {
            weights: true,
            bias: false,
            activations: false,
        }
    }
}

/// Quantize weights and biases
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightBias;

impl QuantizationStrategy for WeightBias {
    fn name(&self) -> &'static str {
        "weight_bias"
    }

    fn description(&self) -> &'static str {
        "Quantize weights and biases, keep activations in full precision"
    }

    fn targets(&self) -> QuantTargets {
        QuantTargets {
            weights: true,
            bias: true,
            activations: false,
        }
    }
}

/// Quantize weights, biases and output activations
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightBiasActivation;

impl QuantizationStrategy for WeightBiasActivation {
    fn name(&self) -> &'static str {
        "weight_bias_activation"
    }

    fn description(&self) -> &'static str {
        "Quantize weights and biases, and fake-quantize outputs on every forward pass"
    }

    fn targets(&self) -> QuantTargets {
        QuantTargets {
            weights: true,
            bias: true,
            activations: true,
        }
    }
}

static STRATEGIES: &[&dyn QuantizationStrategy] =
    &[&WeightOnly, &WeightBias, &WeightBiasActivation];

/// All registered strategies in listing order
pub fn strategies() -> &'static [&'static dyn QuantizationStrategy] {
    STRATEGIES
}

/// Names of the registered strategies, in a stable order
pub fn list_quantization_strategies() -> Vec<&'static str> {
    STRATEGIES.iter().map(|s| s.name()).collect()
}

/// Look a strategy up by name
pub fn strategy_by_name(name: &str) -> OptResult<&'static dyn QuantizationStrategy> {
    let wanted = name.trim();
    STRATEGIES
        .iter()
        .copied()
        .find(|s| s.name().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| OptimizeError::UnknownStrategy(name.to_string()))
}

// ============================================================================
// Unit conversion
// ============================================================================

fn quantize_array<D: Dimension>(values: &ndarray::Array<f32, D>, params: QuantParams) -> QuantizedTensor {
    let dyn_values: ArrayD<f32> = values.view().into_dyn().to_owned();
    QuantizedTensor::quantize(&dyn_values, params)
}

fn convert_bias(bias: &Option<Array1<f32>>, quantize: bool, params: QuantParams) -> Option<Param> {
    bias.as_ref().map(|b| {
        if quantize {
            Param::Quantized {
                tensor: quantize_array(b, params),
            }
        } else {
            Param::Float {
                values: b.clone().into_dyn(),
            }
        }
    })
}

/// Convert one `Conv2d`/`Linear` unit according to `targets`
pub fn quantize_unit(
    id: &str,
    unit: &Module,
    params: QuantParams,
    targets: QuantTargets,
    strategy: &str,
) -> OptResult<Module> {
    let activation = targets.activations.then_some(params);

    match unit {
        Module::Conv2d(conv) => Ok(Module::QuantConv2d(QuantConv2d {
            weight: quantize_array(&conv.weight, params),
            bias: convert_bias(&conv.bias, targets.bias, params),
            activation,
            stride: conv.stride,
            padding: conv.padding,
            strategy: strategy.to_string(),
        })),
        Module::Linear(linear) => Ok(Module::QuantLinear(QuantLinear {
            weight: quantize_array(&linear.weight, params),
            bias: convert_bias(&linear.bias, targets.bias, params),
            activation,
            strategy: strategy.to_string(),
        })),
        other if other.is_quantized() => Err(OptimizeError::AlreadyQuantized(id.to_string())),
        other => Err(OptimizeError::NotQuantizable {
            id: id.to_string(),
            kind: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Conv2d, Linear};
    use crate::quant::Representation;
    use ndarray::{arr1, arr2};
    use rstest::rstest;

    fn make_test_linear() -> Module {
        Module::Linear(
            Linear::from_weights(
                arr2(&[[0.5, -0.25], [1.0, 0.125]]),
                Some(arr1(&[0.1, -0.2])),
            )
            .unwrap(),
        )
    }

    fn int8() -> QuantParams {
        QuantParams::new(Representation::Integer, 8).unwrap()
    }

    #[test]
    fn test_list_quantization_strategies() {
        assert_eq!(
            list_quantization_strategies(),
            vec!["weight_only", "weight_bias", "weight_bias_activation"]
        );
        // stable across calls
        assert_eq!(list_quantization_strategies(), list_quantization_strategies());
    }

    #[test]
    fn test_every_listed_name_resolves() {
        for name in list_quantization_strategies() {
            assert_eq!(strategy_by_name(name).unwrap().name(), name);
        }
        assert!(matches!(
            strategy_by_name("per_channel"),
            Err(OptimizeError::UnknownStrategy(_))
        ));
    }

    #[rstest]
    #[case("weight_only", false, false)]
    #[case("weight_bias", true, false)]
    #[case("weight_bias_activation", true, true)]
    fn test_strategy_targets(#[case] name: &str, #[case] bias: bool, #[case] act: bool) {
        let strategy = strategy_by_name(name).unwrap();
        let quantized = strategy
            .quantize_module("fc", &make_test_linear(), int8())
            .unwrap();

        match quantized {
            Module::QuantLinear(q) => {
                assert_eq!(q.bias.as_ref().unwrap().is_quantized(), bias);
                assert_eq!(q.activation.is_some(), act);
                assert_eq!(q.strategy, name);
                assert_eq!(q.weight.shape(), &[2, 2]);
            }
            other => panic!("expected QuantLinear, got {}", other.kind()),
        }
    }

    #[test]
    fn test_quantize_conv_keeps_geometry() {
        let conv = Conv2d::new(3, 8, 3, true).with_stride(2).with_padding(1);
        let quantized = WeightOnly
            .quantize_module("conv", &Module::Conv2d(conv), int8())
            .unwrap();

        match quantized {
            Module::QuantConv2d(q) => {
                assert_eq!(q.stride, 2);
                assert_eq!(q.padding, 1);
                assert_eq!(q.in_channels(), 3);
                assert_eq!(q.out_channels(), 8);
            }
            other => panic!("expected QuantConv2d, got {}", other.kind()),
        }
    }

    #[test]
    fn test_quantize_rejects_other_units() {
        let err = WeightOnly
            .quantize_module("act", &Module::relu(), int8())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::NotQuantizable { kind: "ReLU", .. }));

        let once = WeightOnly
            .quantize_module("fc", &make_test_linear(), int8())
            .unwrap();
        let err = WeightOnly.quantize_module("fc", &once, int8()).unwrap_err();
        assert!(matches!(err, OptimizeError::AlreadyQuantized(_)));
    }
}
