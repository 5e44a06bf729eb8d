//! Quantization
//!
//! - Representation kinds and bit widths (`repr`)
//! - Quantized tensor storage (`tensor`)
//! - Named strategies (`strategy`)
//! - Whole-model and single-node quantization (`quantizer`)

pub mod quantizer;
pub mod repr;
pub mod strategy;
pub mod tensor;

pub use quantizer::{quantize, quantize_node, quantize_with_options, QuantizeOptions, QuantizeReport};
pub use repr::{QuantParams, Representation};
pub use strategy::{
    list_quantization_strategies, strategies, strategy_by_name, QuantTargets,
    QuantizationStrategy, WeightBias, WeightBiasActivation, WeightOnly,
};
pub use tensor::{fake_quantize, Param, QuantizedTensor};
