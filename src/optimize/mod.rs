//! Optimization pipeline
//!
//! Builds model transforms from method and strategy strings. Methods can be
//! chained with `|` (`"Prune|Quantize"`); the strategy string then carries
//! one `|`-separated entry per method.
//!
//! # Example
//!
//! ```ignore
//! use quantgraph::optimize::{optimize, StrategyParams};
//!
//! let params = StrategyParams::default().with_bits(4);
//! let model = optimize(model, "Quantize", "weight_bias", &params)?;
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{OptResult, OptimizeError};
use crate::model::Model;
use crate::quant::{quantize_with_options, strategy_by_name, QuantParams, QuantizeOptions, Representation};
use crate::traits::{ModelTransform, TransformChain};

/// Separator between chained methods and strategies
pub const CHAIN_SEPARATOR: char = '|';

/// Optimization method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Quantize weights (and optionally biases and activations)
    Quantize,
    /// Remove weights; recognised but not available
    Prune,
}

impl Method {
    /// Method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Quantize => "Quantize",
            Method::Prune => "Prune",
        }
    }

    /// Parse a `|`-chained method string
    pub fn parse_chain(text: &str) -> OptResult<Vec<Method>> {
        text.split(CHAIN_SEPARATOR).map(str::parse).collect()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quantize" | "quantization" => Ok(Method::Quantize),
            "prune" | "pruning" => Ok(Method::Prune),
            _ => Err(OptimizeError::UnknownMethod(s.trim().to_string())),
        }
    }
}

fn default_bits() -> u8 {
    8
}

/// Parameters shared by every strategy in a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Representation kind
    #[serde(default = "default_representation")]
    pub representation: Representation,
    /// Bit width
    #[serde(default = "default_bits")]
    pub bits: u8,
    /// Path prefixes left untouched
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_representation() -> Representation {
    Representation::Integer
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            representation: default_representation(),
            bits: default_bits(),
            exclude: Vec::new(),
        }
    }
}

impl StrategyParams {
    /// Set the representation kind
    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Set the bit width
    pub fn with_bits(mut self, bits: u8) -> Self {
        self.bits = bits;
        self
    }

    /// Leave a path prefix untouched
    pub fn with_exclude(mut self, prefix: impl Into<String>) -> Self {
        self.exclude.push(prefix.into());
        self
    }
}

/// Whole-model quantization as a pipeline step
#[derive(Debug, Clone)]
pub struct QuantizeTransform {
    options: QuantizeOptions,
}

impl QuantizeTransform {
    /// Validate the strategy and width, then wrap them
    pub fn new(strategy: &str, params: &StrategyParams) -> OptResult<Self> {
        let strategy = strategy_by_name(strategy)?;
        QuantParams::new(params.representation, params.bits)?;

        Ok(Self {
            options: QuantizeOptions {
                strategy: strategy.name().to_string(),
                representation: params.representation,
                bits: params.bits,
                exclude: params.exclude.clone(),
            },
        })
    }

    /// Options the transform runs with
    pub fn options(&self) -> &QuantizeOptions {
        &self.options
    }
}

impl ModelTransform for QuantizeTransform {
    fn name(&self) -> &str {
        "quantize"
    }

    fn transform(&self, mut model: Model) -> OptResult<Model> {
        let report = quantize_with_options(&mut model, &self.options)?;
        info!("{}", report);
        Ok(model)
    }
}

fn build_single(method: Method, strategy: &str, params: &StrategyParams) -> OptResult<Box<dyn ModelTransform>> {
    match method {
        Method::Quantize => Ok(Box::new(QuantizeTransform::new(strategy, params)?)),
        Method::Prune => Err(OptimizeError::Unsupported(format!(
            "pruning strategy '{}' is not available",
            strategy.trim()
        ))),
    }
}

/// Build a transform from a method string and a strategy string
///
/// Everything is validated before anything runs: method names, strategy
/// names, the representation and the bit width.
pub fn build_strategy(
    method: &str,
    strategy: &str,
    params: &StrategyParams,
) -> OptResult<Box<dyn ModelTransform>> {
    let methods = Method::parse_chain(method)?;
    let strategies: Vec<&str> = strategy.split(CHAIN_SEPARATOR).map(str::trim).collect();

    if methods.len() != strategies.len() {
        return Err(OptimizeError::InvalidConfig(format!(
            "{} method(s) in '{}' but {} strategy entries in '{}'",
            methods.len(),
            method,
            strategies.len(),
            strategy
        )));
    }

    let mut steps = Vec::with_capacity(methods.len());
    for (m, s) in methods.into_iter().zip(strategies) {
        steps.push(build_single(m, s, params)?);
    }

    if steps.len() == 1 {
        if let Some(step) = steps.pop() {
            return Ok(step);
        }
    }
    Ok(Box::new(
        steps
            .into_iter()
            .fold(TransformChain::new(), TransformChain::add_boxed),
    ))
}

/// Build and run a pipeline in one call
pub fn optimize(
    model: Model,
    method: &str,
    strategy: &str,
    params: &StrategyParams,
) -> OptResult<Model> {
    let transform = build_strategy(method, strategy, params)?;
    transform.transform(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::zoo::lenet5;
    use rstest::rstest;

    #[rstest]
    #[case("Quantize", Method::Quantize)]
    #[case("quantize", Method::Quantize)]
    #[case(" Prune ", Method::Prune)]
    fn test_method_parse(#[case] text: &str, #[case] expected: Method) {
        assert_eq!(text.parse::<Method>().unwrap(), expected);
    }

    #[test]
    fn test_method_chain() {
        assert_eq!(
            Method::parse_chain("Prune|Quantize").unwrap(),
            vec![Method::Prune, Method::Quantize]
        );
        assert!(matches!(
            Method::parse_chain("Quantize|Distill"),
            Err(OptimizeError::UnknownMethod(m)) if m == "Distill"
        ));
    }

    #[test]
    fn test_build_quantize() {
        let transform = build_strategy("Quantize", "weight_only", &StrategyParams::default()).unwrap();
        assert_eq!(transform.name(), "quantize");

        let model = transform.transform(lenet5(0)).unwrap();
        assert_eq!(model.quantized_count(), 5);
    }

    #[test]
    fn test_prune_is_unsupported() {
        let err = build_strategy("Prune|Quantize", "l1|weight_only", &StrategyParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, OptimizeError::Unsupported(_)));
    }

    #[test]
    fn test_strategy_count_mismatch() {
        let err = build_strategy("Prune|Quantize", "weight_only", &StrategyParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, OptimizeError::InvalidConfig(_)));
    }

    #[test]
    fn test_validation_happens_up_front() {
        let params = StrategyParams::default().with_bits(1);
        let err = build_strategy("Quantize", "weight_only", &params).err().unwrap();
        assert!(matches!(err, OptimizeError::UnsupportedBitWidth { bits: 1, .. }));

        let err = build_strategy("Quantize", "nope", &StrategyParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, OptimizeError::UnknownStrategy(_)));
    }

    #[test]
    fn test_chained_quantize() {
        // second pass finds everything already quantized
        let model = optimize(
            lenet5(0),
            "Quantize|Quantize",
            "weight_only|weight_bias",
            &StrategyParams::default().with_exclude("classifier"),
        )
        .unwrap();
        assert_eq!(model.quantized_count(), 2);
        assert_eq!(model.get("classifier.0").unwrap().kind(), "Linear");
    }

    #[test]
    fn test_params_serde_defaults() {
        let params: StrategyParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params, StrategyParams::default());

        let params: StrategyParams =
            serde_json::from_str(r#"{"representation": "fixed_point", "bits": 12}"#).unwrap();
        assert_eq!(params.representation, Representation::FixedPoint);
        assert_eq!(params.bits, 12);
    }
}
