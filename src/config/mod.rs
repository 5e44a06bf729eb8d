//! Quantization configuration
//!
//! A JSON file describing one quantization run. Every field is optional;
//! missing fields take the defaults below, and command-line flags override
//! whatever the file sets.
//!
//! ```json
//! {
//!   "strategy": "weight_bias",
//!   "representation": "fixed_point",
//!   "bits": 12,
//!   "exclude": ["classifier.4"],
//!   "input_size": [1, 1, 28, 28],
//!   "depth": 2
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OptResult, OptimizeError};
use crate::graph::Device;
use crate::optimize::StrategyParams;
use crate::quant::{strategy_by_name, QuantParams, QuantizeOptions, Representation};
use crate::tensor::validate_input_size;

fn default_strategy() -> String {
    "weight_only".to_string()
}

fn default_representation() -> Representation {
    Representation::Integer
}

fn default_bits() -> u8 {
    8
}

fn default_input_size() -> Vec<usize> {
    vec![1, 1, 28, 28]
}

fn default_depth() -> usize {
    3
}

/// Quantization run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantConfig {
    /// Strategy name
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Representation kind
    #[serde(default = "default_representation")]
    pub representation: Representation,

    /// Bit width
    #[serde(default = "default_bits")]
    pub bits: u8,

    /// Path prefixes left in full precision
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Input size used when tracing (batch dimension included)
    #[serde(default = "default_input_size")]
    pub input_size: Vec<usize>,

    /// Trace depth
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Trace device
    #[serde(default)]
    pub device: Device,
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            representation: default_representation(),
            bits: default_bits(),
            exclude: Vec::new(),
            input_size: default_input_size(),
            depth: default_depth(),
            device: Device::default(),
        }
    }
}

impl QuantConfig {
    /// Parse from JSON text
    pub fn from_json_str(text: &str) -> OptResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| OptimizeError::InvalidConfig(format!("failed to parse config: {}", e)))
    }

    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> OptResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            OptimizeError::InvalidConfig(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Check every field that can be checked without a model
    pub fn validate(&self) -> OptResult<()> {
        strategy_by_name(&self.strategy)?;
        QuantParams::new(self.representation, self.bits)?;
        validate_input_size(&self.input_size)?;
        if self.depth == 0 {
            return Err(OptimizeError::InvalidDepth(self.depth));
        }
        if let Some(empty) = self.exclude.iter().position(|p| p.trim().is_empty()) {
            return Err(OptimizeError::InvalidConfig(format!(
                "exclude entry {} is empty",
                empty
            )));
        }
        Ok(())
    }

    /// Options for whole-model quantization
    pub fn quantize_options(&self) -> QuantizeOptions {
        QuantizeOptions {
            strategy: self.strategy.clone(),
            representation: self.representation,
            bits: self.bits,
            exclude: self.exclude.clone(),
        }
    }

    /// Parameters for the optimization pipeline
    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            representation: self.representation,
            bits: self.bits,
            exclude: self.exclude.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = QuantConfig::from_json_str(r#"{"bits": 4}"#).unwrap();
        assert_eq!(config.bits, 4);
        assert_eq!(config.strategy, "weight_only");
        assert_eq!(config.representation, Representation::Integer);
        assert_eq!(config.input_size, vec![1, 1, 28, 28]);
        assert_eq!(config.depth, 3);
        assert_eq!(config.device, Device::Cpu);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = QuantConfig::from_json_str(r#"{"bitz": 4}"#).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = QuantConfig::default();
        assert!(config.validate().is_ok());

        config.bits = 40;
        assert!(matches!(
            config.validate(),
            Err(OptimizeError::UnsupportedBitWidth { .. })
        ));

        config.bits = 8;
        config.depth = 0;
        assert!(matches!(config.validate(), Err(OptimizeError::InvalidDepth(0))));

        config.depth = 2;
        config.exclude = vec![" ".to_string()];
        assert!(matches!(config.validate(), Err(OptimizeError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"strategy": "weight_bias", "representation": "fixed_point", "bits": 12, "exclude": ["classifier"]}}"#
        )
        .unwrap();

        let config = QuantConfig::from_file(file.path()).unwrap();
        assert_eq!(config.strategy, "weight_bias");
        assert_eq!(config.representation, Representation::FixedPoint);

        let options = config.quantize_options();
        assert_eq!(options.bits, 12);
        assert_eq!(options.exclude, vec!["classifier".to_string()]);
        assert_eq!(config.strategy_params().bits, 12);
    }

    #[test]
    fn test_missing_file() {
        let err = QuantConfig::from_file("/nonexistent/quant.json").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
