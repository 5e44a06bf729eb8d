//! Quantized tensor storage
//!
//! Per-tensor symmetric schemes:
//!
//! | Kind | Scale | Codes |
//! |------|-------|-------|
//! | Integer | `absmax / qmax` | `round(x / scale)` clamped to `[-qmax, qmax]` |
//! | Fixed point | `2^-frac_bits` | `round(x * 2^frac_bits)` clamped to the two's complement range |
//!
//! For fixed point, `frac_bits = bits - 1 - int_bits` where `int_bits` is
//! the number of bits needed for the integer part of `absmax`. It can be
//! negative for large tensors at low widths.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::repr::{QuantParams, Representation};
use crate::tensor::abs_max;

/// Integer codes plus the scale needed to recover floats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    /// Representation and width the codes were produced with
    pub params: QuantParams,
    /// Multiplier from code to float value
    pub scale: f32,
    /// Fractional bits (fixed point only)
    pub frac_bits: Option<i32>,
    /// Quantized codes
    pub codes: ArrayD<i32>,
}

impl QuantizedTensor {
    /// Quantize a float tensor
    pub fn quantize(values: &ArrayD<f32>, params: QuantParams) -> Self {
        let max = abs_max(values);
        let (scale, frac_bits) = match params.repr() {
            Representation::Integer => {
                let scale = if max > 0.0 {
                    max / params.code_max() as f32
                } else {
                    1.0
                };
                (scale, None)
            }
            Representation::FixedPoint => {
                let frac = fixed_point_frac_bits(max, params.bits());
                (2f32.powi(-frac), Some(frac))
            }
        };

        let (lo, hi) = (params.code_min(), params.code_max());
        let mut clamped = 0usize;
        let codes = values.mapv(|v| {
            let q = (v / scale).round() as i64;
            if q < lo || q > hi {
                clamped += 1;
            }
            q.clamp(lo, hi) as i32
        });

        if clamped > 0 {
            warn!(
                "{} of {} values clamped to [{}, {}] while quantizing to {}",
                clamped,
                values.len(),
                lo,
                hi,
                params
            );
        }

        Self {
            params,
            scale,
            frac_bits,
            codes,
        }
    }

    /// Recover float values (`code * scale`)
    pub fn dequantize(&self) -> ArrayD<f32> {
        let scale = self.scale;
        self.codes.mapv(|q| q as f32 * scale)
    }

    /// Tensor shape
    pub fn shape(&self) -> &[usize] {
        self.codes.shape()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Packed storage size: codes at `bits` each, plus one f32 scale
    pub fn storage_bytes(&self) -> usize {
        (self.len() * self.params.bits() as usize).div_ceil(8) + 4
    }
}

/// Fractional bits for a signed fixed-point format holding `absmax`
pub fn fixed_point_frac_bits(absmax: f32, bits: u8) -> i32 {
    // `as` saturates on infinities, so the adds must too
    let int_bits = if absmax > 0.0 {
        (absmax.log2().floor() as i32).saturating_add(1).max(0)
    } else {
        0
    };
    (bits as i32 - 1).saturating_sub(int_bits)
}

/// Quantize then dequantize, used for dynamic activation quantization
pub fn fake_quantize(values: &ArrayD<f32>, params: QuantParams) -> ArrayD<f32> {
    QuantizedTensor::quantize(values, params).dequantize()
}

/// A unit parameter that may or may not be quantized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Param {
    /// Full precision values
    Float {
        /// Values
        values: ArrayD<f32>,
    },
    /// Quantized codes
    Quantized {
        /// Codes and scale
        tensor: QuantizedTensor,
    },
}

impl Param {
    /// Float values (dequantized if needed)
    pub fn to_float(&self) -> ArrayD<f32> {
        match self {
            Param::Float { values } => values.clone(),
            Param::Quantized { tensor } => tensor.dequantize(),
        }
    }

    /// Whether the parameter holds quantized codes
    pub fn is_quantized(&self) -> bool {
        matches!(self, Param::Quantized { .. })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Param::Float { values } => values.len(),
            Param::Quantized { tensor } => tensor.len(),
        }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage size in bytes
    pub fn storage_bytes(&self) -> usize {
        match self {
            Param::Float { values } => values.len() * 4,
            Param::Quantized { tensor } => tensor.storage_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, IxDyn};
    use rstest::rstest;

    fn int(bits: u8) -> QuantParams {
        QuantParams::new(Representation::Integer, bits).unwrap()
    }

    fn fxp(bits: u8) -> QuantParams {
        QuantParams::new(Representation::FixedPoint, bits).unwrap()
    }

    #[test]
    fn test_integer_scale_and_codes() {
        let t = arr1(&[-1.27f32, 0.0, 0.5, 1.27]).into_dyn();
        let q = QuantizedTensor::quantize(&t, int(8));

        assert!((q.scale - 0.01).abs() < 1e-6);
        assert_eq!(q.codes.as_slice().unwrap(), &[-127, 0, 50, 127]);
        assert!(q.frac_bits.is_none());
    }

    #[test]
    fn test_integer_zero_tensor() {
        let t = ArrayD::<f32>::zeros(IxDyn(&[3]));
        let q = QuantizedTensor::quantize(&t, int(4));
        assert_eq!(q.scale, 1.0);
        assert!(q.codes.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_fixed_point_frac_bits() {
        // |x| < 1 -> no integer bits
        assert_eq!(fixed_point_frac_bits(0.75, 8), 7);
        // 1 <= |x| < 2 -> one integer bit
        assert_eq!(fixed_point_frac_bits(1.5, 8), 6);
        // 100 needs 7 integer bits
        assert_eq!(fixed_point_frac_bits(100.0, 8), 0);
        // 1000 needs 10 integer bits -> negative fraction
        assert_eq!(fixed_point_frac_bits(1000.0, 8), -3);
        assert_eq!(fixed_point_frac_bits(0.0, 8), 7);
    }

    #[test]
    fn test_non_finite_absmax() {
        assert_eq!(fixed_point_frac_bits(f32::INFINITY, 8), 7 - i32::MAX);

        let t = arr1(&[f32::INFINITY, 1.0, -0.5]).into_dyn();
        let q = QuantizedTensor::quantize(&t, fxp(8));
        assert_eq!(q.len(), 3);
        assert!(q.codes.iter().all(|&c| (-128..=127).contains(&c)));
    }

    #[test]
    fn test_fixed_point_codes() {
        let t = arr1(&[0.5f32, -0.25, 0.75]).into_dyn();
        let q = QuantizedTensor::quantize(&t, fxp(8));

        assert_eq!(q.frac_bits, Some(7));
        assert_eq!(q.scale, 1.0 / 128.0);
        assert_eq!(q.codes.as_slice().unwrap(), &[64, -32, 96]);
        assert_eq!(q.dequantize(), t);
    }

    #[rstest]
    #[case(int(8))]
    #[case(int(4))]
    #[case(fxp(8))]
    #[case(fxp(16))]
    fn test_error_within_one_step(#[case] params: QuantParams) {
        let t = arr1(&[-0.9f32, -0.31, 0.02, 0.44, 0.87]).into_dyn();
        let q = QuantizedTensor::quantize(&t, params);
        let back = q.dequantize();

        for (a, b) in t.iter().zip(back.iter()) {
            assert!((a - b).abs() <= q.scale, "{} vs {}", a, b);
        }
        assert!(q.codes.iter().all(|&c| {
            (c as i64) >= params.code_min() && (c as i64) <= params.code_max()
        }));
    }

    #[test]
    fn test_storage_bytes() {
        let t = ArrayD::<f32>::zeros(IxDyn(&[10]));
        let q = QuantizedTensor::quantize(&t, int(4));
        // 10 * 4 bits = 5 bytes, plus the scale
        assert_eq!(q.storage_bytes(), 9);

        let p = Param::Float { values: t };
        assert_eq!(p.storage_bytes(), 40);
        assert!(!p.is_quantized());
    }
}
