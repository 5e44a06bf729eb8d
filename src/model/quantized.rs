//! Quantized units substituted for `Conv2d` and `Linear`
//!
//! Both keep integer weight codes and run their forward pass on the
//! dequantized values, optionally re-quantizing the output activations.

use ndarray::{Array1, Array2, Array4, ArrayD, Ix1, Ix2, Ix4};
use serde::{Deserialize, Serialize};

use super::layers::{
    conv2d_forward, conv2d_output_shape, linear_forward, linear_output_shape, shape_err, Conv2d,
    Linear,
};
use crate::error::OptResult;
use crate::quant::tensor::{fake_quantize, Param, QuantizedTensor};
use crate::quant::QuantParams;

fn bias_to_array(bias: &Option<Param>) -> OptResult<Option<Array1<f32>>> {
    bias.as_ref()
        .map(|b| b.to_float().into_dimensionality::<Ix1>().map_err(shape_err))
        .transpose()
}

fn bias_storage(bias: &Option<Param>) -> usize {
    bias.as_ref().map(|b| b.storage_bytes()).unwrap_or(0)
}

/// Convolution with quantized weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantConv2d {
    /// Weight codes, layout `[out, in, kh, kw]`
    pub weight: QuantizedTensor,
    /// Bias, quantized only when the strategy asks for it
    pub bias: Option<Param>,
    /// Output activation quantization
    pub activation: Option<QuantParams>,
    /// Window stride
    pub stride: usize,
    /// Zero padding on each side
    pub padding: usize,
    /// Name of the strategy that produced this unit
    pub strategy: String,
}

impl QuantConv2d {
    /// Weight tensor shape as `(out, in, kh, kw)`
    fn dims(&self) -> (usize, usize, usize, usize) {
        match self.weight.shape() {
            [o, i, kh, kw] => (*o, *i, *kh, *kw),
            _ => (0, 0, 0, 0),
        }
    }

    /// Number of output channels
    pub fn out_channels(&self) -> usize {
        self.dims().0
    }

    /// Number of input channels
    pub fn in_channels(&self) -> usize {
        self.dims().1
    }

    /// Parameter count (same as the float unit it replaced)
    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Storage size in bytes
    pub fn storage_bytes(&self) -> usize {
        self.weight.storage_bytes() + bias_storage(&self.bias)
    }

    /// Float convolution with the dequantized parameters
    pub fn dequantized(&self) -> OptResult<Conv2d> {
        let weight: Array4<f32> = self
            .weight
            .dequantize()
            .into_dimensionality::<Ix4>()
            .map_err(shape_err)?;
        Conv2d::from_weights(weight, bias_to_array(&self.bias)?, self.stride, self.padding)
    }

    /// Output shape for an NCHW input
    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        let (o, i, kh, kw) = self.dims();
        conv2d_output_shape(input, i, o, (kh, kw), self.stride, self.padding)
    }

    /// Run on an NCHW batch
    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        let conv = self.dequantized()?;
        let x = input.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
        let y = conv2d_forward(
            &x.to_owned(),
            &conv.weight,
            conv.bias.as_ref(),
            conv.stride,
            conv.padding,
        )?
        .into_dyn();
        Ok(match self.activation {
            Some(params) => fake_quantize(&y, params),
            None => y,
        })
    }
}

/// Fully connected layer with quantized weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantLinear {
    /// Weight codes, layout `[out, in]`
    pub weight: QuantizedTensor,
    /// Bias, quantized only when the strategy asks for it
    pub bias: Option<Param>,
    /// Output activation quantization
    pub activation: Option<QuantParams>,
    /// Name of the strategy that produced this unit
    pub strategy: String,
}

impl QuantLinear {
    fn dims(&self) -> (usize, usize) {
        match self.weight.shape() {
            [o, i] => (*o, *i),
            _ => (0, 0),
        }
    }

    /// Number of output features
    pub fn out_features(&self) -> usize {
        self.dims().0
    }

    /// Number of input features
    pub fn in_features(&self) -> usize {
        self.dims().1
    }

    /// Parameter count (same as the float unit it replaced)
    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Storage size in bytes
    pub fn storage_bytes(&self) -> usize {
        self.weight.storage_bytes() + bias_storage(&self.bias)
    }

    /// Float layer with the dequantized parameters
    pub fn dequantized(&self) -> OptResult<Linear> {
        let weight: Array2<f32> = self
            .weight
            .dequantize()
            .into_dimensionality::<Ix2>()
            .map_err(shape_err)?;
        Linear::from_weights(weight, bias_to_array(&self.bias)?)
    }

    /// Output shape, last dimension must match `in_features`
    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        let (o, i) = self.dims();
        linear_output_shape(input, i, o)
    }

    /// Run on a batch
    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        let linear = self.dequantized()?;
        let y = linear_forward(input, &linear.weight, linear.bias.as_ref())?;
        Ok(match self.activation {
            Some(params) => fake_quantize(&y, params),
            None => y,
        })
    }
}
