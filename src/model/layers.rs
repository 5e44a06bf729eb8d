//! Computational units
//!
//! Every unit knows its parameter count, its output shape for a given input
//! shape, and how to run a forward pass on an `ndarray` tensor.

#![allow(missing_docs)]

use std::fmt;

use ndarray::{Array1, Array2, Array4, ArrayD, Ix4};
use serde::{Deserialize, Serialize};

use crate::error::{OptResult, OptimizeError};
use crate::tensor::{expect_rank, format_shape, numel, window_output_dim};

pub(crate) fn shape_err(e: ndarray::ShapeError) -> OptimizeError {
    OptimizeError::ShapeMismatch(e.to_string())
}

// ============================================================================
// Conv2d
// ============================================================================

/// 2D convolution, weight layout `[out_channels, in_channels, kh, kw]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub weight: Array4<f32>,
    pub bias: Option<Array1<f32>>,
    pub stride: usize,
    pub padding: usize,
}

impl Conv2d {
    /// Zero-initialised convolution with a square kernel
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, bias: bool) -> Self {
        Self {
            weight: Array4::zeros((out_channels, in_channels, kernel, kernel)),
            bias: bias.then(|| Array1::zeros(out_channels)),
            stride: 1,
            padding: 0,
        }
    }

    /// Build from explicit parameters
    pub fn from_weights(
        weight: Array4<f32>,
        bias: Option<Array1<f32>>,
        stride: usize,
        padding: usize,
    ) -> OptResult<Self> {
        let out_channels = weight.dim().0;
        if let Some(b) = &bias {
            if b.len() != out_channels {
                return Err(OptimizeError::ShapeMismatch(format!(
                    "Conv2d bias has {} entries for {} output channels",
                    b.len(),
                    out_channels
                )));
            }
        }
        if stride == 0 {
            return Err(OptimizeError::ShapeMismatch(
                "Conv2d stride must be positive".to_string(),
            ));
        }
        Ok(Self {
            weight,
            bias,
            stride,
            padding,
        })
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn in_channels(&self) -> usize {
        self.weight.dim().1
    }

    pub fn out_channels(&self) -> usize {
        self.weight.dim().0
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        let (_, _, kh, kw) = self.weight.dim();
        (kh, kw)
    }

    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        conv2d_output_shape(
            input,
            self.in_channels(),
            self.out_channels(),
            self.kernel_size(),
            self.stride,
            self.padding,
        )
    }

    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        let x = input.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
        conv2d_forward(
            &x.to_owned(),
            &self.weight,
            self.bias.as_ref(),
            self.stride,
            self.padding,
        )
        .map(|y| y.into_dyn())
    }
}

pub(crate) fn conv2d_output_shape(
    input: &[usize],
    in_channels: usize,
    out_channels: usize,
    (kh, kw): (usize, usize),
    stride: usize,
    padding: usize,
) -> OptResult<Vec<usize>> {
    expect_rank(input, 4, "Conv2d")?;
    if input[1] != in_channels {
        return Err(OptimizeError::ShapeMismatch(format!(
            "Conv2d expects {} input channels, got {}",
            in_channels,
            format_shape(input)
        )));
    }
    let oh = window_output_dim(input[2], kh, stride, padding)?;
    let ow = window_output_dim(input[3], kw, stride, padding)?;
    Ok(vec![input[0], out_channels, oh, ow])
}

pub(crate) fn conv2d_forward(
    x: &Array4<f32>,
    w: &Array4<f32>,
    bias: Option<&Array1<f32>>,
    stride: usize,
    padding: usize,
) -> OptResult<Array4<f32>> {
    let (n, c_in, h, wd) = x.dim();
    let (c_out, w_in, kh, kw) = w.dim();
    if c_in != w_in {
        return Err(OptimizeError::ShapeMismatch(format!(
            "Conv2d expects {} input channels, got {}",
            w_in, c_in
        )));
    }
    if let Some(b) = bias {
        if b.len() != c_out {
            return Err(OptimizeError::ShapeMismatch(format!(
                "Conv2d bias has {} entries for {} output channels",
                b.len(),
                c_out
            )));
        }
    }
    let oh = window_output_dim(h, kh, stride, padding)?;
    let ow = window_output_dim(wd, kw, stride, padding)?;
    let pad = padding as isize;

    let mut out = Array4::<f32>::zeros((n, c_out, oh, ow));
    for b in 0..n {
        for o in 0..c_out {
            let bias_v = bias.map(|bv| bv[o]).unwrap_or(0.0);
            for y in 0..oh {
                for xo in 0..ow {
                    let mut acc = bias_v;
                    for c in 0..c_in {
                        for i in 0..kh {
                            let iy = (y * stride + i) as isize - pad;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for j in 0..kw {
                                let ix = (xo * stride + j) as isize - pad;
                                if ix < 0 || ix >= wd as isize {
                                    continue;
                                }
                                acc += x[[b, c, iy as usize, ix as usize]] * w[[o, c, i, j]];
                            }
                        }
                    }
                    out[[b, o, y, xo]] = acc;
                }
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Linear
// ============================================================================

/// Fully connected layer, weight layout `[out_features, in_features]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl Linear {
    /// Zero-initialised linear layer
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self {
            weight: Array2::zeros((out_features, in_features)),
            bias: bias.then(|| Array1::zeros(out_features)),
        }
    }

    /// Build from explicit parameters
    pub fn from_weights(weight: Array2<f32>, bias: Option<Array1<f32>>) -> OptResult<Self> {
        if let Some(b) = &bias {
            if b.len() != weight.nrows() {
                return Err(OptimizeError::ShapeMismatch(format!(
                    "Linear bias has {} entries for {} outputs",
                    b.len(),
                    weight.nrows()
                )));
            }
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        linear_output_shape(input, self.in_features(), self.out_features())
    }

    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        linear_forward(input, &self.weight, self.bias.as_ref())
    }
}

pub(crate) fn linear_output_shape(
    input: &[usize],
    in_features: usize,
    out_features: usize,
) -> OptResult<Vec<usize>> {
    match input.last() {
        Some(&last) if last == in_features => {
            let mut out = input.to_vec();
            if let Some(l) = out.last_mut() {
                *l = out_features;
            }
            Ok(out)
        }
        _ => Err(OptimizeError::ShapeMismatch(format!(
            "Linear expects last dimension {}, got {}",
            in_features,
            format_shape(input)
        ))),
    }
}

pub(crate) fn linear_forward(
    input: &ArrayD<f32>,
    weight: &Array2<f32>,
    bias: Option<&Array1<f32>>,
) -> OptResult<ArrayD<f32>> {
    let out_shape = linear_output_shape(input.shape(), weight.ncols(), weight.nrows())?;
    if let Some(b) = bias {
        if b.len() != weight.nrows() {
            return Err(OptimizeError::ShapeMismatch(format!(
                "Linear bias has {} entries for {} outputs",
                b.len(),
                weight.nrows()
            )));
        }
    }
    let rows = numel(&input.shape()[..input.ndim() - 1]);

    let x = input
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((rows, weight.ncols()))
        .map_err(shape_err)?;
    let mut y = x.dot(&weight.t());
    if let Some(b) = bias {
        y += b;
    }
    y.into_shape_with_order(out_shape).map_err(shape_err)
}

// ============================================================================
// BatchNorm2d
// ============================================================================

/// Inference-mode batch normalisation over channel dimension 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm2d {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
    pub eps: f32,
}

impl BatchNorm2d {
    /// Identity-initialised normalisation
    pub fn new(channels: usize) -> Self {
        Self {
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
            eps: 1e-5,
        }
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub fn param_count(&self) -> usize {
        // running statistics are buffers, not parameters
        self.gamma.len() + self.beta.len()
    }

    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        let c = self.channels();
        if self.beta.len() != c || self.running_mean.len() != c || self.running_var.len() != c {
            return Err(OptimizeError::ShapeMismatch(format!(
                "BatchNorm2d channel vectors disagree: gamma {}, beta {}, mean {}, var {}",
                c,
                self.beta.len(),
                self.running_mean.len(),
                self.running_var.len()
            )));
        }
        expect_rank(input, 4, "BatchNorm2d")?;
        if input[1] != self.channels() {
            return Err(OptimizeError::ShapeMismatch(format!(
                "BatchNorm2d expects {} channels, got {}",
                self.channels(),
                format_shape(input)
            )));
        }
        Ok(input.to_vec())
    }

    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        self.output_shape(input.shape())?;
        let mut out = input.clone();
        for (c, mut plane) in out.axis_iter_mut(ndarray::Axis(1)).enumerate() {
            let inv = self.gamma[c] / (self.running_var[c] + self.eps).sqrt();
            let (mean, beta) = (self.running_mean[c], self.beta[c]);
            plane.mapv_inplace(|v| (v - mean) * inv + beta);
        }
        Ok(out)
    }
}

// ============================================================================
// Parameter-free units
// ============================================================================

/// Element-wise activation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    ReLU,
    Sigmoid,
    Tanh,
}

impl ActivationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationKind::ReLU => "ReLU",
            ActivationKind::Sigmoid => "Sigmoid",
            ActivationKind::Tanh => "Tanh",
        }
    }

    pub fn forward(&self, input: &ArrayD<f32>) -> ArrayD<f32> {
        match self {
            ActivationKind::ReLU => input.mapv(|v| v.max(0.0)),
            ActivationKind::Sigmoid => input.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            ActivationKind::Tanh => input.mapv(f32::tanh),
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 2D max pooling without padding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub kernel: usize,
    pub stride: usize,
}

impl MaxPool2d {
    /// Pooling with stride equal to the kernel
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel,
            stride: kernel,
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> OptResult<Vec<usize>> {
        expect_rank(input, 4, "MaxPool2d")?;
        let oh = window_output_dim(input[2], self.kernel, self.stride, 0)?;
        let ow = window_output_dim(input[3], self.kernel, self.stride, 0)?;
        Ok(vec![input[0], input[1], oh, ow])
    }

    pub fn forward(&self, input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
        let shape = self.output_shape(input.shape())?;
        let x = input.view().into_dimensionality::<Ix4>().map_err(shape_err)?;
        let (n, c, oh, ow) = (shape[0], shape[1], shape[2], shape[3]);

        let mut out = Array4::<f32>::from_elem((n, c, oh, ow), f32::NEG_INFINITY);
        for b in 0..n {
            for ch in 0..c {
                for y in 0..oh {
                    for xo in 0..ow {
                        let mut m = f32::NEG_INFINITY;
                        for i in 0..self.kernel {
                            for j in 0..self.kernel {
                                m = m.max(x[[b, ch, y * self.stride + i, xo * self.stride + j]]);
                            }
                        }
                        out[[b, ch, y, xo]] = m;
                    }
                }
            }
        }
        Ok(out.into_dyn())
    }
}

/// Flattens every dimension after the batch dimension
pub fn flatten_output_shape(input: &[usize]) -> OptResult<Vec<usize>> {
    match input.split_first() {
        Some((&batch, rest)) => Ok(vec![batch, numel(rest)]),
        None => Err(OptimizeError::ShapeMismatch(
            "Flatten needs at least one dimension".to_string(),
        )),
    }
}

pub(crate) fn flatten_forward(input: &ArrayD<f32>) -> OptResult<ArrayD<f32>> {
    let shape = flatten_output_shape(input.shape())?;
    input
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(shape)
        .map_err(shape_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array, IxDyn};

    #[test]
    fn test_conv2d_shape() {
        let conv = Conv2d::new(1, 6, 5, true);
        assert_eq!(conv.output_shape(&[1, 1, 28, 28]).unwrap(), vec![1, 6, 24, 24]);
        assert_eq!(conv.param_count(), 6 * 25 + 6);

        let padded = Conv2d::new(3, 8, 3, false).with_padding(1).with_stride(2);
        assert_eq!(padded.output_shape(&[2, 3, 32, 32]).unwrap(), vec![2, 8, 16, 16]);
    }

    #[test]
    fn test_conv2d_shape_errors() {
        let conv = Conv2d::new(3, 6, 5, true);
        assert!(conv.output_shape(&[1, 1, 28, 28]).is_err()); // channels
        assert!(conv.output_shape(&[1, 3, 28]).is_err()); // rank
        assert!(conv.output_shape(&[1, 3, 4, 4]).is_err()); // kernel too large
    }

    #[test]
    fn test_conv2d_forward() {
        // 1x1 input channel, 2x2 kernel of ones -> window sums
        let weight = Array4::from_elem((1, 1, 2, 2), 1.0f32);
        let conv = Conv2d::from_weights(weight, Some(arr1(&[0.5])), 1, 0).unwrap();
        let input = Array::from_shape_vec(IxDyn(&[1, 1, 3, 3]), (1..=9).map(|v| v as f32).collect())
            .unwrap();

        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2, 2]);
        assert_eq!(out[[0, 0, 0, 0]], 1.0 + 2.0 + 4.0 + 5.0 + 0.5);
        assert_eq!(out[[0, 0, 1, 1]], 5.0 + 6.0 + 8.0 + 9.0 + 0.5);
    }

    #[test]
    fn test_conv2d_bias_mismatch() {
        let weight = Array4::zeros((2, 1, 3, 3));
        assert!(Conv2d::from_weights(weight, Some(arr1(&[0.0])), 1, 0).is_err());
    }

    #[test]
    fn test_linear_forward() {
        let linear =
            Linear::from_weights(arr2(&[[1.0, 0.0], [1.0, 1.0], [0.0, 2.0]]), Some(arr1(&[0.0, 0.0, 1.0])))
                .unwrap();
        let input = arr2(&[[1.0f32, 2.0]]).into_dyn();

        let out = linear.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 3]);
        assert_eq!(out.as_slice().unwrap(), &[1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_forward_rejects_mismatched_bias() {
        // struct literals bypass from_weights, as decoded files do
        let linear = Linear {
            weight: Array2::zeros((10, 4)),
            bias: Some(Array1::zeros(3)),
        };
        let err = linear.forward(&ArrayD::zeros(IxDyn(&[1, 4]))).unwrap_err();
        assert!(matches!(err, OptimizeError::ShapeMismatch(_)));

        let conv = Conv2d {
            weight: Array4::zeros((2, 1, 3, 3)),
            bias: Some(Array1::zeros(5)),
            stride: 1,
            padding: 0,
        };
        let err = conv.forward(&ArrayD::zeros(IxDyn(&[1, 1, 4, 4]))).unwrap_err();
        assert!(matches!(err, OptimizeError::ShapeMismatch(_)));
    }

    #[test]
    fn test_batchnorm_rejects_short_vectors() {
        let mut bn = BatchNorm2d::new(2);
        bn.running_var = arr1(&[1.0]);
        let input = ArrayD::from_elem(IxDyn(&[1, 2, 1, 1]), 3.0f32);
        assert!(matches!(
            bn.forward(&input),
            Err(OptimizeError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_linear_shape() {
        let linear = Linear::new(256, 120, true);
        assert_eq!(linear.output_shape(&[4, 256]).unwrap(), vec![4, 120]);
        assert!(linear.output_shape(&[4, 255]).is_err());
        assert_eq!(linear.param_count(), 256 * 120 + 120);
    }

    #[test]
    fn test_batchnorm_forward() {
        let mut bn = BatchNorm2d::new(2);
        bn.running_mean = arr1(&[1.0, 0.0]);
        bn.eps = 0.0;
        let input = ArrayD::from_elem(IxDyn(&[1, 2, 1, 1]), 3.0f32);

        let out = bn.forward(&input).unwrap();
        assert_eq!(out[[0, 0, 0, 0]], 2.0);
        assert_eq!(out[[0, 1, 0, 0]], 3.0);
        assert_eq!(bn.param_count(), 4);
    }

    #[test]
    fn test_maxpool_and_flatten() {
        let pool = MaxPool2d::new(2);
        let input = Array::from_shape_vec(IxDyn(&[1, 1, 2, 4]), vec![1., 5., 2., 0., 3., 4., 7., 1.])
            .unwrap();

        let out = pool.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 1, 2]);
        assert_eq!(out.as_slice().unwrap(), &[5.0, 7.0]);

        let flat = flatten_forward(&input).unwrap();
        assert_eq!(flat.shape(), &[1, 8]);
        assert_eq!(flatten_output_shape(&[2, 16, 4, 4]).unwrap(), vec![2, 256]);
    }

    #[test]
    fn test_activations() {
        let x = arr1(&[-1.0f32, 0.0, 2.0]).into_dyn();
        assert_eq!(ActivationKind::ReLU.forward(&x).as_slice().unwrap(), &[0.0, 0.0, 2.0]);
        assert_eq!(ActivationKind::Sigmoid.forward(&x)[1], 0.5);
        assert_eq!(ActivationKind::Tanh.forward(&x)[1], 0.0);
    }
}
