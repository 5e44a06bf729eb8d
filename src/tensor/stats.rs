//! Tensor statistics used by quantization and error reporting

use ndarray::{ArrayD, Zip};

use crate::error::{OptResult, OptimizeError};

/// Largest absolute value in a tensor (0 for empty tensors)
pub fn abs_max(values: &ArrayD<f32>) -> f32 {
    values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
}

/// Mean squared error between two tensors of the same shape
pub fn mse(a: &ArrayD<f32>, b: &ArrayD<f32>) -> OptResult<f32> {
    check_same_shape(a, b)?;
    if a.is_empty() {
        return Ok(0.0);
    }
    let mut sum = 0.0f64;
    Zip::from(a).and(b).for_each(|&x, &y| {
        let d = (x - y) as f64;
        sum += d * d;
    });
    Ok((sum / a.len() as f64) as f32)
}

/// Largest absolute element-wise difference
pub fn max_abs_diff(a: &ArrayD<f32>, b: &ArrayD<f32>) -> OptResult<f32> {
    check_same_shape(a, b)?;
    let mut max = 0.0f32;
    Zip::from(a).and(b).for_each(|&x, &y| {
        max = max.max((x - y).abs());
    });
    Ok(max)
}

fn check_same_shape(a: &ArrayD<f32>, b: &ArrayD<f32>) -> OptResult<()> {
    if a.shape() != b.shape() {
        return Err(OptimizeError::ShapeMismatch(format!(
            "cannot compare tensors of shape {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, IxDyn};

    #[test]
    fn test_abs_max() {
        let t = arr1(&[0.5f32, -2.0, 1.5]).into_dyn();
        assert_eq!(abs_max(&t), 2.0);
        assert_eq!(abs_max(&ArrayD::<f32>::zeros(IxDyn(&[0]))), 0.0);
    }

    #[test]
    fn test_mse_and_max_diff() {
        let a = arr1(&[1.0f32, 2.0, 3.0]).into_dyn();
        let b = arr1(&[1.0f32, 2.5, 2.0]).into_dyn();
        let m = mse(&a, &b).unwrap();
        assert!((m - (0.25 + 1.0) / 3.0).abs() < 1e-6);
        assert_eq!(max_abs_diff(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = arr1(&[1.0f32, 2.0]).into_dyn();
        let b = arr1(&[1.0f32]).into_dyn();
        assert!(mse(&a, &b).is_err());
    }
}
