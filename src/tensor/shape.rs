//! Shape utilities for model tensors
//!
//! Functions for working with tensor shapes and dimensions.

use crate::error::{OptResult, OptimizeError};

/// Calculate total number of elements from shape
pub fn numel(shape: &[usize]) -> usize {
    if shape.is_empty() {
        1 // scalar
    } else {
        shape.iter().product()
    }
}

/// Check that a traced input size is usable (non-empty, no zero dimension)
pub fn validate_input_size(shape: &[usize]) -> OptResult<()> {
    if shape.is_empty() {
        return Err(OptimizeError::InvalidInputShape(
            "input size must have at least one dimension".to_string(),
        ));
    }
    if shape.contains(&0) {
        return Err(OptimizeError::InvalidInputShape(format!(
            "input size {} contains a zero dimension",
            format_shape(shape)
        )));
    }
    Ok(())
}

/// Require an exact rank
pub fn expect_rank(shape: &[usize], rank: usize, what: &str) -> OptResult<()> {
    if shape.len() != rank {
        return Err(OptimizeError::ShapeMismatch(format!(
            "{} expects rank {} input, got {}",
            what,
            rank,
            format_shape(shape)
        )));
    }
    Ok(())
}

/// Output length of a sliding window along one spatial dimension
///
/// `out = (input + 2 * padding - kernel) / stride + 1`
pub fn window_output_dim(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> OptResult<usize> {
    if stride == 0 {
        return Err(OptimizeError::ShapeMismatch(
            "window stride must be positive".to_string(),
        ));
    }
    let padded = input + 2 * padding;
    if kernel == 0 || kernel > padded {
        return Err(OptimizeError::ShapeMismatch(format!(
            "kernel {} does not fit padded input {}",
            kernel, padded
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// Render a shape the way summaries print it: `[1, 3, 32, 32]`
pub fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", dims.join(", "))
}

/// Parse a comma separated shape such as `1,1,28,28`
pub fn parse_shape(text: &str) -> OptResult<Vec<usize>> {
    text.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>().map_err(|_| {
                OptimizeError::InvalidInputShape(format!("'{}' is not a dimension", s))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[1, 1, 1]), 1);
        assert_eq!(numel(&[]), 1); // scalar
    }

    #[test]
    fn test_validate_input_size() {
        assert!(validate_input_size(&[1, 3, 32, 32]).is_ok());
        assert!(validate_input_size(&[]).is_err());
        assert!(validate_input_size(&[1, 0, 4]).is_err());
    }

    #[test]
    fn test_window_output_dim() {
        assert_eq!(window_output_dim(28, 5, 1, 0).unwrap(), 24);
        assert_eq!(window_output_dim(24, 2, 2, 0).unwrap(), 12);
        assert_eq!(window_output_dim(32, 3, 1, 1).unwrap(), 32);
        assert!(window_output_dim(3, 5, 1, 0).is_err());
        assert!(window_output_dim(8, 2, 0, 0).is_err());
    }

    #[test]
    fn test_format_and_parse_shape() {
        assert_eq!(format_shape(&[1, 10]), "[1, 10]");
        assert_eq!(parse_shape("1, 1,28,28").unwrap(), vec![1, 1, 28, 28]);
        assert!(parse_shape("1,x").is_err());
    }

    #[test]
    fn test_expect_rank() {
        assert!(expect_rank(&[1, 2, 3, 4], 4, "Conv2d").is_ok());
        let err = expect_rank(&[1, 2], 4, "Conv2d").unwrap_err();
        assert!(err.to_string().contains("Conv2d"));
    }
}
