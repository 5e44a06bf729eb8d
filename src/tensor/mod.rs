//! Tensor utilities
//!
//! - Shape helpers (`shape`)
//! - Statistics over `ndarray` tensors (`stats`)

pub mod shape;
pub mod stats;

// Re-export commonly used items
pub use shape::{
    expect_rank, format_shape, numel, parse_shape, validate_input_size, window_output_dim,
};
pub use stats::{abs_max, max_abs_diff, mse};
