//! Small reference models with deterministic initialisation
//!
//! Weights are drawn uniformly from `[-1/sqrt(fan_in), 1/sqrt(fan_in))` using a
//! seeded ChaCha generator, so the same seed always yields the same model.

use ndarray::{Array1, Array2, Array4};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Conv2d, Linear, MaxPool2d, Model, Module, Sequential};
use crate::error::{OptResult, OptimizeError};

fn bound(fan_in: usize) -> f32 {
    1.0 / (fan_in.max(1) as f32).sqrt()
}

fn random_conv(rng: &mut ChaCha8Rng, c_in: usize, c_out: usize, k: usize) -> Conv2d {
    let b = bound(c_in * k * k);
    let weight = Array4::from_shape_fn((c_out, c_in, k, k), |_| rng.gen_range(-b..b));
    let bias = Array1::from_shape_fn(c_out, |_| rng.gen_range(-b..b));
    Conv2d {
        weight,
        bias: Some(bias),
        stride: 1,
        padding: 0,
    }
}

fn random_linear(rng: &mut ChaCha8Rng, n_in: usize, n_out: usize) -> Linear {
    let b = bound(n_in);
    let weight = Array2::from_shape_fn((n_out, n_in), |_| rng.gen_range(-b..b));
    let bias = Array1::from_shape_fn(n_out, |_| rng.gen_range(-b..b));
    Linear {
        weight,
        bias: Some(bias),
    }
}

/// LeNet-5 for `[N, 1, 28, 28]` inputs
///
/// ```text
/// features:   Conv2d(1, 6, 5) ReLU MaxPool2d(2) Conv2d(6, 16, 5) ReLU MaxPool2d(2)
/// flatten
/// classifier: Linear(256, 120) ReLU Linear(120, 84) ReLU Linear(84, 10)
/// ```
pub fn lenet5(seed: u64) -> Model {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let features = Sequential::new()
        .push("0", Module::Conv2d(random_conv(&mut rng, 1, 6, 5)))
        .push("1", Module::relu())
        .push("2", Module::MaxPool2d(MaxPool2d::new(2)))
        .push("3", Module::Conv2d(random_conv(&mut rng, 6, 16, 5)))
        .push("4", Module::relu())
        .push("5", Module::MaxPool2d(MaxPool2d::new(2)));

    let classifier = Sequential::new()
        .push("0", Module::Linear(random_linear(&mut rng, 256, 120)))
        .push("1", Module::relu())
        .push("2", Module::Linear(random_linear(&mut rng, 120, 84)))
        .push("3", Module::relu())
        .push("4", Module::Linear(random_linear(&mut rng, 84, 10)));

    Model::from_sequential(
        "LeNet5",
        Sequential::new()
            .push("features", Module::Sequential(features))
            .push("flatten", Module::Flatten)
            .push("classifier", Module::Sequential(classifier)),
    )
}

/// Multi-layer perceptron with ReLU between layers: `sizes = [in, hidden.., out]`
pub fn mlp(sizes: &[usize], seed: u64) -> OptResult<Model> {
    if sizes.len() < 2 || sizes.contains(&0) {
        return Err(OptimizeError::InvalidModel(format!(
            "mlp needs at least two non-zero layer sizes, got {:?}",
            sizes
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let layers = sizes.len() - 1;

    let mut root = Sequential::new();
    for (i, pair) in sizes.windows(2).enumerate() {
        root = root.push(
            format!("fc{}", i + 1),
            Module::Linear(random_linear(&mut rng, pair[0], pair[1])),
        );
        if i + 1 < layers {
            root = root.push(format!("relu{}", i + 1), Module::relu());
        }
    }
    Ok(Model::from_sequential("MLP", root))
}

/// Look a reference model up by name (`lenet5`, `mlp`)
pub fn by_name(name: &str, seed: u64) -> OptResult<Model> {
    match name.to_ascii_lowercase().as_str() {
        "lenet" | "lenet5" => Ok(lenet5(seed)),
        "mlp" => mlp(&[784, 128, 64, 10], seed),
        other => Err(OptimizeError::InvalidModel(format!(
            "unknown reference model '{}'",
            other
        ))),
    }
}
