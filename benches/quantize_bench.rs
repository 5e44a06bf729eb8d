//! Benchmarks for tracing and quantization
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{ArrayD, IxDyn};

use quantgraph::graph::{get_graph, Device};
use quantgraph::model::zoo::{lenet5, mlp};
use quantgraph::quant::{quantize, quantize_node, QuantParams, QuantizedTensor, Representation};

fn trace_benchmark(c: &mut Criterion) {
    let mut model = lenet5(0);
    c.bench_function("trace_lenet5_depth3", |b| {
        b.iter(|| {
            let graph = get_graph(&mut model, black_box(&[1, 1, 28, 28]), 3, Device::Cpu).unwrap();
            black_box(graph.node_count())
        })
    });
}

fn quantize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize_mlp");
    let base = mlp(&[784, 512, 256, 10], 0).unwrap();

    for bits in [4u8, 8, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(bits), &bits, |b, &bits| {
            b.iter(|| {
                let model = quantize(base.clone(), "weight_bias", Representation::Integer, bits)
                    .unwrap();
                black_box(model.storage_bytes())
            })
        });
    }
    group.finish();
}

fn quantize_node_benchmark(c: &mut Criterion) {
    let base = lenet5(0);
    c.bench_function("quantize_node_classifier0", |b| {
        b.iter(|| {
            let mut model = base.clone();
            let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();
            let unit = quantize_node(
                "classifier.0",
                &mut graph,
                "weight_only",
                Representation::FixedPoint,
                8,
            )
            .unwrap();
            black_box(unit.param_count())
        })
    });
}

fn tensor_benchmark(c: &mut Criterion) {
    let values = ArrayD::from_shape_fn(IxDyn(&[256, 256]), |ix| {
        ((ix[0] * 256 + ix[1]) as f32).sin()
    });
    let mut group = c.benchmark_group("quantize_tensor_65536");

    for repr in [Representation::Integer, Representation::FixedPoint] {
        let params = QuantParams::new(repr, 8).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(repr), &params, |b, &params| {
            b.iter(|| black_box(QuantizedTensor::quantize(&values, params).dequantize()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    trace_benchmark,
    quantize_benchmark,
    quantize_node_benchmark,
    tensor_benchmark
);
criterion_main!(benches);
