// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Benchmarks for quantized kernels.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qnn_kernels::prelude::*;
use qnn_kernels::{install_backend, select_backend, BackendConfig, DotBackend};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_i8(rng: &mut ChaCha8Rng, len: usize) -> Vec<i8> {
    (0..len).map(|_| rng.gen_range(-128..=127)).collect()
}

fn bench_dot_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot_s8");
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for size in [64, 256, 1024, 4096].iter() {
        let a = random_i8(&mut rng, *size);
        let b = random_i8(&mut rng, *size);

        for config in [BackendConfig::scalar_only(), BackendConfig::auto()] {
            let backend = select_backend(&config);
            group.bench_with_input(BenchmarkId::new(backend.name(), size), size, |bench, _| {
                bench.iter(|| black_box(backend.dot_s8(black_box(&a), black_box(&b), 128, 0)))
            });
        }
    }

    group.finish();
}

fn bench_conv(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_hwc");
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let stage = AffineOutput::<i32>::new(Requantizer::per_tensor(1_300_000_000, -8)).with_output_offset(-3);

    for channels in [8, 16, 32].iter() {
        let ishape = Shape4::hwc(16, 16, *channels);
        let filter = FilterShape::new(*channels, 3, 3, *channels);
        let oshape = Shape4::hwc(16, 16, *channels);
        let params = ConvParams::new().with_padding(1, 1).with_input_offset(128);
        let input = random_i8(&mut rng, ishape.element_count());
        let weights = random_i8(&mut rng, filter.element_count());
        let packed: Vec<i8> = weights.iter().map(|w| w >> 4).collect();
        let packed = PackedInt4Vec::from_i8_slice(&packed).unwrap_or_else(|_| PackedInt4Vec::new(0));
        let mut output = vec![0i8; oshape.element_count()];

        group.bench_with_input(BenchmarkId::new("dense", channels), channels, |bench, _| {
            bench.iter(|| {
                conv_hwc(
                    black_box(&input),
                    ishape,
                    &DenseWeights::new(&weights),
                    filter,
                    &params,
                    &stage,
                    &mut output,
                    oshape,
                )
            })
        });

        group.bench_with_input(BenchmarkId::new("int4", channels), channels, |bench, _| {
            bench.iter(|| {
                conv_hwc(
                    black_box(&input),
                    ishape,
                    &packed.as_weights(),
                    filter,
                    &params,
                    &stage,
                    &mut output,
                    oshape,
                )
            })
        });

        let dw_weights = random_i8(&mut rng, 9 * channels);
        group.bench_with_input(BenchmarkId::new("depthwise", channels), channels, |bench, _| {
            bench.iter(|| {
                depthwise_conv_hwc(
                    black_box(&input),
                    ishape,
                    &DenseWeights::new(&dw_weights),
                    Spatial::square(3),
                    &params,
                    &stage,
                    &mut output,
                    oshape,
                )
            })
        });
    }

    group.finish();
}

fn bench_fully_connected(c: &mut Criterion) {
    let mut group = c.benchmark_group("fully_connected");
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let params = MatmulParams::new(128, 0);

    for (rows, cols) in [(64, 64), (256, 256), (1000, 512)].iter() {
        let weights = random_i8(&mut rng, rows * cols);
        let mut fast = vec![0i8; rows * cols];
        let _ = interleave_rows4(&weights, *rows, *cols, &mut fast);
        let input = random_i8(&mut rng, 4 * cols);
        let bias: Vec<i32> = (0..*rows).map(|_| rng.gen_range(-1000..1000)).collect();
        let stage = AffineOutput::new(Requantizer::per_tensor(1_300_000_000, -9)).with_bias(&bias);
        let mut output = vec![0i8; 4 * rows];
        let label = format!("{rows}x{cols}");

        group.bench_with_input(BenchmarkId::new("standard", &label), &(), |bench, _| {
            bench.iter(|| {
                fully_connected(
                    black_box(&input),
                    4,
                    &DenseWeights::new(&weights),
                    *cols,
                    *rows,
                    &params,
                    &stage,
                    &mut output,
                )
            })
        });

        install_backend(&BackendConfig::scalar_only());
        group.bench_with_input(BenchmarkId::new("standard-scalar", &label), &(), |bench, _| {
            bench.iter(|| {
                fully_connected(
                    black_box(&input),
                    4,
                    &DenseWeights::new(&weights),
                    *cols,
                    *rows,
                    &params,
                    &stage,
                    &mut output,
                )
            })
        });
        install_backend(&BackendConfig::auto());

        group.bench_with_input(BenchmarkId::new("interleaved", &label), &(), |bench, _| {
            bench.iter(|| {
                fully_connected_interleaved(black_box(&input), 4, &fast, *cols, *rows, &params, &stage, &mut output)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dot_backends, bench_conv, bench_fully_connected);
criterion_main!(benches);
