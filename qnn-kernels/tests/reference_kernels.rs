//! Integration tests comparing every kernel against straightforward loops.
//!
//! Tensors and parameters are drawn from a seeded generator so failures are
//! reproducible. The reference loops test bounds per tap and compute in
//! `i64`, the opposite of how the kernels are written.

use qnn_kernels::conv::{conv_1x1, conv_hwc, depthwise_conv_hwc, transpose_conv, transpose_conv_buffer_size};
use qnn_kernels::layout::{interleave_rows4, interleaved_len};
use qnn_kernels::matmul::{batch_matmul, batch_matmul_output_shape, fully_connected, fully_connected_interleaved};
use qnn_kernels::requant::{requantize, requantize_wide};
use qnn_kernels::{
    output_extent, ActivationRange, AffineOutput, ConvParams, DenseWeights, FilterShape, MatmulParams,
    PackedInt4Vec, Requantizer, Shape4, Spatial,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_i8(rng: &mut ChaCha8Rng, len: usize) -> Vec<i8> {
    (0..len).map(|_| rng.gen_range(-128..=127)).collect()
}

fn random_i4(rng: &mut ChaCha8Rng, len: usize) -> Vec<i8> {
    (0..len).map(|_| rng.gen_range(-8..=7)).collect()
}

fn random_quant(rng: &mut ChaCha8Rng, channels: usize) -> (Vec<i32>, Vec<i32>) {
    let mults = (0..channels).map(|_| rng.gen_range(1 << 30..i32::MAX)).collect();
    let shifts = (0..channels).map(|_| rng.gen_range(-10..=1)).collect();
    (mults, shifts)
}

/// Everything the reference needs to finish an accumulator.
struct Finish<'a> {
    mults: &'a [i32],
    shifts: &'a [i32],
    bias: &'a [i32],
    output_offset: i32,
    act: ActivationRange,
}

impl Finish<'_> {
    fn apply(&self, acc: i64, co: usize) -> i8 {
        let acc = (acc + i64::from(self.bias[co])) as i32;
        let v = requantize(acc, self.mults[co], self.shifts[co]) + self.output_offset;
        v.clamp(self.act.min, self.act.max).clamp(-128, 127) as i8
    }
}

#[allow(clippy::too_many_arguments)]
fn reference_conv(
    input: &[i8],
    ishape: Shape4,
    weights: &[i8],
    filter: FilterShape,
    params: &ConvParams,
    finish: &Finish<'_>,
    oshape: Shape4,
) -> Vec<i8> {
    let groups = ishape.channels / filter.in_channels;
    let per_group = oshape.channels / groups;
    let mut out = Vec::with_capacity(oshape.element_count());
    for n in 0..oshape.batch {
        for oy in 0..oshape.height {
            for ox in 0..oshape.width {
                for co in 0..oshape.channels {
                    let mut acc = 0i64;
                    for ky in 0..filter.height {
                        for kx in 0..filter.width {
                            let iy = (oy * params.stride.y + ky * params.dilation.y) as i64 - params.padding.y as i64;
                            let ix = (ox * params.stride.x + kx * params.dilation.x) as i64 - params.padding.x as i64;
                            if iy < 0 || ix < 0 || iy >= ishape.height as i64 || ix >= ishape.width as i64 {
                                continue;
                            }
                            for ci in 0..filter.in_channels {
                                let c = (co / per_group) * filter.in_channels + ci;
                                let x = i64::from(input[ishape.index(n, iy as usize, ix as usize, c)]);
                                let w = i64::from(weights[filter.index(co, ky, kx, ci)]);
                                acc += (x + i64::from(params.input_offset)) * w;
                            }
                        }
                    }
                    out.push(finish.apply(acc, co));
                }
            }
        }
    }
    out
}

#[test]
fn test_random_grouped_convolutions() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for case in 0..24 {
        let groups = rng.gen_range(1..=3);
        let depth = rng.gen_range(1..=4);
        let per_group = rng.gen_range(1..=3);
        let ishape = Shape4::new(rng.gen_range(1..=2), rng.gen_range(3..=7), rng.gen_range(3..=7), groups * depth);
        let filter = FilterShape::new(groups * per_group, rng.gen_range(1..=3), rng.gen_range(1..=3), depth);
        let params = ConvParams::new()
            .with_stride(rng.gen_range(1..=2), rng.gen_range(1..=2))
            .with_padding(rng.gen_range(0..=2), rng.gen_range(0..=2))
            .with_dilation(rng.gen_range(1..=2), rng.gen_range(1..=2))
            .with_input_offset(rng.gen_range(-127..=128));
        let oshape = Shape4::new(
            ishape.batch,
            output_extent(ishape.height, filter.height, params.stride.y, params.padding.y, params.dilation.y),
            output_extent(ishape.width, filter.width, params.stride.x, params.padding.x, params.dilation.x),
            filter.out_channels,
        );

        let input = random_i8(&mut rng, ishape.element_count());
        let weights = random_i8(&mut rng, filter.element_count());
        let bias: Vec<i32> = (0..filter.out_channels).map(|_| rng.gen_range(-5000..5000)).collect();
        let (mults, shifts) = random_quant(&mut rng, filter.out_channels);
        let output_offset = rng.gen_range(-128..=127);
        let act = ActivationRange::new(rng.gen_range(-128..=-20), rng.gen_range(20..=127));

        let stage = AffineOutput::new(Requantizer::per_channel(&mults, &shifts))
            .with_bias(&bias)
            .with_output_offset(output_offset)
            .with_activation(act);
        let mut got = vec![0i8; oshape.element_count()];
        conv_hwc(&input, ishape, &DenseWeights::new(&weights), filter, &params, &stage, &mut got, oshape).unwrap();

        let finish = Finish {
            mults: &mults,
            shifts: &shifts,
            bias: &bias,
            output_offset,
            act,
        };
        let expected = reference_conv(&input, ishape, &weights, filter, &params, &finish, oshape);
        assert_eq!(got, expected, "case {case}: {ishape:?} {filter:?} {params:?}");
    }
}

#[test]
fn test_random_depthwise_matches_grouped() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for case in 0..16 {
        let in_ch = rng.gen_range(1..=5);
        let mult = rng.gen_range(1..=3);
        let out_ch = in_ch * mult;
        let ishape = Shape4::new(1, rng.gen_range(2..=6), rng.gen_range(2..=6), in_ch);
        let kernel = Spatial::new(rng.gen_range(1..=3), rng.gen_range(1..=3));
        let params = ConvParams::new()
            .with_stride(rng.gen_range(1..=2), rng.gen_range(1..=2))
            .with_padding(rng.gen_range(0..=1), rng.gen_range(0..=1))
            .with_dilation(rng.gen_range(1..=2), 1)
            .with_input_offset(rng.gen_range(-127..=128));
        let oshape = Shape4::new(
            1,
            output_extent(ishape.height, kernel.y, params.stride.y, params.padding.y, params.dilation.y),
            output_extent(ishape.width, kernel.x, params.stride.x, params.padding.x, params.dilation.x),
            out_ch,
        );

        // depthwise layout [ky][kx][co]; grouped layout [co][ky][kx][1]
        let dw = random_i4(&mut rng, kernel.x * kernel.y * out_ch);
        let mut grouped = vec![0i8; dw.len()];
        for ky in 0..kernel.y {
            for kx in 0..kernel.x {
                for co in 0..out_ch {
                    grouped[(co * kernel.y + ky) * kernel.x + kx] = dw[(ky * kernel.x + kx) * out_ch + co];
                }
            }
        }
        let packed = PackedInt4Vec::from_i8_slice(&dw).unwrap();

        let input = random_i8(&mut rng, ishape.element_count());
        let (mults, shifts) = random_quant(&mut rng, out_ch);
        let stage = AffineOutput::<i32>::new(Requantizer::per_channel(&mults, &shifts)).with_output_offset(3);

        let mut dense_out = vec![0i8; oshape.element_count()];
        let mut packed_out = vec![0i8; oshape.element_count()];
        let mut grouped_out = vec![0i8; oshape.element_count()];
        depthwise_conv_hwc(&input, ishape, &DenseWeights::new(&dw), kernel, &params, &stage, &mut dense_out, oshape)
            .unwrap();
        depthwise_conv_hwc(&input, ishape, &packed.as_weights(), kernel, &params, &stage, &mut packed_out, oshape)
            .unwrap();
        conv_hwc(
            &input,
            ishape,
            &DenseWeights::new(&grouped),
            FilterShape::new(out_ch, kernel.y, kernel.x, 1),
            &params,
            &stage,
            &mut grouped_out,
            oshape,
        )
        .unwrap();

        assert_eq!(dense_out, grouped_out, "case {case}");
        assert_eq!(dense_out, packed_out, "case {case}");
    }
}

#[test]
fn test_random_fully_connected_interleaved() {
    let mut rng = ChaCha8Rng::seed_from_u64(1234);

    for case in 0..20 {
        let rows = rng.gen_range(1..=13);
        let cols = rng.gen_range(1..=17);
        let batches = rng.gen_range(1..=3);
        let weights = random_i8(&mut rng, rows * cols);
        let input = random_i8(&mut rng, batches * cols);
        let bias: Vec<i32> = (0..rows).map(|_| rng.gen_range(-20_000..20_000)).collect();
        let (mults, shifts) = random_quant(&mut rng, rows);
        let params = MatmulParams::new(rng.gen_range(-127..=128), rng.gen_range(-127..=128));
        let stage = AffineOutput::new(Requantizer::per_channel(&mults, &shifts))
            .with_bias(&bias)
            .with_output_offset(-5);

        let mut fast_weights = vec![0i8; interleaved_len(rows, cols)];
        interleave_rows4(&weights, rows, cols, &mut fast_weights).unwrap();

        let mut standard = vec![0i8; batches * rows];
        let mut fast = vec![0i8; batches * rows];
        fully_connected(&input, batches, &DenseWeights::new(&weights), cols, rows, &params, &stage, &mut standard)
            .unwrap();
        fully_connected_interleaved(&input, batches, &fast_weights, cols, rows, &params, &stage, &mut fast).unwrap();
        assert_eq!(standard, fast, "case {case}: {rows}x{cols}");

        for b in 0..batches {
            for r in 0..rows {
                let acc: i32 = (0..cols)
                    .map(|c| {
                        (i32::from(input[b * cols + c]) + params.lhs_offset)
                            * (i32::from(weights[r * cols + c]) + params.rhs_offset)
                    })
                    .sum::<i32>()
                    + bias[r];
                let v = (requantize(acc, mults[r], shifts[r]) - 5).clamp(-128, 127);
                assert_eq!(i32::from(standard[b * rows + r]), v);
            }
        }
    }
}

#[test]
fn test_random_batch_matmul_broadcast() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);

    for case in 0..16 {
        // leading extents drawn independently, so 1, equal and unequal all occur
        let cols = rng.gen_range(1..=9);
        let lhs_shape = Shape4::new(rng.gen_range(1..=4), rng.gen_range(1..=3), rng.gen_range(1..=4), cols);
        let rhs_shape = Shape4::new(rng.gen_range(1..=4), rng.gen_range(1..=3), rng.gen_range(1..=4), cols);
        assert_eq!(
            batch_matmul_output_shape(&lhs_shape, &rhs_shape).unwrap().batch,
            lhs_shape.batch.max(rhs_shape.batch)
        );
        let lhs = random_i8(&mut rng, lhs_shape.element_count());
        let rhs = random_i8(&mut rng, rhs_shape.element_count());
        let bias: Vec<i32> = (0..rhs_shape.width).map(|_| rng.gen_range(-100..100)).collect();
        let params = MatmulParams::new(rng.gen_range(-127..=128), rng.gen_range(-127..=128));
        let (mult, shift) = (rng.gen_range(1 << 30..i32::MAX), rng.gen_range(-12..=-4));
        let stage = AffineOutput::new(Requantizer::per_tensor(mult, shift)).with_bias(&bias);

        let out_shape = batch_matmul_output_shape(&lhs_shape, &rhs_shape).unwrap();
        let mut dst = vec![0i8; out_shape.element_count()];
        batch_matmul(&lhs, lhs_shape, &DenseWeights::new(&rhs), rhs_shape, &params, &stage, &mut dst).unwrap();

        for bn in 0..out_shape.batch {
            for bh in 0..out_shape.height {
                for i in 0..lhs_shape.width {
                    for j in 0..rhs_shape.width {
                        let mut acc = bias[j];
                        for c in 0..cols {
                            let x = lhs[lhs_shape.index(bn % lhs_shape.batch, bh % lhs_shape.height, i, c)];
                            let w = rhs[rhs_shape.index(bn % rhs_shape.batch, bh % rhs_shape.height, j, c)];
                            acc += (i32::from(x) + params.lhs_offset) * (i32::from(w) + params.rhs_offset);
                        }
                        let expected = requantize(acc, mult, shift).clamp(-128, 127);
                        let got = dst[out_shape.index(bn, bh, i, j)];
                        assert_eq!(i32::from(got), expected, "case {case} at ({bn}, {bh}, {i}, {j})");
                    }
                }
            }
        }
    }
}

#[test]
fn test_random_s16_convolution() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let ishape = Shape4::new(2, 5, 4, 3);
    let filter = FilterShape::new(4, 3, 3, 3);
    let params = ConvParams::new().with_padding(1, 1);
    let oshape = Shape4::new(2, 5, 4, 4);

    let input: Vec<i16> = (0..ishape.element_count()).map(|_| rng.gen()).collect();
    let weights = random_i8(&mut rng, filter.element_count());
    let bias: Vec<i64> = (0..4).map(|_| rng.gen_range(-1_000_000..1_000_000)).collect();
    let (mults, shifts) = random_quant(&mut rng, 4);
    let stage = AffineOutput::new(Requantizer::per_channel(&mults, &shifts)).with_bias(&bias);

    let mut got = vec![0i16; oshape.element_count()];
    conv_hwc(&input, ishape, &DenseWeights::new(&weights), filter, &params, &stage, &mut got, oshape).unwrap();

    for n in 0..2 {
        for oy in 0..5 {
            for ox in 0..4 {
                for co in 0..4 {
                    let mut acc = bias[co];
                    for ky in 0..3 {
                        for kx in 0..3 {
                            let (iy, ix) = ((oy + ky) as i64 - 1, (ox + kx) as i64 - 1);
                            if iy < 0 || ix < 0 || iy >= 5 || ix >= 4 {
                                continue;
                            }
                            for ci in 0..3 {
                                let x = i64::from(input[ishape.index(n, iy as usize, ix as usize, ci)]);
                                acc += x * i64::from(weights[filter.index(co, ky, kx, ci)]);
                            }
                        }
                    }
                    let expected = requantize_wide(acc, mults[co], shifts[co]).clamp(-32768, 32767);
                    assert_eq!(i32::from(got[oshape.index(n, oy, ox, co)]), expected);
                }
            }
        }
    }
}

#[test]
fn test_random_pointwise_and_transpose() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    // pointwise equals generic conv with a 1x1 filter
    let ishape = Shape4::new(2, 6, 5, 8);
    let filter = FilterShape::new(6, 1, 1, 8);
    let params = ConvParams::new().with_stride(2, 1).with_input_offset(-17);
    let oshape = Shape4::new(2, 6, 3, 6);
    let input = random_i8(&mut rng, ishape.element_count());
    let weights = random_i8(&mut rng, filter.element_count());
    let (mults, shifts) = random_quant(&mut rng, 6);
    let stage = AffineOutput::<i32>::new(Requantizer::per_channel(&mults, &shifts));

    let mut a = vec![0i8; oshape.element_count()];
    let mut b = vec![0i8; oshape.element_count()];
    conv_1x1(&input, ishape, &DenseWeights::new(&weights), filter, &params, &stage, &mut a, oshape).unwrap();
    conv_hwc(&input, ishape, &DenseWeights::new(&weights), filter, &params, &stage, &mut b, oshape).unwrap();
    assert_eq!(a, b);

    // stride-1 transposed conv with full padding equals conv with the flipped kernel
    let ishape = Shape4::hwc(4, 4, 2);
    let filter = FilterShape::new(3, 3, 3, 2);
    let weights = random_i8(&mut rng, filter.element_count());
    let input = random_i8(&mut rng, ishape.element_count());
    let mut flipped = vec![0i8; weights.len()];
    for co in 0..3 {
        for ky in 0..3 {
            for kx in 0..3 {
                for ci in 0..2 {
                    flipped[filter.index(co, 2 - ky, 2 - kx, ci)] = weights[filter.index(co, ky, kx, ci)];
                }
            }
        }
    }
    let oshape = Shape4::hwc(4, 4, 3);
    let stage = AffineOutput::<i32>::new(Requantizer::per_tensor(1 << 30, -6));
    let params = ConvParams::new().with_padding(1, 1).with_input_offset(11);

    let scratch_bytes = transpose_conv_buffer_size::<i32>(ishape, filter, oshape);
    let mut scratch = vec![0i32; scratch_bytes / 4];
    let mut transposed = vec![0i8; oshape.element_count()];
    let mut direct = vec![0i8; oshape.element_count()];
    transpose_conv(
        &input,
        ishape,
        &DenseWeights::new(&weights),
        filter,
        &params,
        &stage,
        &mut scratch,
        &mut transposed,
        oshape,
    )
    .unwrap();
    conv_hwc(&input, ishape, &DenseWeights::new(&flipped), filter, &params, &stage, &mut direct, oshape).unwrap();
    assert_eq!(transposed, direct);
}

#[test]
fn test_saturation_boundary() {
    // accumulators one step past each bound land exactly on the bound
    let stage = AffineOutput::<i32>::new(Requantizer::per_tensor(1 << 30, 0))
        .with_output_offset(0)
        .with_activation(ActivationRange::new(-30, 40));
    let input = [1i8];
    for (w, expected) in [(80i8, 40i8), (82, 40), (78, 39), (-60, -30), (-62, -30), (-58, -29)] {
        let weights = [w];
        let mut out = [0i8; 1];
        fully_connected(&input, 1, &DenseWeights::new(&weights), 1, 1, &MatmulParams::default(), &stage, &mut out)
            .unwrap();
        assert_eq!(out[0], expected, "weight {w}");
    }
}
