// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! 1x1 convolution expressed as matrix multiplication.

use crate::config::{ConvParams, MatmulParams};
use crate::element::Element;
use crate::error::{ensure_len, KernelError, Result};
use crate::matmul::{mat_mult_nt_t, mat_mult_nt_t_strided};
use crate::shape::{output_extent, FilterShape, Shape4};
use crate::stage::{OutputStage, ShiftOutput};
use crate::weights::WeightStore;

use super::{check_channel_match, check_input_offset, check_tensors};

fn unsupported(reason: String) -> KernelError {
    tracing::warn!(%reason, "rejecting pointwise convolution");
    KernelError::UnsupportedShape(reason)
}

fn check_pointwise(
    input_shape: &Shape4,
    filter: &FilterShape,
    params: &ConvParams,
    output_shape: &Shape4,
) -> Result<()> {
    params.validate()?;
    if filter.height != 1 || filter.width != 1 {
        return Err(unsupported(format!(
            "pointwise convolution needs a 1x1 kernel, got {}x{}",
            filter.height, filter.width
        )));
    }
    if params.padding.x != 0 || params.padding.y != 0 {
        return Err(unsupported(format!(
            "pointwise convolution takes no padding, got ({}, {})",
            params.padding.x, params.padding.y
        )));
    }
    check_channel_match(input_shape.channels, filter.in_channels)?;
    check_channel_match(output_shape.channels, filter.out_channels)?;

    let expected_h = output_extent(input_shape.height, 1, params.stride.y, 0, 1);
    let expected_w = output_extent(input_shape.width, 1, params.stride.x, 0, 1);
    if output_shape.height != expected_h || output_shape.width != expected_w {
        return Err(unsupported(format!(
            "output {}x{} does not match strided input extent {}x{}",
            output_shape.height, output_shape.width, expected_h, expected_w
        )));
    }
    Ok(())
}

/// 1x1 convolution: every output pixel is its input pixel times `weights^T`.
///
/// Weights are `[out_channels][in_channels]`. With unit stride the whole
/// batch is one `(batch * h * w) x in_channels` matrix multiply; otherwise
/// each output row is a matrix multiply over every `stride.x`-th input
/// pixel of input row `oy * stride.y`. Dilation has no effect on a 1x1
/// kernel.
///
/// # Errors
///
/// Returns [`KernelError::UnsupportedShape`] for padding or a kernel larger
/// than 1x1, and the usual channel and buffer errors.
#[allow(clippy::too_many_arguments)]
pub fn conv_1x1<I, W, O, S>(
    input: &[I],
    input_shape: Shape4,
    weights: &W,
    filter: FilterShape,
    params: &ConvParams,
    stage: &S,
    output: &mut [O],
    output_shape: Shape4,
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    check_pointwise(&input_shape, &filter, params, &output_shape)?;
    check_input_offset::<I>(params)?;
    check_tensors(input, &input_shape, output, &output_shape)?;
    ensure_len("weights", filter.element_count(), weights.element_count())?;
    stage.check_channels(output_shape.channels)?;

    let in_ch = input_shape.channels;
    let out_ch = output_shape.channels;
    let matmul = MatmulParams::new(params.input_offset, 0);

    if params.stride.x == 1 && params.stride.y == 1 {
        let pixels = output_shape.batch * output_shape.height * output_shape.width;
        return mat_mult_nt_t(input, pixels, weights, out_ch, in_ch, &matmul, stage, output);
    }

    let row_len = output_shape.width * out_ch;
    for n in 0..output_shape.batch {
        for oy in 0..output_shape.height {
            let start = input_shape.index(n, oy * params.stride.y, 0, 0);
            let dst = output_shape.index(n, oy, 0, 0);
            mat_mult_nt_t_strided(
                &input[start..],
                output_shape.width,
                in_ch * params.stride.x,
                weights,
                out_ch,
                in_ch,
                &matmul,
                stage,
                &mut output[dst..dst + row_len],
            )?;
        }
    }
    Ok(())
}

/// Scratch bytes needed by [`conv_1x1`]. Always zero.
#[must_use]
pub const fn conv_1x1_buffer_size(_input_shape: Shape4, _filter: FilterShape) -> usize {
    0
}

/// Shift-convention 1x1 convolution restricted to the fast-path shapes.
///
/// Accepts only `in_channels % 4 == 0`, `out_channels % 2 == 0`, a 1x1
/// kernel, no padding and unit stride. The bias on `stage` is added to the
/// accumulator before the shifts.
///
/// # Errors
///
/// Returns [`KernelError::UnsupportedShape`] outside those constraints.
#[allow(clippy::too_many_arguments)]
pub fn conv_1x1_shift_fast<I, W, O>(
    input: &[I],
    input_shape: Shape4,
    weights: &W,
    filter: FilterShape,
    params: &ConvParams,
    stage: &ShiftOutput<'_, W::Acc>,
    output: &mut [O],
    output_shape: Shape4,
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
{
    if input_shape.channels % 4 != 0 || output_shape.channels % 2 != 0 {
        return Err(unsupported(format!(
            "fast 1x1 convolution needs in_channels % 4 == 0 and out_channels % 2 == 0, got {} and {}",
            input_shape.channels, output_shape.channels
        )));
    }
    if params.stride.x != 1 || params.stride.y != 1 {
        return Err(unsupported(format!(
            "fast 1x1 convolution needs unit stride, got ({}, {})",
            params.stride.x, params.stride.y
        )));
    }
    let params = params.with_input_offset(0);
    conv_1x1(
        input,
        input_shape,
        weights,
        filter,
        &params,
        stage,
        output,
        output_shape,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::conv_hwc;
    use crate::requant::ShiftScale;
    use crate::stage::{AffineOutput, Requantizer};
    use crate::weights::DenseWeights;

    fn identity() -> AffineOutput<'static, i32> {
        AffineOutput::new(Requantizer::per_tensor(i32::MAX, 0))
    }

    #[test]
    fn test_equals_per_pixel_dot() {
        // 2x2 pixels, 2 channels in, 2 out
        let input = [1i8, 2, 3, 4, 5, 6, 7, 8];
        let weights = [1i8, -1, 2, 3];
        let mut out = [0i16; 8];
        conv_1x1(
            &input,
            Shape4::hwc(2, 2, 2),
            &DenseWeights::new(&weights),
            FilterShape::new(2, 1, 1, 2),
            &ConvParams::new(),
            &identity(),
            &mut out,
            Shape4::hwc(2, 2, 2),
        )
        .unwrap();

        let expected: Vec<i16> = input
            .chunks(2)
            .flat_map(|px| {
                let (a, b) = (i16::from(px[0]), i16::from(px[1]));
                [a - b, 2 * a + 3 * b]
            })
            .collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn test_strided_matches_generic() {
        let ishape = Shape4::new(2, 5, 5, 3);
        let filter = FilterShape::new(4, 1, 1, 3);
        let params = ConvParams::new().with_stride(2, 3).with_input_offset(7);
        let oshape = Shape4::new(2, 2, 3, 4);
        let input: Vec<i8> = (0..ishape.element_count() as i32).map(|i| (i * 31 % 251 - 125) as i8).collect();
        let weights: Vec<i8> = (0..12).map(|i| (i * 5 % 13 - 6) as i8).collect();
        let bias = [1i32, -2, 3, -4];
        let stage = AffineOutput::new(Requantizer::per_tensor(1_300_000_000, -3)).with_bias(&bias);

        let mut fast = vec![0i8; oshape.element_count()];
        let mut generic = vec![0i8; oshape.element_count()];
        conv_1x1(&input, ishape, &DenseWeights::new(&weights), filter, &params, &stage, &mut fast, oshape).unwrap();
        conv_hwc(&input, ishape, &DenseWeights::new(&weights), filter, &params, &stage, &mut generic, oshape).unwrap();
        assert_eq!(fast, generic);
    }

    #[test]
    fn test_rejects_padding_and_large_kernel() {
        let input = [0i8; 4];
        let weights = [0i8; 4];
        let mut out = [0i8; 4];
        let padded = conv_1x1(
            &input,
            Shape4::hwc(2, 2, 1),
            &DenseWeights::new(&weights),
            FilterShape::new(1, 1, 1, 1),
            &ConvParams::new().with_padding(1, 0),
            &identity(),
            &mut out,
            Shape4::hwc(2, 2, 1),
        );
        assert!(matches!(padded, Err(KernelError::UnsupportedShape(_))));

        let kernel = conv_1x1(
            &input,
            Shape4::hwc(2, 2, 1),
            &DenseWeights::new(&weights),
            FilterShape::new(1, 2, 2, 1),
            &ConvParams::new(),
            &identity(),
            &mut out,
            Shape4::hwc(1, 1, 1),
        );
        assert!(matches!(kernel, Err(KernelError::UnsupportedShape(_))));
    }

    #[test]
    fn test_shift_fast_bias_before_shift() {
        let input = [4u8, 4, 4, 4, 8, 8, 8, 8];
        let weights = [1i8, 1, 1, 1, -1, -1, -1, -1];
        let bias = [2i32, -2];
        let stage = ShiftOutput::new(ShiftScale::new(0, 1, 2)).with_bias(&bias);
        let mut out = [0u8; 4];
        conv_1x1_shift_fast(
            &input,
            Shape4::hwc(1, 2, 4),
            &DenseWeights::new(&weights),
            FilterShape::new(2, 1, 1, 4),
            &ConvParams::new(),
            &stage,
            &mut out,
            Shape4::hwc(1, 2, 2),
        )
        .unwrap();
        // (16 + 2 + 2) >> 2 = 5, (32 + 2 + 2) >> 2 = 9
        assert_eq!(out, [5, 0, 9, 0]);

        let err = conv_1x1_shift_fast(
            &input,
            Shape4::hwc(1, 1, 8),
            &DenseWeights::new(&weights),
            FilterShape::new(1, 1, 1, 8),
            &ConvParams::new(),
            &stage,
            &mut out,
            Shape4::hwc(1, 1, 1),
        );
        assert!(matches!(err, Err(KernelError::UnsupportedShape(_))));
    }
}
