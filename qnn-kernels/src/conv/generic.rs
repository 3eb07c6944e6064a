// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Generic grouped, dilated convolution.

use crate::config::ConvParams;
use crate::element::{Accumulator, Element};
use crate::error::{ensure_len, KernelError, Result};
use crate::shape::{FilterShape, Shape4};
use crate::stage::{OutputStage, ShiftOutput};
use crate::weights::WeightStore;

use super::{check_channel_match, check_input_offset, check_tensors, TapRange};

/// Number of groups implied by the input and filter depths.
///
/// # Errors
///
/// Returns [`KernelError::GroupMismatch`] unless input channels split into
/// whole filter-depth groups and output channels split evenly across them.
pub(crate) fn group_count(
    in_channels: usize,
    out_channels: usize,
    filter_channels: usize,
) -> Result<usize> {
    let mismatch = KernelError::GroupMismatch {
        in_channels,
        out_channels,
        filter_channels,
    };
    if filter_channels == 0 || in_channels % filter_channels != 0 {
        tracing::warn!(in_channels, filter_channels, "input channels do not split into groups");
        return Err(mismatch);
    }
    let groups = in_channels / filter_channels;
    if groups == 0 || out_channels % groups != 0 {
        tracing::warn!(out_channels, groups, "output channels do not split into groups");
        return Err(mismatch);
    }
    Ok(groups)
}

/// Convolve an NHWC tensor with grouped, optionally dilated filters.
///
/// Filters are `[out_channels][height][width][filter.in_channels]`. The group
/// count is `input.channels / filter.in_channels`; output channel `co`
/// convolves with input channels
/// `(co / (out_channels / groups)) * filter.in_channels ..` of the same width.
/// A group count of one is ordinary dense convolution, a filter depth of one
/// with `out_channels == in_channels` is depthwise.
///
/// Each output element is `stage.finish(stage.initial(co) + sum)` where the
/// sum runs over the valid taps of `(in + input_offset) * weight`.
///
/// # Errors
///
/// Returns an error, before writing any output, if the channel counts do not
/// split into equal groups, parameters are invalid, per-channel arrays have
/// the wrong length, or a buffer is too short.
///
/// # Examples
///
/// ```
/// use qnn_kernels::prelude::*;
///
/// // 3x3 input, one channel, 2x2 box filter
/// let input = [1i8, 2, 3, 4, 5, 6, 7, 8, 9];
/// let weights = [1i8; 4];
/// let mut output = [0i8; 4];
///
/// let stage = AffineOutput::<i32>::new(Requantizer::per_tensor(i32::MAX, 0));
/// conv_hwc(
///     &input,
///     Shape4::hwc(3, 3, 1),
///     &DenseWeights::new(&weights),
///     FilterShape::new(1, 2, 2, 1),
///     &ConvParams::new(),
///     &stage,
///     &mut output,
///     Shape4::hwc(2, 2, 1),
/// )
/// .unwrap();
/// assert_eq!(output, [12, 16, 24, 28]);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc<I, W, O, S>(
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
    let groups = group_count(input_shape.channels, output_shape.channels, filter.in_channels)?;
    params.validate()?;
    check_input_offset::<I>(params)?;
    check_channel_match(output_shape.channels, filter.out_channels)?;
    check_tensors(input, &input_shape, output, &output_shape)?;
    ensure_len("weights", filter.element_count(), weights.element_count())?;
    stage.check_channels(output_shape.channels)?;

    let depth = filter.in_channels;
    let per_group = output_shape.channels / groups;
    let out_pixel = output_shape.channels;

    for n in 0..input_shape.batch {
        for oy in 0..output_shape.height {
            let rows = TapRange::new(
                oy,
                params.stride.y,
                params.padding.y,
                params.dilation.y,
                filter.height,
                input_shape.height,
            );
            for ox in 0..output_shape.width {
                let cols = TapRange::new(
                    ox,
                    params.stride.x,
                    params.padding.x,
                    params.dilation.x,
                    filter.width,
                    input_shape.width,
                );
                let base = output_shape.index(n, oy, ox, 0);
                let pixel = &mut output[base..base + out_pixel];

                for (co, out) in pixel.iter_mut().enumerate() {
                    let first_channel = (co / per_group) * depth;
                    let mut acc = stage.initial(co);
                    for ky in rows.taps() {
                        let iy = rows.input_index(ky);
                        for kx in cols.taps() {
                            let start = input_shape.index(n, iy, cols.input_index(kx), first_channel);
                            acc = acc.combine(weights.dot(
                                &input[start..start + depth],
                                filter.index(co, ky, kx, 0),
                                params.input_offset,
                                0,
                            ));
                        }
                    }
                    *out = stage.finish(acc, co);
                }
            }
        }
    }

    Ok(())
}

/// Scratch bytes needed by [`conv_hwc`]. Always zero.
#[must_use]
pub const fn conv_hwc_buffer_size(
    _input_shape: Shape4,
    _filter: FilterShape,
    _output_shape: Shape4,
) -> usize {
    0
}

/// Shift-convention convolution restricted to the shapes the fast path takes.
///
/// Same arithmetic as [`conv_hwc`] with a [`ShiftOutput`] stage and no
/// offsets, but only for `in_channels % 4 == 0` and `out_channels % 2 == 0`.
///
/// # Errors
///
/// Returns [`KernelError::UnsupportedShape`] outside those constraints, and
/// the errors of [`conv_hwc`] otherwise.
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc_shift_fast<I, W, O>(
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
        tracing::warn!(
            in_channels = input_shape.channels,
            out_channels = output_shape.channels,
            "fast shift convolution needs in_channels % 4 == 0 and out_channels % 2 == 0"
        );
        return Err(KernelError::UnsupportedShape(format!(
            "fast shift convolution needs in_channels % 4 == 0 and out_channels % 2 == 0, got {} and {}",
            input_shape.channels, output_shape.channels
        )));
    }
    let params = params.with_input_offset(0);
    conv_hwc(
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
