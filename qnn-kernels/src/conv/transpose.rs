// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Transposed convolution by scatter-accumulation.

use crate::config::ConvParams;
use crate::element::{Accumulator, Element};
use crate::error::{ensure_len, KernelError, Result};
use crate::shape::{FilterShape, Shape4};
use crate::stage::OutputStage;
use crate::weights::WeightStore;

use super::{check_channel_match, check_input_offset, check_tensors, TapRange};

/// Transposed convolution of an NHWC tensor.
///
/// Input pixel `(iy, ix)` contributes to output `(iy * stride.y - padding.y +
/// ky, ix * stride.x - padding.x + kx)` through filter tap `(ky, kx)`;
/// contributions falling outside the output are dropped. Filters are
/// `[out_channels][height][width][in_channels]`.
///
/// Sums are gathered in `scratch`, one accumulator per output element of a
/// single batch entry, and the stage's bias is added after the scatter.
/// Size it with [`transpose_conv_buffer_size`].
///
/// # Errors
///
/// Returns [`KernelError::UnsupportedShape`] for dilation other than 1, and
/// the usual channel and buffer errors, including a short `scratch`.
#[allow(clippy::too_many_arguments)]
pub fn transpose_conv<I, W, O, S>(
    input: &[I],
    input_shape: Shape4,
    weights: &W,
    filter: FilterShape,
    params: &ConvParams,
    stage: &S,
    scratch: &mut [W::Acc],
    output: &mut [O],
    output_shape: Shape4,
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    params.validate()?;
    check_input_offset::<I>(params)?;
    if params.dilation.x != 1 || params.dilation.y != 1 {
        tracing::warn!(
            dilation_x = params.dilation.x,
            dilation_y = params.dilation.y,
            "transposed convolution rejects dilation"
        );
        return Err(KernelError::UnsupportedShape(format!(
            "transposed convolution needs dilation 1, got ({}, {})",
            params.dilation.x, params.dilation.y
        )));
    }
    check_channel_match(input_shape.channels, filter.in_channels)?;
    check_channel_match(output_shape.channels, filter.out_channels)?;
    check_tensors(input, &input_shape, output, &output_shape)?;
    ensure_len("weights", filter.element_count(), weights.element_count())?;
    let plane = output_shape.plane_len();
    ensure_len("scratch", plane, scratch.len())?;
    stage.check_channels(output_shape.channels)?;

    let in_ch = input_shape.channels;
    let out_ch = output_shape.channels;
    let scratch = &mut scratch[..plane];

    for n in 0..input_shape.batch {
        scratch.fill(W::Acc::default());

        for iy in 0..input_shape.height {
            let rows = TapRange::new(iy, params.stride.y, params.padding.y, 1, filter.height, output_shape.height);
            for ix in 0..input_shape.width {
                let cols = TapRange::new(ix, params.stride.x, params.padding.x, 1, filter.width, output_shape.width);
                let start = input_shape.index(n, iy, ix, 0);
                let pixel = &input[start..start + in_ch];

                for ky in rows.taps() {
                    let oy = rows.input_index(ky);
                    for kx in cols.taps() {
                        let ox = cols.input_index(kx);
                        let base = (oy * output_shape.width + ox) * out_ch;
                        for (co, acc) in scratch[base..base + out_ch].iter_mut().enumerate() {
                            let partial = weights.dot(pixel, filter.index(co, ky, kx, 0), params.input_offset, 0);
                            *acc = acc.combine(partial);
                        }
                    }
                }
            }
        }

        let out_start = n * plane;
        let dst = &mut output[out_start..out_start + plane];
        for (i, (out, &acc)) in dst.iter_mut().zip(scratch.iter()).enumerate() {
            let co = i % out_ch;
            *out = stage.finish(stage.initial(co).combine(acc), co);
        }
    }

    Ok(())
}

/// Scratch bytes needed by [`transpose_conv`] with accumulator `A`.
///
/// One accumulator per element of a single batch entry of the output.
#[must_use]
pub const fn transpose_conv_buffer_size<A: Accumulator>(
    _input_shape: Shape4,
    _filter: FilterShape,
    output_shape: Shape4,
) -> usize {
    output_shape.plane_len() * A::BYTES
}
