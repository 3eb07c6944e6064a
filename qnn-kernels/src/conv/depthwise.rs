// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Depthwise convolution with a channel multiplier.

use crate::config::ConvParams;
use crate::element::{Accumulator, Element};
use crate::error::{ensure_len, KernelError, Result};
use crate::shape::{Shape4, Spatial};
use crate::stage::OutputStage;
use crate::weights::WeightStore;

use super::{check_input_offset, check_tensors, TapRange};

/// Depthwise convolution: each input channel feeds `ch_mult` output channels.
///
/// `ch_mult = output.channels / input.channels`, and output channel
/// `ci * ch_mult + m` reads only input channel `ci`. Weights are laid out
/// `[kernel.y][kernel.x][out_channels]`, output channel innermost, which for
/// packed 4-bit weights means consecutive channels share a byte.
///
/// # Errors
///
/// Returns [`KernelError::GroupMismatch`] if output channels are not a
/// multiple of input channels, and the usual parameter and buffer errors.
#[allow(clippy::too_many_arguments)]
pub fn depthwise_conv_hwc<I, W, O, S>(
    input: &[I],
    input_shape: Shape4,
    weights: &W,
    kernel: Spatial,
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
    let in_ch = input_shape.channels;
    let out_ch = output_shape.channels;
    if in_ch == 0 || out_ch % in_ch != 0 {
        tracing::warn!(in_ch, out_ch, "depthwise output channels not a multiple of input");
        return Err(KernelError::GroupMismatch {
            in_channels: in_ch,
            out_channels: out_ch,
            filter_channels: 1,
        });
    }
    params.validate()?;
    check_input_offset::<I>(params)?;
    check_tensors(input, &input_shape, output, &output_shape)?;
    ensure_len("weights", kernel.x * kernel.y * out_ch, weights.element_count())?;
    stage.check_channels(out_ch)?;

    let ch_mult = out_ch / in_ch;
    let lhs_step = params.dilation.x * in_ch;

    for n in 0..input_shape.batch {
        for oy in 0..output_shape.height {
            let rows = TapRange::new(
                oy,
                params.stride.y,
                params.padding.y,
                params.dilation.y,
                kernel.y,
                input_shape.height,
            );
            for ox in 0..output_shape.width {
                let cols = TapRange::new(
                    ox,
                    params.stride.x,
                    params.padding.x,
                    params.dilation.x,
                    kernel.x,
                    input_shape.width,
                );
                let base = output_shape.index(n, oy, ox, 0);
                let pixel = &mut output[base..base + out_ch];
                if cols.is_empty() {
                    for (co, out) in pixel.iter_mut().enumerate() {
                        *out = stage.finish(stage.initial(co), co);
                    }
                    continue;
                }
                let first_col = cols.input_index(cols.start);

                for (co, out) in pixel.iter_mut().enumerate() {
                    let ci = co / ch_mult;
                    let mut acc = stage.initial(co);
                    for ky in rows.taps() {
                        let iy = rows.input_index(ky);
                        acc = acc.combine(weights.dot_strided(
                            input,
                            input_shape.index(n, iy, first_col, ci),
                            lhs_step,
                            (ky * kernel.x + cols.start) * out_ch + co,
                            out_ch,
                            cols.len(),
                            params.input_offset,
                        ));
                    }
                    *out = stage.finish(acc, co);
                }
            }
        }
    }

    Ok(())
}

/// Scratch bytes needed by [`depthwise_conv_hwc`]. Always zero.
#[must_use]
pub const fn depthwise_buffer_size(_input_shape: Shape4, _kernel: Spatial, _output_shape: Shape4) -> usize {
    0
}
