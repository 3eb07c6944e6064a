// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Quantized convolution kernels over NHWC tensors.
//!
//! # Kernels
//!
//! | Kernel | Weights layout | Notes |
//! |--------|----------------|-------|
//! | [`conv_hwc`] | `[co][ky][kx][ci/groups]` | dense, grouped, dilated, any [`WeightStore`] |
//! | [`conv_hwc_shift_fast`] | same | shift convention, channel constraints |
//! | [`depthwise_conv_hwc`] | `[ky][kx][co]` | channel multiplier, any [`WeightStore`] |
//! | [`conv_1x1`] | `[co][ci]` | reduces to [`crate::matmul::mat_mult_nt_t`] |
//! | [`conv_1x1_shift_fast`] | `[co][ci]` | shift convention, unit stride only |
//! | [`transpose_conv`] | `[co][ky][kx][ci]` | needs accumulator scratch |
//!
//! Every kernel has a `*_buffer_size` query returning the scratch bytes it
//! needs. Only transposed convolution needs any.
//!
//! # Boundary handling
//!
//! Out-of-range taps are never tested per element. [`TapRange`] clips the
//! kernel window analytically, once per output row or column, and the loops
//! visit only taps that land inside the input.
//!
//! [`WeightStore`]: crate::weights::WeightStore

mod depthwise;
mod generic;
mod pointwise;
mod transpose;

use std::ops::Range;

pub use depthwise::{depthwise_buffer_size, depthwise_conv_hwc};
pub use generic::{conv_hwc, conv_hwc_buffer_size, conv_hwc_shift_fast};
pub use pointwise::{conv_1x1, conv_1x1_buffer_size, conv_1x1_shift_fast};
pub use transpose::{transpose_conv, transpose_conv_buffer_size};

use crate::config::ConvParams;
use crate::element::Element;
use crate::error::{ensure_len, KernelError, Result};
use crate::shape::Shape4;

/// The kernel taps along one axis that fall inside the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapRange {
    /// First valid tap.
    pub start: usize,
    /// One past the last valid tap.
    pub end: usize,
    origin: isize,
    dilation: usize,
}

#[inline]
fn ceil_div(numerator: isize, denominator: isize) -> isize {
    let q = numerator.div_euclid(denominator);
    if numerator.rem_euclid(denominator) == 0 {
        q
    } else {
        q + 1
    }
}

impl TapRange {
    /// Clip a `kernel`-tap window for output position `out_pos`.
    ///
    /// Tap `k` reads input `out_pos * stride - padding + k * dilation`; the
    /// result keeps the taps for which that lands in `0..input_extent`.
    #[must_use]
    pub fn new(
        out_pos: usize,
        stride: usize,
        padding: usize,
        dilation: usize,
        kernel: usize,
        input_extent: usize,
    ) -> Self {
        let origin = (out_pos * stride) as isize - padding as isize;
        let d = dilation.max(1) as isize;
        let start = if origin < 0 { ceil_div(-origin, d) } else { 0 };
        let end = ceil_div(input_extent as isize - origin, d).clamp(0, kernel as isize);
        let start = (start as usize).min(kernel);
        let end = (end as usize).max(start);
        Self {
            start,
            end,
            origin,
            dilation,
        }
    }

    /// Valid taps.
    #[must_use]
    #[inline]
    pub fn taps(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of valid taps.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if no tap lands inside the input.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Input coordinate read by a valid `tap`.
    #[must_use]
    #[inline]
    pub fn input_index(&self, tap: usize) -> usize {
        (self.origin + (tap * self.dilation) as isize) as usize
    }
}

/// Shared entry checks: matching batch, buffers long enough.
pub(crate) fn check_tensors<I, O>(
    input: &[I],
    input_shape: &Shape4,
    output: &[O],
    output_shape: &Shape4,
) -> Result<()> {
    if input_shape.batch != output_shape.batch {
        tracing::warn!(
            input_batch = input_shape.batch,
            output_batch = output_shape.batch,
            "batch mismatch"
        );
        return Err(KernelError::InvalidConfig(format!(
            "input batch {} differs from output batch {}",
            input_shape.batch, output_shape.batch
        )));
    }
    ensure_len("input", input_shape.element_count(), input.len())?;
    ensure_len("output", output_shape.element_count(), output.len())
}

/// Reject an input offset outside the 9-bit range when inputs are 8-bit.
pub(crate) fn check_input_offset<I: Element>(params: &ConvParams) -> Result<()> {
    if I::MAX - I::MIN > 255 {
        return Ok(());
    }
    let checked = params.validate_8bit();
    if checked.is_err() {
        tracing::warn!(input_offset = params.input_offset, "convolution input offset out of range");
    }
    checked
}

/// Reject a channel count mismatch between two places that must agree.
pub(crate) fn check_channel_match(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        tracing::warn!(expected, actual, "channel count mismatch");
        return Err(KernelError::ChannelCount { expected, actual });
    }
    Ok(())
}
