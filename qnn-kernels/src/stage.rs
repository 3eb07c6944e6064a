// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Output stages: how an accumulator starts and how it becomes an output.
//!
//! Every kernel accumulates the same way and hands the final sum to an
//! [`OutputStage`]. The stage owns the bias and the quantization convention:
//!
//! ```text
//!   stage.initial(ch)  ->  acc += products  ->  stage.finish(acc, ch)
//! ```
//!
//! - [`AffineOutput`]: offset convention, multiplier/shift requantization,
//!   output zero point, activation clamp.
//! - [`ShiftOutput`]: shift convention with a two-stage shift and scale.
//! - [`BiasShiftOutput`]: shift convention with a left-shifted bias.

use crate::config::ActivationRange;
use crate::element::{Accumulator, Element};
use crate::error::{KernelError, Result};
use crate::requant::{BiasShift, QuantMultiplier, ShiftScale};

/// Per-tensor or per-channel requantization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requantizer<'a> {
    /// One multiplier and shift for every channel.
    PerTensor(QuantMultiplier),
    /// One multiplier and shift per output channel.
    PerChannel {
        /// Q31 multipliers.
        multipliers: &'a [i32],
        /// Shifts, same convention as [`QuantMultiplier::shift`].
        shifts: &'a [i32],
    },
}

impl<'a> Requantizer<'a> {
    /// Per-tensor parameters.
    #[must_use]
    pub const fn per_tensor(multiplier: i32, shift: i32) -> Self {
        Self::PerTensor(QuantMultiplier::new(multiplier, shift))
    }

    /// Per-channel parameters.
    #[must_use]
    pub const fn per_channel(multipliers: &'a [i32], shifts: &'a [i32]) -> Self {
        Self::PerChannel {
            multipliers,
            shifts,
        }
    }

    /// Parameters for `channel`.
    ///
    /// Callers validate with [`Requantizer::check_channels`] first.
    #[must_use]
    #[inline]
    pub fn get(&self, channel: usize) -> QuantMultiplier {
        match *self {
            Self::PerTensor(q) => q,
            Self::PerChannel {
                multipliers,
                shifts,
            } => QuantMultiplier::new(multipliers[channel], shifts[channel]),
        }
    }

    /// Check that per-channel arrays hold exactly `channels` entries.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ChannelCount`] on a length mismatch.
    pub fn check_channels(&self, channels: usize) -> Result<()> {
        if let Self::PerChannel {
            multipliers,
            shifts,
        } = self
        {
            for len in [multipliers.len(), shifts.len()] {
                if len != channels {
                    return Err(KernelError::ChannelCount {
                        expected: channels,
                        actual: len,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Starting value and finishing step for one output element.
pub trait OutputStage<A: Accumulator> {
    /// Accumulator value before any products are added.
    fn initial(&self, channel: usize) -> A;

    /// Turn a finished accumulator into an output element.
    fn finish<O: Element>(&self, acc: A, channel: usize) -> O;

    /// Check per-channel arrays against the kernel's output channel count.
    ///
    /// # Errors
    ///
    /// Returns an error if bias or parameter arrays have the wrong length.
    fn check_channels(&self, channels: usize) -> Result<()>;
}

fn check_bias<A>(bias: Option<&[A]>, channels: usize) -> Result<()> {
    match bias {
        Some(b) if b.len() < channels => Err(KernelError::ChannelCount {
            expected: channels,
            actual: b.len(),
        }),
        _ => Ok(()),
    }
}

/// Offset-convention output: requantize, add zero point, clamp.
#[derive(Debug, Clone, Copy)]
pub struct AffineOutput<'a, A> {
    bias: Option<&'a [A]>,
    requant: Requantizer<'a>,
    output_offset: i32,
    activation: ActivationRange,
}

impl<'a, A: Accumulator> AffineOutput<'a, A> {
    /// No bias, zero output offset, no clamp beyond the output type.
    #[must_use]
    pub const fn new(requant: Requantizer<'a>) -> Self {
        Self {
            bias: None,
            requant,
            output_offset: 0,
            activation: ActivationRange::unbounded(),
        }
    }

    /// Set the per-channel bias.
    #[must_use]
    pub const fn with_bias(mut self, bias: &'a [A]) -> Self {
        self.bias = Some(bias);
        self
    }

    /// Set an optional bias.
    #[must_use]
    pub const fn with_optional_bias(mut self, bias: Option<&'a [A]>) -> Self {
        self.bias = bias;
        self
    }

    /// Set the output zero point.
    #[must_use]
    pub const fn with_output_offset(mut self, offset: i32) -> Self {
        self.output_offset = offset;
        self
    }

    /// Set the activation clamp.
    #[must_use]
    pub const fn with_activation(mut self, activation: ActivationRange) -> Self {
        self.activation = activation;
        self
    }

    /// The requantization parameters.
    #[must_use]
    pub const fn requantizer(&self) -> Requantizer<'a> {
        self.requant
    }
}

impl<A: Accumulator> OutputStage<A> for AffineOutput<'_, A> {
    #[inline]
    fn initial(&self, channel: usize) -> A {
        self.bias.map_or_else(A::default, |b| b[channel])
    }

    #[inline]
    fn finish<O: Element>(&self, acc: A, channel: usize) -> O {
        let scaled = i64::from(acc.requantize(self.requant.get(channel)));
        let shifted = scaled + i64::from(self.output_offset);
        O::saturate(self.activation.clamp(shifted))
    }

    fn check_channels(&self, channels: usize) -> Result<()> {
        self.activation.validate()?;
        self.requant.check_channels(channels)?;
        check_bias(self.bias, channels)
    }
}

/// Shift-convention output: `((acc >> pre) * scale + round) >> post`, saturated.
#[derive(Debug, Clone, Copy)]
pub struct ShiftOutput<'a, A> {
    bias: Option<&'a [A]>,
    scale: ShiftScale,
}

impl<'a, A: Accumulator> ShiftOutput<'a, A> {
    /// Create a stage without bias.
    #[must_use]
    pub const fn new(scale: ShiftScale) -> Self {
        Self { bias: None, scale }
    }

    /// Set the per-channel bias, added before the shifts.
    #[must_use]
    pub const fn with_bias(mut self, bias: &'a [A]) -> Self {
        self.bias = Some(bias);
        self
    }
}

impl<A: Accumulator> OutputStage<A> for ShiftOutput<'_, A> {
    #[inline]
    fn initial(&self, channel: usize) -> A {
        self.bias.map_or_else(A::default, |b| b[channel])
    }

    #[inline]
    fn finish<O: Element>(&self, acc: A, _channel: usize) -> O {
        O::saturate(self.scale.apply(acc.to_i64()))
    }

    fn check_channels(&self, channels: usize) -> Result<()> {
        self.scale.validate()?;
        check_bias(self.bias, channels)
    }
}

/// Bias-shift output: accumulator starts at `(bias << l) + round(r)`, ends `>> r`.
#[derive(Debug, Clone, Copy)]
pub struct BiasShiftOutput<'a, A> {
    bias: Option<&'a [A]>,
    shift: BiasShift,
}

impl<'a, A: Accumulator> BiasShiftOutput<'a, A> {
    /// Create a stage without bias.
    #[must_use]
    pub const fn new(shift: BiasShift) -> Self {
        Self { bias: None, shift }
    }

    /// Set the per-channel bias.
    #[must_use]
    pub const fn with_bias(mut self, bias: &'a [A]) -> Self {
        self.bias = Some(bias);
        self
    }
}

impl<A: Accumulator> OutputStage<A> for BiasShiftOutput<'_, A> {
    #[inline]
    fn initial(&self, channel: usize) -> A {
        let bias = self.bias.map_or(0, |b| b[channel].to_i64());
        A::from_i64(self.shift.initial(bias))
    }

    #[inline]
    fn finish<O: Element>(&self, acc: A, _channel: usize) -> O {
        O::saturate(self.shift.apply(acc.to_i64()))
    }

    fn check_channels(&self, channels: usize) -> Result<()> {
        self.shift.validate()?;
        check_bias(self.bias, channels)
    }
}
