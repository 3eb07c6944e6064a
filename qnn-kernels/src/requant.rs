//! Fixed-point requantization arithmetic.
//!
//! Two independent output conventions live here:
//!
//! - **Affine** (`requantize`, `requantize_wide`): a Q31 multiplier and a
//!   signed shift approximate a real scale factor. Positive shifts scale the
//!   accumulator up before the doubling high multiply, negative shifts are a
//!   rounding right shift afterwards.
//! - **Shift** (`ShiftScale`, `BiasShift`): plain arithmetic shifts and an
//!   integer scale with a half-LSB rounding term. No zero points.
//!
//! Neither convention clamps to activation bounds; output stages do that.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Largest shift magnitude a 32-bit requantization honours.
pub const MAX_SHIFT: i32 = 31;

/// Rounding doubling high multiply: `round(a * b / 2^31)`.
///
/// Ties round away from zero. The single overflowing input pair,
/// `i32::MIN * i32::MIN`, saturates to `i32::MAX`.
#[must_use]
#[inline]
pub const fn doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let product = a as i64 * b as i64;
    let half = 1i64 << 30;
    let rounded = if product >= 0 {
        (product + half) >> 31
    } else {
        -((half - product) >> 31)
    };
    rounded as i32
}

/// Rounding arithmetic right shift: `round(dividend / 2^exponent)`.
///
/// Midpoints round away from zero. `exponent` is clamped to `0..=31`.
#[must_use]
#[inline]
pub const fn divide_by_power_of_two(dividend: i32, exponent: u32) -> i32 {
    let exponent = if exponent > 31 { 31 } else { exponent };
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = dividend & mask;
    let result = dividend >> exponent;
    let threshold = (mask >> 1) + if result < 0 { 1 } else { 0 };
    if remainder > threshold {
        result + 1
    } else {
        result
    }
}

/// 64-bit counterpart of [`divide_by_power_of_two`], exponent clamped to `0..=63`.
#[must_use]
#[inline]
pub const fn divide_by_power_of_two_wide(dividend: i64, exponent: u32) -> i64 {
    let exponent = if exponent > 63 { 63 } else { exponent };
    let mask = ((1i128 << exponent) - 1) as i64;
    let remainder = dividend & mask;
    let result = dividend >> exponent;
    let threshold = (mask >> 1) + if result < 0 { 1 } else { 0 };
    if remainder > threshold {
        result + 1
    } else {
        result
    }
}

#[inline]
const fn split_shift(shift: i32) -> (u32, u32) {
    let left = if shift > 0 { shift } else { 0 };
    let right = if shift < 0 { -(shift as i64) } else { 0 };
    let left = if left > MAX_SHIFT { MAX_SHIFT } else { left };
    let right = if right > MAX_SHIFT as i64 { MAX_SHIFT as i64 } else { right };
    (left as u32, right as u32)
}

/// Requantize a 32-bit accumulator: `acc * multiplier / 2^31` scaled by `2^shift`.
///
/// ```rust
/// use qnn_kernels::requant::requantize;
///
/// // multiplier 2^30 encodes 0.5
/// assert_eq!(requantize(7, 1 << 30, 0), 4);
/// assert_eq!(requantize(-7, 1 << 30, 0), -4);
/// assert_eq!(requantize(100, 1 << 30, -2), 13);
/// ```
#[must_use]
#[inline]
pub const fn requantize(acc: i32, multiplier: i32, shift: i32) -> i32 {
    let (left, right) = split_shift(shift);
    let scaled = doubling_high_mul(acc.wrapping_shl(left), multiplier);
    divide_by_power_of_two(scaled, right)
}

/// Doubling high multiply of a 64-bit value by a Q31 multiplier.
///
/// Computed in 128 bits; the result saturates to the `i64` range.
#[must_use]
#[inline]
pub const fn doubling_high_mul_wide(a: i64, multiplier: i32) -> i64 {
    let product = a as i128 * multiplier as i128;
    let half = 1i128 << 30;
    let rounded = if product >= 0 {
        (product + half) >> 31
    } else {
        -((half - product) >> 31)
    };
    saturate_i64(rounded)
}

#[inline]
const fn saturate_i64(value: i128) -> i64 {
    if value > i64::MAX as i128 {
        i64::MAX
    } else if value < i64::MIN as i128 {
        i64::MIN
    } else {
        value as i64
    }
}

#[inline]
const fn saturate_i32(value: i64) -> i32 {
    if value > i32::MAX as i64 {
        i32::MAX
    } else if value < i32::MIN as i64 {
        i32::MIN
    } else {
        value as i32
    }
}

/// Requantize a 64-bit accumulator to a 32-bit value.
///
/// Matches [`requantize`] bit for bit whenever `acc << max(shift, 0)` fits in
/// an `i32`. Results outside the `i32` range saturate.
#[must_use]
#[inline]
pub const fn requantize_wide(acc: i64, multiplier: i32, shift: i32) -> i32 {
    let (left, right) = split_shift(shift);
    let scaled = doubling_high_mul_wide(acc.wrapping_shl(left), multiplier);
    saturate_i32(divide_by_power_of_two_wide(scaled, right))
}

/// Split a Q31 multiplier into its Q30 half and the dropped low bit.
///
/// `multiplier == 2 * high + low` with `low` either 0 or 1.
#[must_use]
#[inline]
pub const fn reduce_multiplier(multiplier: i32) -> (i32, i32) {
    (multiplier >> 1, multiplier & 1)
}

const HALF_Q31: i64 = 1 << 30;

/// `value * (2 * high + low)` in 64 bits, with headroom for the Q31 rounding term.
const fn reduced_product(value: i64, high: i32, low: i32) -> Option<i64> {
    let Some(product) = value.checked_mul(high as i64) else {
        return None;
    };
    let Some(product) = product.checked_mul(2) else {
        return None;
    };
    let Some(product) = product.checked_add(if low == 0 { 0 } else { value }) else {
        return None;
    };
    if product > i64::MAX - HALF_Q31 || product < HALF_Q31 - i64::MAX {
        return None;
    }
    Some(product)
}

/// Requantize a 64-bit accumulator through the reduced (Q30) multiplier.
///
/// The product is formed as `value * high * 2 + value * low`, so it stays in
/// 64-bit arithmetic whenever it fits and falls back to a 128-bit multiply
/// otherwise. The low bit is kept, and the result equals
/// [`requantize_wide`] for every multiplier.
///
/// ```rust
/// use qnn_kernels::requant::{requantize_wide, requantize_wide_reduced};
///
/// let (acc, m) = (-4_261_412_864i64, 1_073_741_825);
/// assert_eq!(requantize_wide_reduced(acc, m, 0), requantize_wide(acc, m, 0));
/// ```
#[must_use]
#[inline]
pub const fn requantize_wide_reduced(acc: i64, multiplier: i32, shift: i32) -> i32 {
    let (left, right) = split_shift(shift);
    let value = acc.wrapping_shl(left);
    let (high, low) = reduce_multiplier(multiplier);
    let scaled = match reduced_product(value, high, low) {
        Some(product) if product >= 0 => (product + HALF_Q31) >> 31,
        Some(product) => -((HALF_Q31 - product) >> 31),
        None => doubling_high_mul_wide(value, multiplier),
    };
    saturate_i32(divide_by_power_of_two_wide(scaled, right))
}

/// A Q31 multiplier with its power-of-two shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantMultiplier {
    /// Q31 fraction in `[-1, 1)`.
    pub multiplier: i32,
    /// Positive: left shift before the multiply. Negative: rounding right shift after it.
    pub shift: i32,
}

impl QuantMultiplier {
    /// Identity scale (`multiplier` close to 1, no shift).
    pub const IDENTITY: Self = Self::new(i32::MAX, 0);

    /// Create a multiplier from raw parts.
    #[must_use]
    pub const fn new(multiplier: i32, shift: i32) -> Self {
        Self { multiplier, shift }
    }

    /// Derive a multiplier and shift approximating a positive real scale.
    ///
    /// The multiplier lands in `[2^30, 2^31)`. A zero scale yields a zero
    /// multiplier. Scales too small for a 31-bit right shift collapse to zero.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ScaleOutOfRange`] for negative, non-finite, or
    /// scales needing a left shift beyond 31 bits.
    pub fn from_scale(scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale < 0.0 {
            return Err(KernelError::ScaleOutOfRange(scale));
        }
        if scale == 0.0 {
            return Ok(Self::new(0, 0));
        }

        let mut exponent = scale.log2().floor() as i32 + 1;
        let mut mantissa = scale / f64::powi(2.0, exponent);
        // log2 can land one off near powers of two
        while mantissa >= 1.0 {
            mantissa /= 2.0;
            exponent += 1;
        }
        while mantissa < 0.5 {
            mantissa *= 2.0;
            exponent -= 1;
        }

        let mut fixed = (mantissa * f64::from(1u32 << 31)).round() as i64;
        if fixed == 1i64 << 31 {
            fixed /= 2;
            exponent += 1;
        }
        if exponent < -MAX_SHIFT {
            return Ok(Self::new(0, 0));
        }
        if exponent > MAX_SHIFT - 1 {
            return Err(KernelError::ScaleOutOfRange(scale));
        }
        Ok(Self::new(fixed as i32, exponent))
    }

    /// Real scale this multiplier represents.
    #[must_use]
    pub fn to_scale(self) -> f64 {
        f64::from(self.multiplier) / f64::from(1u32 << 31) * f64::powi(2.0, self.shift)
    }

    /// Apply to a 32-bit accumulator.
    #[must_use]
    #[inline]
    pub const fn apply(self, acc: i32) -> i32 {
        requantize(acc, self.multiplier, self.shift)
    }

    /// Apply to a 64-bit accumulator.
    ///
    /// Goes through [`requantize_wide_reduced`], which equals
    /// [`requantize_wide`] and avoids the 128-bit multiply for typical sums.
    #[must_use]
    #[inline]
    pub const fn apply_wide(self, acc: i64) -> i32 {
        requantize_wide_reduced(acc, self.multiplier, self.shift)
    }
}

/// Half-LSB rounding term for a right shift of `shift` bits.
#[must_use]
#[inline]
pub const fn round_term(shift: u32) -> i64 {
    if shift == 0 {
        0
    } else {
        1i64 << (shift - 1)
    }
}

/// Two-stage shift output scaling: `((acc >> pre) * scale + round(post)) >> post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftScale {
    /// Right shift applied to the raw accumulator.
    pub pre_rshift: u32,
    /// Integer scale applied between the shifts.
    pub scale: i32,
    /// Rounding right shift applied last.
    pub post_rshift: u32,
}

impl Default for ShiftScale {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}

impl ShiftScale {
    /// Create a two-stage shift.
    #[must_use]
    pub const fn new(pre_rshift: u32, scale: i32, post_rshift: u32) -> Self {
        Self {
            pre_rshift,
            scale,
            post_rshift,
        }
    }

    /// Validate shift amounts.
    ///
    /// # Errors
    ///
    /// Returns an error if either shift is 32 or more.
    pub fn validate(&self) -> Result<()> {
        if self.pre_rshift > 31 || self.post_rshift > 31 {
            return Err(KernelError::InvalidConfig(format!(
                "shift amounts must be below 32 (pre {}, post {})",
                self.pre_rshift, self.post_rshift
            )));
        }
        Ok(())
    }

    /// Scale an accumulator. Saturation to the output width is the caller's job.
    #[must_use]
    #[inline]
    pub const fn apply(self, acc: i64) -> i64 {
        let scaled = (acc >> self.pre_rshift).wrapping_mul(self.scale as i64);
        scaled.wrapping_add(round_term(self.post_rshift)) >> self.post_rshift
    }
}

/// Bias-shift scaling: bias pre-shifted left, accumulator rounded right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BiasShift {
    /// Left shift applied to each bias entry.
    pub bias_lshift: u32,
    /// Rounding right shift applied to the accumulator.
    pub out_rshift: u32,
}

impl BiasShift {
    /// Create a bias-shift scaling.
    #[must_use]
    pub const fn new(bias_lshift: u32, out_rshift: u32) -> Self {
        Self {
            bias_lshift,
            out_rshift,
        }
    }

    /// Validate shift amounts.
    ///
    /// # Errors
    ///
    /// Returns an error if either shift is 32 or more.
    pub fn validate(&self) -> Result<()> {
        if self.bias_lshift > 31 || self.out_rshift > 31 {
            return Err(KernelError::InvalidConfig(format!(
                "shift amounts must be below 32 (bias {}, out {})",
                self.bias_lshift, self.out_rshift
            )));
        }
        Ok(())
    }

    /// Starting accumulator for a bias entry.
    #[must_use]
    #[inline]
    pub const fn initial(self, bias: i64) -> i64 {
        bias.wrapping_shl(self.bias_lshift)
            .wrapping_add(round_term(self.out_rshift))
    }

    /// Final right shift. Saturation to the output width is the caller's job.
    #[must_use]
    #[inline]
    pub const fn apply(self, acc: i64) -> i64 {
        acc >> self.out_rshift
    }
}
