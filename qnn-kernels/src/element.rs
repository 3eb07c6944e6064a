//! Element and accumulator traits shared by every kernel.
//!
//! Kernels are written once against these traits instead of once per
//! precision combination. The pairing of an input type with a weight type
//! ([`MulAcc`]) fixes the accumulator width: 32 bits for 8-bit by 8-bit
//! products, 64 bits as soon as either operand is 16 bits wide.

use std::fmt::Debug;

use crate::requant::QuantMultiplier;

/// A storable quantized element.
pub trait Element: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// Smallest representable value.
    const MIN: i32;
    /// Largest representable value.
    const MAX: i32;

    /// Widen to `i32`.
    fn to_i32(self) -> i32;

    /// Narrow from `i64`, saturating at the type bounds.
    fn saturate(value: i64) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl Element for $ty {
                const MIN: i32 = <$ty>::MIN as i32;
                const MAX: i32 = <$ty>::MAX as i32;

                #[inline]
                fn to_i32(self) -> i32 {
                    i32::from(self)
                }

                #[inline]
                fn saturate(value: i64) -> Self {
                    value.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as $ty
                }
            }
        )*
    };
}

impl_element!(i8, u8, i16);

/// A transient wide accumulator.
pub trait Accumulator: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// Storage size in bytes, used by scratch-buffer queries.
    const BYTES: usize;

    /// Widen an `i32`.
    fn from_i32(value: i32) -> Self;

    /// Truncate an `i64` into the accumulator width.
    fn from_i64(value: i64) -> Self;

    /// Widen to `i64`.
    fn to_i64(self) -> i64;

    /// Multiply-accumulate with wrapping semantics.
    #[must_use]
    fn mac(self, a: i32, b: i32) -> Self;

    /// Wrapping sum of two partial accumulators.
    #[must_use]
    fn combine(self, other: Self) -> Self;

    /// Affine requantization of this accumulator.
    fn requantize(self, quant: QuantMultiplier) -> i32;
}

impl Accumulator for i32 {
    const BYTES: usize = 4;

    #[inline]
    fn from_i32(value: i32) -> Self {
        value
    }

    #[inline]
    fn from_i64(value: i64) -> Self {
        value as i32
    }

    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }

    #[inline]
    fn mac(self, a: i32, b: i32) -> Self {
        self.wrapping_add(a.wrapping_mul(b))
    }

    #[inline]
    fn combine(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    #[inline]
    fn requantize(self, quant: QuantMultiplier) -> i32 {
        quant.apply(self)
    }
}

impl Accumulator for i64 {
    const BYTES: usize = 8;

    #[inline]
    fn from_i32(value: i32) -> Self {
        i64::from(value)
    }

    #[inline]
    fn from_i64(value: i64) -> Self {
        value
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self
    }

    #[inline]
    fn mac(self, a: i32, b: i32) -> Self {
        self.wrapping_add(i64::from(a) * i64::from(b))
    }

    #[inline]
    fn combine(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    #[inline]
    fn requantize(self, quant: QuantMultiplier) -> i32 {
        quant.apply_wide(self)
    }
}

/// An input element type that can be reduced against weights of type `W`.
///
/// Offsets are added to both operands before multiplying. Shift-convention
/// kernels pass zero for both.
pub trait MulAcc<W: Element>: Element {
    /// Accumulator wide enough for this pairing.
    type Acc: Accumulator;

    /// `sum((lhs[i] + lhs_offset) * (rhs[i] + rhs_offset))` over the shorter slice.
    #[inline]
    fn dot(lhs: &[Self], rhs: &[W], lhs_offset: i32, rhs_offset: i32) -> Self::Acc {
        lhs.iter().zip(rhs).fold(Self::Acc::default(), |acc, (&l, &r)| {
            acc.mac(
                l.to_i32().wrapping_add(lhs_offset),
                r.to_i32().wrapping_add(rhs_offset),
            )
        })
    }
}

impl MulAcc<i8> for i8 {
    type Acc = i32;

    #[inline]
    fn dot(lhs: &[Self], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
        crate::simd::dot_s8(lhs, rhs, lhs_offset, rhs_offset)
    }
}

impl MulAcc<i8> for u8 {
    type Acc = i32;
}

impl MulAcc<i8> for i16 {
    type Acc = i64;
}

impl MulAcc<i16> for i16 {
    type Acc = i64;
}
