//! Weight storage abstraction.
//!
//! Kernels read weights only through [`WeightStore`], so the same loop nest
//! serves dense 8/16-bit weights and packed 4-bit weights. A store reduces a
//! run of weights against a run of inputs; it never hands out individual
//! elements, which lets the packed store keep its nibble parity in a cursor.

use crate::element::{Accumulator, Element, MulAcc};
use crate::packed::Int4Weights;

/// Weights that can be reduced against inputs of type `I`.
pub trait WeightStore<I: Element> {
    /// Accumulator for this input/weight pairing.
    type Acc: Accumulator;

    /// Number of logical weight elements.
    fn element_count(&self) -> usize;

    /// Dot product of `lhs` with the contiguous weights starting at `start`.
    ///
    /// `lhs.len()` weights are consumed.
    fn dot(&self, lhs: &[I], start: usize, lhs_offset: i32, rhs_offset: i32) -> Self::Acc;

    /// Dot product over `count` elements taken with independent strides.
    ///
    /// Reads `lhs[lhs_start + i * lhs_step]` against weight `start + i * step`.
    #[allow(clippy::too_many_arguments)]
    fn dot_strided(
        &self,
        lhs: &[I],
        lhs_start: usize,
        lhs_step: usize,
        start: usize,
        step: usize,
        count: usize,
        lhs_offset: i32,
    ) -> Self::Acc;
}

/// Dense weights, one element per value.
#[derive(Debug, Clone, Copy)]
pub struct DenseWeights<'a, W> {
    data: &'a [W],
}

impl<'a, W: Element> DenseWeights<'a, W> {
    /// Wrap a weight slice.
    #[must_use]
    pub const fn new(data: &'a [W]) -> Self {
        Self { data }
    }

    /// Underlying slice.
    #[must_use]
    pub const fn as_slice(&self) -> &'a [W] {
        self.data
    }
}

impl<'a, W: Element> From<&'a [W]> for DenseWeights<'a, W> {
    fn from(data: &'a [W]) -> Self {
        Self::new(data)
    }
}

impl<I, W> WeightStore<I> for DenseWeights<'_, W>
where
    I: MulAcc<W>,
    W: Element,
{
    type Acc = I::Acc;

    #[inline]
    fn element_count(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn dot(&self, lhs: &[I], start: usize, lhs_offset: i32, rhs_offset: i32) -> I::Acc {
        I::dot(lhs, &self.data[start..start + lhs.len()], lhs_offset, rhs_offset)
    }

    #[inline]
    fn dot_strided(
        &self,
        lhs: &[I],
        lhs_start: usize,
        lhs_step: usize,
        start: usize,
        step: usize,
        count: usize,
        lhs_offset: i32,
    ) -> I::Acc {
        let inputs = lhs[lhs_start..].iter().step_by(lhs_step.max(1));
        let weights = self.data[start..].iter().step_by(step.max(1));
        inputs
            .zip(weights)
            .take(count)
            .fold(I::Acc::default(), |acc, (&x, &w)| {
                acc.mac(x.to_i32().wrapping_add(lhs_offset), w.to_i32())
            })
    }
}

impl<I> WeightStore<I> for Int4Weights<'_>
where
    I: MulAcc<i8>,
{
    type Acc = I::Acc;

    #[inline]
    fn element_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn dot(&self, lhs: &[I], start: usize, lhs_offset: i32, rhs_offset: i32) -> I::Acc {
        lhs.iter()
            .zip(self.cursor(start, 1))
            .fold(I::Acc::default(), |acc, (&x, w)| {
                acc.mac(
                    x.to_i32().wrapping_add(lhs_offset),
                    i32::from(w).wrapping_add(rhs_offset),
                )
            })
    }

    #[inline]
    fn dot_strided(
        &self,
        lhs: &[I],
        lhs_start: usize,
        lhs_step: usize,
        start: usize,
        step: usize,
        count: usize,
        lhs_offset: i32,
    ) -> I::Acc {
        lhs[lhs_start..]
            .iter()
            .step_by(lhs_step.max(1))
            .zip(self.cursor(start, step))
            .take(count)
            .fold(I::Acc::default(), |acc, (&x, w)| {
                acc.mac(x.to_i32().wrapping_add(lhs_offset), i32::from(w))
            })
    }
}
