// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Rank-4 batched matrix multiply with broadcasting.
//!
//! Operands are `[batch, height, rows, cols]` with `rows` and `cols` stored
//! in [`Shape4::width`] and [`Shape4::channels`]. The two leading dimensions
//! broadcast: the output takes the larger extent of each, and an operand
//! with a smaller extent repeats cyclically along it. A dimension of size 1
//! is read with stride zero, so the same matrix serves every output index.

use serde::{Deserialize, Serialize};

use crate::config::MatmulParams;
use crate::element::Element;
use crate::error::{ensure_len, KernelError, Result};
use crate::shape::Shape4;
use crate::stage::OutputStage;
use crate::weights::WeightStore;

use super::check_offsets;
use super::vec_mat::row_times_rows;

/// Element strides of one operand along the two broadcast dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastStrides {
    /// Step per operand batch index.
    pub batch: usize,
    /// Step per operand height index.
    pub height: usize,
    /// Operand batch extent; output batch indices wrap modulo this.
    pub batches: usize,
    /// Operand height extent; output height indices wrap modulo this.
    pub heights: usize,
}

impl BroadcastStrides {
    /// Strides for reading `operand` while iterating `out_batch x out_height`.
    ///
    /// A dimension of size 1 gets stride zero.
    #[must_use]
    pub const fn for_operand(operand: &Shape4) -> Self {
        let matrix = operand.width * operand.channels;
        let height = if operand.height == 1 { 0 } else { matrix };
        let batch = if operand.batch == 1 {
            0
        } else {
            operand.height * matrix
        };
        Self {
            batch,
            height,
            batches: operand.batch,
            heights: operand.height,
        }
    }

    /// Element offset of the operand matrix read for output matrix `(n, h)`.
    ///
    /// ```rust
    /// use qnn_kernels::matmul::BroadcastStrides;
    /// use qnn_kernels::Shape4;
    ///
    /// // two batches of 2x3 matrices, read against a four-batch output
    /// let s = BroadcastStrides::for_operand(&Shape4::new(2, 1, 2, 3));
    /// assert_eq!(s.offset(1, 0), 6);
    /// assert_eq!(s.offset(2, 0), 0);
    /// assert_eq!(s.offset(3, 0), 6);
    /// ```
    #[must_use]
    #[inline]
    pub const fn offset(&self, n: usize, h: usize) -> usize {
        let n = if self.batches == 0 { 0 } else { n % self.batches };
        let h = if self.heights == 0 { 0 } else { h % self.heights };
        n * self.batch + h * self.height
    }
}

/// Output extent of one leading dimension. Empty if either side is empty.
const fn broadcast_dim(lhs: usize, rhs: usize) -> usize {
    if lhs == 0 || rhs == 0 {
        0
    } else if lhs > rhs {
        lhs
    } else {
        rhs
    }
}

/// Output shape of [`batch_matmul`]: larger leading dims, `lhs.rows x rhs.rows`.
///
/// # Errors
///
/// Returns [`KernelError::ChannelCount`] if the reduction lengths differ.
pub fn batch_matmul_output_shape(lhs: &Shape4, rhs: &Shape4) -> Result<Shape4> {
    if lhs.channels != rhs.channels {
        tracing::warn!(lhs = lhs.channels, rhs = rhs.channels, "reduction length mismatch");
        return Err(KernelError::ChannelCount {
            expected: lhs.channels,
            actual: rhs.channels,
        });
    }
    Ok(Shape4::new(
        broadcast_dim(lhs.batch, rhs.batch),
        broadcast_dim(lhs.height, rhs.height),
        lhs.width,
        rhs.width,
    ))
}

/// `dst[n][h] = lhs[n][h] x rhs[n][h]^T` with broadcasting of `n` and `h`.
///
/// `bias`, if the stage carries one, has one entry per rhs row. The same
/// requantization applies to every matrix in the batch.
///
/// # Errors
///
/// Returns an error for mismatched reduction lengths, short buffers, or
/// invalid offsets, before writing any output.
#[allow(clippy::too_many_arguments)]
pub fn batch_matmul<I, W, O, S>(
    lhs: &[I],
    lhs_shape: Shape4,
    rhs: &W,
    rhs_shape: Shape4,
    params: &MatmulParams,
    stage: &S,
    dst: &mut [O],
) -> Result<Shape4>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    let out_shape = batch_matmul_output_shape(&lhs_shape, &rhs_shape)?;
    check_offsets::<I>(params)?;
    ensure_len("lhs", lhs_shape.element_count(), lhs.len())?;
    ensure_len("rhs", rhs_shape.element_count(), rhs.element_count())?;
    ensure_len("dst", out_shape.element_count(), dst.len())?;
    stage.check_channels(rhs_shape.width)?;

    let cols = lhs_shape.channels;
    let lhs_rows = lhs_shape.width;
    let rhs_rows = rhs_shape.width;
    if lhs_rows == 0 || rhs_rows == 0 {
        return Ok(out_shape);
    }

    let lhs_strides = BroadcastStrides::for_operand(&lhs_shape);
    let rhs_strides = BroadcastStrides::for_operand(&rhs_shape);
    let rhs_matrix_len = rhs_rows * cols;
    let out_matrix_len = lhs_rows * rhs_rows;

    for n in 0..out_shape.batch {
        for h in 0..out_shape.height {
            let lhs_base = lhs_strides.offset(n, h);
            let rhs_base = rhs_strides.offset(n, h);
            let rhs_matrix = Window {
                inner: rhs,
                base: rhs_base,
                len: rhs_matrix_len,
            };
            let out_base = (n * out_shape.height + h) * out_matrix_len;
            let out_matrix = &mut dst[out_base..out_base + out_matrix_len];

            for (i, dst_row) in out_matrix.chunks_exact_mut(rhs_rows).enumerate() {
                let start = lhs_base + i * cols;
                row_times_rows(&lhs[start..start + cols], &rhs_matrix, rhs_rows, params, stage, dst_row);
            }
        }
    }

    Ok(out_shape)
}

/// Scratch bytes needed by [`batch_matmul`]. Always zero.
#[must_use]
pub const fn batch_matmul_buffer_size(_lhs: Shape4, _rhs: Shape4) -> usize {
    0
}

/// A weight store viewed from an element offset.
struct Window<'w, W> {
    inner: &'w W,
    base: usize,
    len: usize,
}

impl<I: Element, W: WeightStore<I>> WeightStore<I> for Window<'_, W> {
    type Acc = W::Acc;

    #[inline]
    fn element_count(&self) -> usize {
        self.len
    }

    #[inline]
    fn dot(&self, lhs: &[I], start: usize, lhs_offset: i32, rhs_offset: i32) -> W::Acc {
        self.inner.dot(lhs, self.base + start, lhs_offset, rhs_offset)
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
    ) -> W::Acc {
        self.inner
            .dot_strided(lhs, lhs_start, lhs_step, self.base + start, step, count, lhs_offset)
    }
}
