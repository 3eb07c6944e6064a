// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Row-times-transposed-matrix primitives.

use crate::config::MatmulParams;
use crate::element::{Accumulator, Element};
use crate::error::{ensure_len, Result};
use crate::stage::OutputStage;
use crate::weights::WeightStore;

use super::check_offsets;

/// Reduce one lhs row against `rhs_rows` weight rows into `dst[..rhs_rows]`.
///
/// No validation; callers check lengths first.
#[inline]
pub(crate) fn row_times_rows<I, W, O, S>(
    lhs: &[I],
    rhs: &W,
    rhs_rows: usize,
    params: &MatmulParams,
    stage: &S,
    dst: &mut [O],
) where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    let cols = lhs.len();
    for (row, out) in dst[..rhs_rows].iter_mut().enumerate() {
        let acc = stage.initial(row).combine(rhs.dot(
            lhs,
            row * cols,
            params.lhs_offset,
            params.rhs_offset,
        ));
        *out = stage.finish(acc, row);
    }
}

/// Multiply one row vector by a transposed weight matrix.
///
/// `dst[r] = finish(initial(r) + sum_c (lhs[c] + lhs_offset) * (rhs[r][c] + rhs_offset))`
/// for each of the `rhs_rows` weight rows, each `cols` long.
///
/// # Errors
///
/// Returns an error if a buffer is too short, an 8-bit offset is out of
/// range, or the stage's per-row arrays do not have `rhs_rows` entries.
#[allow(clippy::too_many_arguments)]
pub fn vec_mat_mult_t<I, W, O, S>(
    lhs: &[I],
    rhs: &W,
    rhs_rows: usize,
    cols: usize,
    params: &MatmulParams,
    stage: &S,
    dst: &mut [O],
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    check_offsets::<I>(params)?;
    ensure_len("lhs", cols, lhs.len())?;
    ensure_len("rhs", rhs_rows * cols, rhs.element_count())?;
    ensure_len("dst", rhs_rows, dst.len())?;
    stage.check_channels(rhs_rows)?;

    row_times_rows(&lhs[..cols], rhs, rhs_rows, params, stage, dst);
    Ok(())
}

/// Multiply a row-major lhs by a transposed rhs: `dst = lhs x rhs^T`.
///
/// `dst` is `lhs_rows x rhs_rows`, row-major.
///
/// # Errors
///
/// Same as [`vec_mat_mult_t`].
#[allow(clippy::too_many_arguments)]
pub fn mat_mult_nt_t<I, W, O, S>(
    lhs: &[I],
    lhs_rows: usize,
    rhs: &W,
    rhs_rows: usize,
    cols: usize,
    params: &MatmulParams,
    stage: &S,
    dst: &mut [O],
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    mat_mult_nt_t_strided(lhs, lhs_rows, cols, rhs, rhs_rows, cols, params, stage, dst)
}

/// [`mat_mult_nt_t`] with lhs rows `lhs_row_stride` elements apart.
///
/// Lets strided pointwise convolution read every `stride`-th pixel in place.
///
/// # Errors
///
/// Same as [`vec_mat_mult_t`], plus a stride shorter than `cols`.
#[allow(clippy::too_many_arguments)]
pub fn mat_mult_nt_t_strided<I, W, O, S>(
    lhs: &[I],
    lhs_rows: usize,
    lhs_row_stride: usize,
    rhs: &W,
    rhs_rows: usize,
    cols: usize,
    params: &MatmulParams,
    stage: &S,
    dst: &mut [O],
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    check_offsets::<I>(params)?;
    ensure_len("lhs row stride", cols, lhs_row_stride)?;
    let lhs_needed = lhs_rows.checked_sub(1).map_or(0, |last| last * lhs_row_stride + cols);
    ensure_len("lhs", lhs_needed, lhs.len())?;
    ensure_len("rhs", rhs_rows * cols, rhs.element_count())?;
    ensure_len("dst", lhs_rows * rhs_rows, dst.len())?;
    stage.check_channels(rhs_rows)?;

    if rhs_rows == 0 {
        return Ok(());
    }
    for (i, dst_row) in dst.chunks_exact_mut(rhs_rows).take(lhs_rows).enumerate() {
        let start = i * lhs_row_stride;
        row_times_rows(&lhs[start..start + cols], rhs, rhs_rows, params, stage, dst_row);
    }
    Ok(())
}
