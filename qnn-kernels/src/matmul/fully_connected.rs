// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Batched fully-connected layers, standard and interleaved.

use crate::config::MatmulParams;
use crate::element::{Accumulator, Element, MulAcc};
use crate::error::{ensure_len, Result};
use crate::layout::interleaved_len;
use crate::stage::OutputStage;
use crate::weights::{DenseWeights, WeightStore};

use super::check_offsets;
use super::vec_mat::row_times_rows;

/// Fully-connected layer over `batches` input vectors.
///
/// Input is `batches x in_features`, weights `out_features x in_features`,
/// output `batches x out_features`. Each batch row is one call of the
/// single-row primitive with input and output advanced by a fixed stride.
///
/// # Errors
///
/// Returns an error if a buffer is too short, an 8-bit offset is out of
/// range, or per-row stage arrays do not have `out_features` entries.
#[allow(clippy::too_many_arguments)]
pub fn fully_connected<I, W, O, S>(
    input: &[I],
    batches: usize,
    weights: &W,
    in_features: usize,
    out_features: usize,
    params: &MatmulParams,
    stage: &S,
    output: &mut [O],
) -> Result<()>
where
    I: Element,
    W: WeightStore<I>,
    O: Element,
    S: OutputStage<W::Acc>,
{
    check_offsets::<I>(params)?;
    ensure_len("input", batches * in_features, input.len())?;
    ensure_len("weights", out_features * in_features, weights.element_count())?;
    ensure_len("output", batches * out_features, output.len())?;
    stage.check_channels(out_features)?;

    if in_features == 0 || out_features == 0 {
        for (i, out) in output[..batches * out_features].iter_mut().enumerate() {
            let row = i % out_features.max(1);
            *out = stage.finish(stage.initial(row), row);
        }
        return Ok(());
    }

    let rows = input.chunks_exact(in_features).zip(output.chunks_exact_mut(out_features));
    for (lhs, dst) in rows.take(batches) {
        row_times_rows(lhs, weights, out_features, params, stage, dst);
    }
    Ok(())
}

/// Scratch bytes needed by [`fully_connected`] and [`fully_connected_interleaved`].
#[must_use]
pub const fn fully_connected_buffer_size(_in_features: usize, _out_features: usize) -> usize {
    0
}

#[inline]
fn offset<E: Element>(value: E, zero_point: i32) -> i32 {
    value.to_i32().wrapping_add(zero_point)
}

/// One input row against weights produced by [`crate::layout::interleave_rows4`].
///
/// Four output rows share each pass over the input; each column pair is read
/// once and feeds all four accumulators.
fn interleaved_row<I, W, O, S>(
    lhs: &[I],
    weights: &[W],
    out_features: usize,
    params: &MatmulParams,
    stage: &S,
    dst: &mut [O],
) where
    I: MulAcc<W>,
    W: Element,
    O: Element,
    S: OutputStage<I::Acc>,
{
    let cols = lhs.len();
    let group_len = 4 * cols;
    let groups = out_features / 4;
    let (lo, ro) = (params.lhs_offset, params.rhs_offset);

    for g in 0..groups {
        let block = &weights[g * group_len..(g + 1) * group_len];
        let row = g * 4;
        let mut acc = [
            stage.initial(row),
            stage.initial(row + 1),
            stage.initial(row + 2),
            stage.initial(row + 3),
        ];

        let pairs = lhs.chunks_exact(2);
        let tail = pairs.remainder();
        for (pair, w) in pairs.zip(block.chunks_exact(8)) {
            let x0 = offset(pair[0], lo);
            let x1 = offset(pair[1], lo);
            acc[0] = acc[0].mac(x0, offset(w[0], ro)).mac(x1, offset(w[2], ro));
            acc[1] = acc[1].mac(x0, offset(w[1], ro)).mac(x1, offset(w[3], ro));
            acc[2] = acc[2].mac(x0, offset(w[4], ro)).mac(x1, offset(w[6], ro));
            acc[3] = acc[3].mac(x0, offset(w[5], ro)).mac(x1, offset(w[7], ro));
        }
        if let [x] = tail {
            let x = offset(*x, lo);
            let w = &block[group_len - 4..];
            for (a, &wk) in acc.iter_mut().zip(w) {
                *a = a.mac(x, offset(wk, ro));
            }
        }

        for (k, a) in acc.into_iter().enumerate() {
            dst[row + k] = stage.finish(a, row + k);
        }
    }

    let tail_rows = groups * 4..out_features;
    let tail_weights = DenseWeights::new(&weights[groups * group_len..]);
    for row in tail_rows {
        let local = (row - groups * 4) * cols;
        let acc = stage.initial(row).combine(tail_weights.dot(lhs, local, lo, ro));
        dst[row] = stage.finish(acc, row);
    }
}

/// [`fully_connected`] over weights in the interleaved layout.
///
/// Bit-identical to [`fully_connected`] on the un-interleaved weights for
/// every stage. Packed 4-bit weights have no interleaved form.
///
/// # Errors
///
/// Same as [`fully_connected`].
#[allow(clippy::too_many_arguments)]
pub fn fully_connected_interleaved<I, W, O, S>(
    input: &[I],
    batches: usize,
    weights: &[W],
    in_features: usize,
    out_features: usize,
    params: &MatmulParams,
    stage: &S,
    output: &mut [O],
) -> Result<()>
where
    I: MulAcc<W>,
    W: Element,
    O: Element,
    S: OutputStage<I::Acc>,
{
    check_offsets::<I>(params)?;
    ensure_len("input", batches * in_features, input.len())?;
    ensure_len("weights", interleaved_len(out_features, in_features), weights.len())?;
    ensure_len("output", batches * out_features, output.len())?;
    stage.check_channels(out_features)?;

    if in_features == 0 || out_features == 0 {
        return fully_connected(
            input,
            batches,
            &DenseWeights::new(weights),
            in_features,
            out_features,
            params,
            stage,
            output,
        );
    }

    let rows = input.chunks_exact(in_features).zip(output.chunks_exact_mut(out_features));
    for (lhs, dst) in rows.take(batches) {
        interleaved_row(lhs, weights, out_features, params, stage, dst);
    }
    Ok(())
}
