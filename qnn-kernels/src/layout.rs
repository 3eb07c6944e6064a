//! Weight layout conversion for the interleaved fully-connected kernel.
//!
//! Rows are taken four at a time. Within a group, each column pair
//! `(c, c + 1)` becomes eight consecutive elements:
//!
//! ```text
//! r0[c] r1[c] r0[c+1] r1[c+1] r2[c] r3[c] r2[c+1] r3[c+1]
//! ```
//!
//! An odd final column becomes `r0[c] r1[c] r2[c] r3[c]`. Rows left over
//! after the last full group are copied through unchanged. The output has
//! the same length as the input; only the order differs.

use crate::error::{ensure_len, Result};

/// Elements in the interleaved form of a `rows x cols` matrix.
#[must_use]
pub const fn interleaved_len(rows: usize, cols: usize) -> usize {
    rows * cols
}

/// Reorder a row-major `rows x cols` matrix into the interleaved layout.
///
/// # Errors
///
/// Returns [`KernelError::BufferTooSmall`](crate::KernelError::BufferTooSmall)
/// if either buffer is shorter than `rows * cols`.
///
/// # Examples
///
/// ```
/// use qnn_kernels::layout::interleave_rows4;
///
/// // four rows of two columns
/// let src = [0i8, 1, 10, 11, 20, 21, 30, 31];
/// let mut dst = [0i8; 8];
/// interleave_rows4(&src, 4, 2, &mut dst).unwrap();
/// assert_eq!(dst, [0, 10, 1, 11, 20, 30, 21, 31]);
/// ```
pub fn interleave_rows4<T: Copy>(src: &[T], rows: usize, cols: usize, dst: &mut [T]) -> Result<()> {
    let len = interleaved_len(rows, cols);
    ensure_len("source", len, src.len())?;
    ensure_len("destination", len, dst.len())?;
    if len == 0 {
        return Ok(());
    }

    let group_len = 4 * cols;
    let groups = rows / 4;
    let mut out = dst.iter_mut();
    let mut emit = |value: T| {
        if let Some(slot) = out.next() {
            *slot = value;
        }
    };

    for group in src.chunks_exact(group_len).take(groups) {
        let (r0, rest) = group.split_at(cols);
        let (r1, rest) = rest.split_at(cols);
        let (r2, r3) = rest.split_at(cols);

        let mut c = 0;
        while c + 1 < cols {
            emit(r0[c]);
            emit(r1[c]);
            emit(r0[c + 1]);
            emit(r1[c + 1]);
            emit(r2[c]);
            emit(r3[c]);
            emit(r2[c + 1]);
            emit(r3[c + 1]);
            c += 2;
        }
        if c < cols {
            emit(r0[c]);
            emit(r1[c]);
            emit(r2[c]);
            emit(r3[c]);
        }
    }

    let tail_start = groups * group_len;
    dst[tail_start..len].copy_from_slice(&src[tail_start..len]);
    Ok(())
}
