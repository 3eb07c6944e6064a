// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Matrix-multiply and fully-connected kernels.
//!
//! Everything here is built on one primitive: a row of inputs reduced
//! against each row of a weight matrix, which is the transposed right-hand
//! operand. The quantization convention is the caller's choice of
//! [`OutputStage`](crate::stage::OutputStage); offsets come from
//! [`MatmulParams`] and are zero for the shift conventions.
//!
//! | Kernel | Shape |
//! |--------|-------|
//! | [`vec_mat_mult_t`] | `1 x cols` times `(rows x cols)^T` |
//! | [`mat_mult_nt_t`] | `m x cols` times `(rows x cols)^T` |
//! | [`fully_connected`] | batched [`vec_mat_mult_t`] |
//! | [`fully_connected_interleaved`] | same, weights from [`crate::layout::interleave_rows4`] |
//! | [`batch_matmul`] | rank 4 with broadcast leading dims |

mod batch;
mod fully_connected;
mod vec_mat;

pub use batch::{batch_matmul, batch_matmul_buffer_size, batch_matmul_output_shape, BroadcastStrides};
pub use fully_connected::{fully_connected, fully_connected_buffer_size, fully_connected_interleaved};
pub use vec_mat::{mat_mult_nt_t, mat_mult_nt_t_strided, vec_mat_mult_t};

use crate::config::MatmulParams;
use crate::element::Element;
use crate::error::Result;

/// Offsets on 8-bit operands must fit in nine bits.
pub(crate) fn check_offsets<I: Element>(params: &MatmulParams) -> Result<()> {
    if I::MAX - I::MIN > 255 {
        return Ok(());
    }
    let checked = params.validate_8bit();
    if checked.is_err() {
        tracing::warn!(
            lhs_offset = params.lhs_offset,
            rhs_offset = params.rhs_offset,
            "matmul offset out of range"
        );
    }
    checked
}
