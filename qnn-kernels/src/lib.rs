//! Fixed-point quantized neural-network kernels.
//!
//! This crate provides the integer compute core of a quantized inference
//! engine: convolution and matrix-multiply kernels over 8-bit, 16-bit and
//! packed 4-bit tensors, with wide accumulators and an affine
//! requantization step that maps each accumulator back to a narrow output.
//!
//! # Features
//!
//! - **Requantization**: Q31 multiplier and shift with round-half-away rounding
//! - **Convolution**: grouped, depthwise, dilated, 1x1, transposed
//! - **Matrix multiply**: single row, batched fully-connected, rank 4 with broadcasting
//! - **Weight formats**: dense `i8`/`i16`, packed 4-bit, interleaved fast layout
//! - **SIMD**: Optional AVX2/NEON dot products with the `simd` feature
//!
//! # Quick Start
//!
//! ```rust
//! use qnn_kernels::prelude::*;
//!
//! // one row of three inputs against two weight rows
//! let input = [10i8, -20, 30];
//! let weights = [1i8, 2, 3, -1, -1, -1];
//! let bias = [0i32, 5];
//! let stage = AffineOutput::new(Requantizer::per_tensor(1 << 30, 0))
//!     .with_bias(&bias)
//!     .with_output_offset(-1);
//!
//! let mut output = [0i8; 2];
//! vec_mat_mult_t(&input, &DenseWeights::new(&weights), 2, 3, &MatmulParams::default(), &stage, &mut output)?;
//!
//! // (60 * 0.5) - 1 and ((-20 + 5) * 0.5 rounded away) - 1
//! assert_eq!(output, [29, -9]);
//! # Ok::<(), qnn_kernels::KernelError>(())
//! ```
//!
//! # Conventions
//!
//! ```text
//! tensors   NHWC, channel innermost, batch outermost
//! filters   [out_channels][height][width][in_channels / groups]
//! 4-bit     two nibbles per byte, even index in the low nibble
//! errors    Err(KernelError) before any output is written; status() == -1
//! ```
//!
//! The quantization convention is chosen by the output stage passed to a
//! kernel: [`AffineOutput`] for zero-point offsets with multiplier/shift,
//! [`ShiftOutput`] and [`BiasShiftOutput`] for the shift conventions.
//!
//! # Feature Flags
//!
//! - `default`: scalar kernels only
//! - `simd`: Enable AVX2/NEON SIMD for 8-bit dot products

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]

pub mod backend;
pub mod config;
pub mod conv;
pub mod element;
mod error;
pub mod layout;
pub mod matmul;
mod packed;
pub mod requant;
pub mod shape;
pub mod simd;
pub mod stage;
pub mod weights;

pub use backend::{
    active_backend, install_backend, select_backend, BackendConfig, CpuBackend, DotBackend, DynamicBackend,
    ScalarBackend,
};
pub use config::{ActivationRange, ConvParams, MatmulParams};
pub use element::{Accumulator, Element, MulAcc};
pub use error::{status_code, KernelError, Result, STATUS_ERROR, STATUS_OK};
pub use packed::{pack_int4, packed_len, unpack_int4, Int4Cursor, Int4Weights, PackedInt4Vec};
pub use requant::{requantize, requantize_wide, BiasShift, QuantMultiplier, ShiftScale};
pub use shape::{output_extent, FilterShape, Shape4, Spatial};
pub use stage::{AffineOutput, BiasShiftOutput, OutputStage, Requantizer, ShiftOutput};
pub use weights::{DenseWeights, WeightStore};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use qnn_kernels::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ActivationRange, ConvParams, MatmulParams};
    pub use crate::conv::{
        conv_1x1, conv_hwc, depthwise_conv_hwc, transpose_conv, transpose_conv_buffer_size,
    };
    pub use crate::layout::interleave_rows4;
    pub use crate::matmul::{
        batch_matmul, fully_connected, fully_connected_interleaved, mat_mult_nt_t, vec_mat_mult_t,
    };
    pub use crate::packed::PackedInt4Vec;
    pub use crate::requant::{QuantMultiplier, ShiftScale};
    pub use crate::shape::{FilterShape, Shape4, Spatial};
    pub use crate::stage::{AffineOutput, BiasShiftOutput, OutputStage, Requantizer, ShiftOutput};
    pub use crate::weights::{DenseWeights, WeightStore};
    pub use crate::{KernelError, Result};
}
