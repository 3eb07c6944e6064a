//! Error types for qnn-kernels.

use thiserror::Error;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Status code reported for a successful kernel call.
pub const STATUS_OK: i32 = 0;

/// Status code reported for any configuration error.
pub const STATUS_ERROR: i32 = -1;

/// Configuration errors detected at kernel entry.
///
/// Kernels validate their arguments before touching the output buffer, so an
/// error always means nothing was written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// Input channels and output channels do not split into equal groups.
    #[error(
        "group mismatch: {in_channels} input and {out_channels} output channels \
         cannot be grouped by filter depth {filter_channels}"
    )]
    GroupMismatch {
        /// Channels in the input tensor.
        in_channels: usize,
        /// Channels in the output tensor.
        out_channels: usize,
        /// Input channels consumed by each filter.
        filter_channels: usize,
    },

    /// A caller-provided buffer is shorter than its shape requires.
    #[error("{buffer} buffer too small: need {required}, got {actual}")]
    BufferTooSmall {
        /// Which buffer was short.
        buffer: &'static str,
        /// Required number of elements (bytes for scratch buffers).
        required: usize,
        /// Provided number of elements.
        actual: usize,
    },

    /// Per-channel parameter array length disagrees with the channel count.
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelCount {
        /// Output channels of the kernel.
        expected: usize,
        /// Length of the provided array.
        actual: usize,
    },

    /// The kernel variant does not accept this geometry.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// A parameter struct failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A value does not fit a signed 4-bit nibble.
    #[error("value {value} at index {index} outside 4-bit range [-8, 7]")]
    NibbleRange {
        /// Position of the offending value.
        index: usize,
        /// The offending value.
        value: i8,
    },

    /// A real-valued scale cannot be expressed as multiplier and shift.
    #[error("scale {0} cannot be represented as a fixed-point multiplier")]
    ScaleOutOfRange(f64),
}

impl KernelError {
    /// Integer status code for this error.
    ///
    /// Every configuration error maps to the same distinguished status.
    #[must_use]
    pub const fn status(&self) -> i32 {
        STATUS_ERROR
    }
}

/// Map a kernel result to its integer status (`0` or `-1`).
#[must_use]
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(err) => err.status(),
    }
}

/// Check that `actual` elements cover `required`.
pub(crate) fn ensure_len(buffer: &'static str, required: usize, actual: usize) -> Result<()> {
    if actual < required {
        tracing::warn!(buffer, required, actual, "rejecting undersized buffer");
        return Err(KernelError::BufferTooSmall {
            buffer,
            required,
            actual,
        });
    }
    Ok(())
}
