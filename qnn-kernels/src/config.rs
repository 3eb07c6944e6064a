//! Kernel parameter structs.
//!
//! Plain data, serializable so an engine can keep per-layer parameters next
//! to its model description. Borrowed parameter arrays (per-channel
//! multipliers, bias) are not part of these structs; they live on output
//! stages.

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::error::{KernelError, Result};
use crate::shape::Spatial;

/// Smallest offset accepted for an 8-bit operand.
pub const MIN_OFFSET_8BIT: i32 = -256;

/// Largest offset accepted for an 8-bit operand.
///
/// An 8-bit zero point needs nine signed bits once it is folded into an
/// offset, so offsets live in `[-256, 255]`.
pub const MAX_OFFSET_8BIT: i32 = 255;

fn check_offset_8bit(name: &str, value: i32) -> Result<()> {
    if (MIN_OFFSET_8BIT..=MAX_OFFSET_8BIT).contains(&value) {
        return Ok(());
    }
    Err(KernelError::InvalidConfig(format!(
        "{name} offset {value} outside 9-bit range [{MIN_OFFSET_8BIT}, {MAX_OFFSET_8BIT}]"
    )))
}

/// Inclusive clamp applied after requantization and output offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRange {
    /// Lower bound, inclusive.
    pub min: i32,
    /// Upper bound, inclusive.
    pub max: i32,
}

impl Default for ActivationRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl ActivationRange {
    /// Create a clamp range.
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// No clamping beyond the output type's own saturation.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(i32::MIN, i32::MAX)
    }

    /// The full range of an element type.
    #[must_use]
    pub const fn of<E: Element>() -> Self {
        Self::new(E::MIN, E::MAX)
    }

    /// Validate that the range is not inverted.
    ///
    /// # Errors
    ///
    /// Returns an error if `min > max`.
    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(KernelError::InvalidConfig(format!(
                "activation range inverted: min {} > max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Clamp a requantized value.
    #[must_use]
    #[inline]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(i64::from(self.min), i64::from(self.max))
    }
}

/// Geometry and input zero point of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
    /// Step between output positions, in input elements.
    pub stride: Spatial,
    /// Implicit zero padding before the first input row/column.
    pub padding: Spatial,
    /// Spacing between kernel taps; 1 is ordinary convolution.
    pub dilation: Spatial,
    /// Added to every input element before multiplying.
    pub input_offset: i32,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvParams {
    /// Unit stride, no padding, no dilation, zero offset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stride: Spatial::square(1),
            padding: Spatial::square(0),
            dilation: Spatial::square(1),
            input_offset: 0,
        }
    }

    /// Set the stride.
    #[must_use]
    pub const fn with_stride(mut self, x: usize, y: usize) -> Self {
        self.stride = Spatial::new(x, y);
        self
    }

    /// Set the padding.
    #[must_use]
    pub const fn with_padding(mut self, x: usize, y: usize) -> Self {
        self.padding = Spatial::new(x, y);
        self
    }

    /// Set the dilation.
    #[must_use]
    pub const fn with_dilation(mut self, x: usize, y: usize) -> Self {
        self.dilation = Spatial::new(x, y);
        self
    }

    /// Set the input zero-point offset.
    #[must_use]
    pub const fn with_input_offset(mut self, offset: i32) -> Self {
        self.input_offset = offset;
        self
    }

    /// Validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns error if stride or dilation is zero.
    pub fn validate(&self) -> Result<()> {
        if self.stride.x == 0 || self.stride.y == 0 {
            return Err(KernelError::InvalidConfig("stride must be > 0".to_string()));
        }
        if self.dilation.x == 0 || self.dilation.y == 0 {
            return Err(KernelError::InvalidConfig(
                "dilation must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate that the input offset fits the 9-bit range of an 8-bit input.
    ///
    /// # Errors
    ///
    /// Returns an error if `input_offset` is outside
    /// [`MIN_OFFSET_8BIT`]`..=`[`MAX_OFFSET_8BIT`].
    pub fn validate_8bit(&self) -> Result<()> {
        check_offset_8bit("input", self.input_offset)
    }
}

/// Zero points of the two matmul operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatmulParams {
    /// Added to every left-hand (input) element.
    pub lhs_offset: i32,
    /// Added to every right-hand (weight) element.
    pub rhs_offset: i32,
}

impl MatmulParams {
    /// Create matmul parameters.
    #[must_use]
    pub const fn new(lhs_offset: i32, rhs_offset: i32) -> Self {
        Self {
            lhs_offset,
            rhs_offset,
        }
    }

    /// No offsets, as used by the shift convention.
    #[must_use]
    pub const fn symmetric() -> Self {
        Self::new(0, 0)
    }

    /// Validate that both offsets fit the 9-bit range of an 8-bit operand.
    ///
    /// # Errors
    ///
    /// Returns an error if either offset is outside
    /// [`MIN_OFFSET_8BIT`]`..=`[`MAX_OFFSET_8BIT`].
    pub fn validate_8bit(&self) -> Result<()> {
        check_offset_8bit("lhs", self.lhs_offset)?;
        check_offset_8bit("rhs", self.rhs_offset)
    }
}
