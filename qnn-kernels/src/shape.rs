//! Tensor shapes in channel-innermost (NHWC) order.

use serde::{Deserialize, Serialize};

/// A horizontal/vertical pair (stride, padding, dilation, kernel extent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Spatial {
    /// Horizontal component.
    pub x: usize,
    /// Vertical component.
    pub y: usize,
}

impl Spatial {
    /// Create a pair.
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Same value on both axes.
    #[must_use]
    pub const fn square(v: usize) -> Self {
        Self { x: v, y: v }
    }
}

/// Activation tensor shape, `[batch][height][width][channels]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape4 {
    /// Batch count.
    pub batch: usize,
    /// Rows.
    pub height: usize,
    /// Columns.
    pub width: usize,
    /// Channels, innermost.
    pub channels: usize,
}

impl Shape4 {
    /// Create a shape.
    #[must_use]
    pub const fn new(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            batch,
            height,
            width,
            channels,
        }
    }

    /// Single-image shape.
    #[must_use]
    pub const fn hwc(height: usize, width: usize, channels: usize) -> Self {
        Self::new(1, height, width, channels)
    }

    /// Elements in one batch entry.
    #[must_use]
    pub const fn plane_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Total element count.
    #[must_use]
    pub const fn element_count(&self) -> usize {
        self.batch * self.plane_len()
    }

    /// Flat index of `(n, y, x, c)`.
    #[must_use]
    #[inline]
    pub const fn index(&self, n: usize, y: usize, x: usize, c: usize) -> usize {
        ((n * self.height + y) * self.width + x) * self.channels + c
    }
}

/// Filter shape, `[out_channels][height][width][in_channels]`.
///
/// `in_channels` counts the channels one filter sees, which is the input
/// channel count divided by the group count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FilterShape {
    /// Output channels (filters).
    pub out_channels: usize,
    /// Kernel rows.
    pub height: usize,
    /// Kernel columns.
    pub width: usize,
    /// Input channels per filter.
    pub in_channels: usize,
}

impl FilterShape {
    /// Create a filter shape.
    #[must_use]
    pub const fn new(out_channels: usize, height: usize, width: usize, in_channels: usize) -> Self {
        Self {
            out_channels,
            height,
            width,
            in_channels,
        }
    }

    /// Elements in one filter.
    #[must_use]
    pub const fn filter_len(&self) -> usize {
        self.height * self.width * self.in_channels
    }

    /// Total element count.
    #[must_use]
    pub const fn element_count(&self) -> usize {
        self.out_channels * self.filter_len()
    }

    /// Flat index of `(co, ky, kx, ci)`.
    #[must_use]
    #[inline]
    pub const fn index(&self, co: usize, ky: usize, kx: usize, ci: usize) -> usize {
        ((co * self.height + ky) * self.width + kx) * self.in_channels + ci
    }
}

/// Output extent of a convolution along one axis.
///
/// Returns zero when the dilated kernel does not fit the padded input.
#[must_use]
pub const fn output_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    if stride == 0 || kernel == 0 {
        return 0;
    }
    let span = dilation * (kernel - 1) + 1;
    let padded = input + 2 * padding;
    if padded < span {
        0
    } else {
        (padded - span) / stride + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing() {
        let s = Shape4::new(2, 3, 4, 5);
        assert_eq!(s.element_count(), 120);
        assert_eq!(s.index(1, 0, 0, 0), 60);
        assert_eq!(s.index(0, 2, 3, 4), 59);

        let f = FilterShape::new(2, 3, 3, 4);
        assert_eq!(f.filter_len(), 36);
        assert_eq!(f.index(1, 0, 0, 0), 36);
    }

    #[test]
    fn test_output_extent() {
        assert_eq!(output_extent(5, 3, 1, 0, 1), 3);
        assert_eq!(output_extent(5, 3, 1, 0, 2), 1);
        assert_eq!(output_extent(5, 3, 2, 1, 1), 3);
        assert_eq!(output_extent(2, 3, 1, 0, 2), 0);
    }
}
