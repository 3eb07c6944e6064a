//! Packed signed 4-bit storage.
//!
//! Two two's-complement nibbles share each byte:
//!
//! ```text
//! byte k:  [ high nibble | low nibble ]
//!          [ elem 2k+1   | elem 2k    ]
//! ```
//!
//! Each nibble is sign-extended independently on read. Readers walk the
//! storage with [`Int4Cursor`], which carries the nibble parity forward from
//! element to element instead of recomputing it from the logical index.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Smallest value a signed nibble holds.
pub const NIBBLE_MIN: i8 = -8;
/// Largest value a signed nibble holds.
pub const NIBBLE_MAX: i8 = 7;

/// Sign-extended low nibble (even element).
#[must_use]
#[inline]
pub const fn low_nibble(byte: u8) -> i8 {
    ((byte << 4) as i8) >> 4
}

/// Sign-extended high nibble (odd element).
#[must_use]
#[inline]
pub const fn high_nibble(byte: u8) -> i8 {
    (byte as i8) >> 4
}

/// Bytes needed to store `elements` nibbles.
#[must_use]
#[inline]
pub const fn packed_len(elements: usize) -> usize {
    elements.div_ceil(2)
}

fn check_nibble(index: usize, value: i8) -> Result<u8> {
    if (NIBBLE_MIN..=NIBBLE_MAX).contains(&value) {
        Ok((value as u8) & 0x0F)
    } else {
        Err(KernelError::NibbleRange { index, value })
    }
}

/// Pack `values` into `dst`, two per byte.
///
/// An odd trailing element leaves the high nibble of the last byte zero.
///
/// # Errors
///
/// Returns an error if a value lies outside `[-8, 7]` or `dst` is too short.
pub fn pack_int4(values: &[i8], dst: &mut [u8]) -> Result<()> {
    crate::error::ensure_len("packed output", packed_len(values.len()), dst.len())?;
    for (i, (pair, out)) in values.chunks(2).zip(dst.iter_mut()).enumerate() {
        let low = check_nibble(2 * i, pair[0])?;
        let high = match pair.get(1) {
            Some(&v) => check_nibble(2 * i + 1, v)?,
            None => 0,
        };
        *out = low | (high << 4);
    }
    Ok(())
}

/// Unpack `dst.len()` nibbles from `src`.
///
/// # Errors
///
/// Returns an error if `src` holds fewer than `dst.len()` nibbles.
pub fn unpack_int4(src: &[u8], dst: &mut [i8]) -> Result<()> {
    crate::error::ensure_len("packed input", packed_len(dst.len()), src.len())?;
    for (out, value) in dst.iter_mut().zip(Int4Cursor::new(src, 0, 1)) {
        *out = value;
    }
    Ok(())
}

/// Strided reader over packed nibbles.
///
/// Yields the element at `start`, then every `step`-th element after it.
/// With an odd step the nibble parity flips on every element.
#[derive(Debug, Clone)]
pub struct Int4Cursor<'a> {
    bytes: &'a [u8],
    byte: usize,
    high: bool,
    byte_step: usize,
    flips: bool,
}

impl<'a> Int4Cursor<'a> {
    /// Position a cursor at logical element `start`.
    #[must_use]
    pub fn new(bytes: &'a [u8], start: usize, step: usize) -> Self {
        Self {
            bytes,
            byte: start >> 1,
            high: start & 1 == 1,
            byte_step: step >> 1,
            flips: step & 1 == 1,
        }
    }
}

impl Iterator for Int4Cursor<'_> {
    type Item = i8;

    #[inline]
    fn next(&mut self) -> Option<i8> {
        let byte = *self.bytes.get(self.byte)?;
        let value = if self.high {
            high_nibble(byte)
        } else {
            low_nibble(byte)
        };

        self.byte += self.byte_step;
        if self.flips {
            if self.high {
                self.byte += 1;
            }
            self.high = !self.high;
        }
        Some(value)
    }
}

/// Borrowed packed 4-bit weight tensor.
#[derive(Debug, Clone, Copy)]
pub struct Int4Weights<'a> {
    bytes: &'a [u8],
    len: usize,
}

impl<'a> Int4Weights<'a> {
    /// Wrap packed bytes holding `len` logical elements.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is shorter than `ceil(len / 2)`.
    pub fn new(bytes: &'a [u8], len: usize) -> Result<Self> {
        crate::error::ensure_len("packed weights", packed_len(len), bytes.len())?;
        Ok(Self { bytes, len })
    }

    /// Number of logical elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if no elements are stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw packed bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Read one element.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[must_use]
    pub fn get(&self, index: usize) -> i8 {
        assert!(index < self.len, "index {index} out of bounds");
        let byte = self.bytes[index >> 1];
        if index & 1 == 1 {
            high_nibble(byte)
        } else {
            low_nibble(byte)
        }
    }

    /// Cursor starting at `start`, advancing by `step` elements.
    #[must_use]
    pub fn cursor(&self, start: usize, step: usize) -> Int4Cursor<'a> {
        Int4Cursor::new(self.bytes, start, step)
    }
}

/// Owned packed 4-bit vector.
///
/// # Examples
///
/// ```
/// use qnn_kernels::PackedInt4Vec;
///
/// let packed = PackedInt4Vec::from_i8_slice(&[-8, 7, 3]).unwrap();
/// assert_eq!(packed.as_bytes(), &[0x78, 0x03]);
/// assert_eq!(packed.get(0), -8);
/// assert_eq!(packed.get(1), 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedInt4Vec {
    bytes: Vec<u8>,
    len: usize,
}

impl PackedInt4Vec {
    /// Create a zeroed vector of `len` nibbles.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; packed_len(len)],
            len,
        }
    }

    /// Pack a slice of values in `[-8, 7]`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NibbleRange`] for the first out-of-range value.
    pub fn from_i8_slice(values: &[i8]) -> Result<Self> {
        let mut packed = Self::new(values.len());
        pack_int4(values, &mut packed.bytes)?;
        Ok(packed)
    }

    /// Adopt already packed bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes.len() != ceil(len / 2)`.
    pub fn from_bytes(bytes: Vec<u8>, len: usize) -> Result<Self> {
        if bytes.len() != packed_len(len) {
            return Err(KernelError::BufferTooSmall {
                buffer: "packed bytes",
                required: packed_len(len),
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes, len })
    }

    /// Number of logical elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the vector holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[must_use]
    pub fn get(&self, index: usize) -> i8 {
        self.as_weights().get(index)
    }

    /// Set the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len` or `value` is outside `[-8, 7]`.
    pub fn set(&mut self, index: usize, value: i8) {
        assert!(index < self.len, "index {index} out of bounds");
        assert!(
            (NIBBLE_MIN..=NIBBLE_MAX).contains(&value),
            "value {value} does not fit a nibble"
        );
        let nibble = (value as u8) & 0x0F;
        let byte = &mut self.bytes[index >> 1];
        *byte = if index & 1 == 1 {
            (*byte & 0x0F) | (nibble << 4)
        } else {
            (*byte & 0xF0) | nibble
        };
    }

    /// Packed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrow as a weight tensor.
    #[must_use]
    pub fn as_weights(&self) -> Int4Weights<'_> {
        Int4Weights {
            bytes: &self.bytes,
            len: self.len,
        }
    }

    /// Unpack to one `i8` per element.
    #[must_use]
    pub fn to_i8_vec(&self) -> Vec<i8> {
        Int4Cursor::new(&self.bytes, 0, 1).take(self.len).collect()
    }
}
