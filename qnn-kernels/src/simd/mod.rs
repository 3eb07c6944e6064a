//! SIMD-accelerated reductions for 8-bit kernels.
//!
//! This module provides hardware-accelerated implementations when the `simd`
//! feature is enabled. Every accelerated path computes exactly what
//! [`dot_s8_scalar`] computes, including wrap-around of the 32-bit sum.
//!
//! ## Supported Platforms
//!
//! - **`x86_64`**: AVX2 (256-bit SIMD), detected at run time
//! - **`aarch64`**: NEON (128-bit SIMD)
//!
//! Kernels reduce through [`dot_s8`], which honours a process-wide switch.
//! [`crate::backend::install_backend`] sets it from a
//! [`crate::backend::BackendConfig`].

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
mod avx2;

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
mod neon;

/// Offsets beyond this magnitude would overflow the 16-bit lanes.
pub const MAX_SIMD_OFFSET: i32 = 255;

#[allow(dead_code)]
#[inline]
fn offsets_fit(lhs_offset: i32, rhs_offset: i32) -> bool {
    let limit = MAX_SIMD_OFFSET as u32;
    lhs_offset.unsigned_abs() <= limit && rhs_offset.unsigned_abs() <= limit
}

/// Scalar reference: `sum((lhs[i] + lhs_offset) * (rhs[i] + rhs_offset))`.
///
/// Runs over the shorter of the two slices and wraps on 32-bit overflow.
#[must_use]
pub fn dot_s8_scalar(lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
    lhs.iter().zip(rhs).fold(0i32, |acc, (&l, &r)| {
        let l = i32::from(l).wrapping_add(lhs_offset);
        let r = i32::from(r).wrapping_add(rhs_offset);
        acc.wrapping_add(l.wrapping_mul(r))
    })
}

static KERNEL_SIMD: AtomicBool = AtomicBool::new(true);

/// Allow or forbid the accelerated path inside every kernel of this process.
pub fn set_kernel_simd(enabled: bool) {
    KERNEL_SIMD.store(enabled, Ordering::Relaxed);
}

/// True if kernels may take the accelerated path.
#[must_use]
pub fn kernel_simd() -> bool {
    KERNEL_SIMD.load(Ordering::Relaxed)
}

/// Name of the path kernels currently reduce with.
#[must_use]
pub fn kernel_impl_name() -> &'static str {
    if kernel_simd() {
        simd_impl_name()
    } else {
        "scalar"
    }
}

/// Offset dot product used by the 8-bit kernels.
///
/// Takes [`dot_s8_simd`] while [`kernel_simd`] is set, [`dot_s8_scalar`]
/// otherwise.
#[must_use]
#[inline]
pub fn dot_s8(lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
    if kernel_simd() {
        dot_s8_simd(lhs, rhs, lhs_offset, rhs_offset)
    } else {
        dot_s8_scalar(lhs, rhs, lhs_offset, rhs_offset)
    }
}

/// Offset dot product of two `i8` slices on the fastest path available.
///
/// Uses AVX2/NEON when available and the offsets fit the widened lanes,
/// falls back to scalar otherwise.
#[must_use]
pub fn dot_s8_simd(lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
    let len = lhs.len().min(rhs.len());
    let (lhs, rhs) = (&lhs[..len], &rhs[..len]);

    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    {
        if offsets_fit(lhs_offset, rhs_offset) && is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 verified above, slices have equal length
            return unsafe { avx2::dot_s8_avx2(lhs, rhs, lhs_offset, rhs_offset) };
        }
    }

    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    {
        if offsets_fit(lhs_offset, rhs_offset) {
            // SAFETY: NEON is always available on aarch64, slices have equal length
            return unsafe { neon::dot_s8_neon(lhs, rhs, lhs_offset, rhs_offset) };
        }
    }

    dot_s8_scalar(lhs, rhs, lhs_offset, rhs_offset)
}

/// Check if SIMD optimizations are available on this platform.
#[must_use]
pub fn simd_available() -> bool {
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    {
        return is_x86_feature_detected!("avx2");
    }

    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    {
        return true;
    }

    #[allow(unreachable_code)]
    false
}

/// Get the name of the SIMD implementation being used.
#[must_use]
pub fn simd_impl_name() -> &'static str {
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx2") {
            return "AVX2";
        }
    }

    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    {
        return "NEON";
    }

    #[allow(unreachable_code)]
    "scalar"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: i32) -> Vec<i8> {
        (0..len as i32)
            .map(|i| ((i * 37 + seed * 11) % 256 - 128) as i8)
            .collect()
    }

    #[test]
    fn test_simd_dot_matches_scalar() {
        for len in [0, 1, 7, 15, 16, 17, 31, 33, 64, 257] {
            let a = pattern(len, 1);
            let b = pattern(len, 5);
            for (lo, ro) in [(0, 0), (128, 0), (-127, 3), (255, -255), (1000, 7), (i32::MIN, 3), (-2, i32::MIN)] {
                assert_eq!(
                    dot_s8_simd(&a, &b, lo, ro),
                    dot_s8_scalar(&a, &b, lo, ro),
                    "len {len} offsets ({lo}, {ro})"
                );
            }
        }
    }

    #[test]
    fn test_extremes_wrap_identically() {
        let a = vec![i8::MIN; 70_000];
        let b = vec![i8::MIN; 70_000];
        assert_eq!(dot_s8_simd(&a, &b, -255, -255), dot_s8_scalar(&a, &b, -255, -255));
    }

    #[test]
    fn test_simd_available() {
        let _available = simd_available();
        assert!(!simd_impl_name().is_empty());
    }
}
