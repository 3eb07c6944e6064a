//! ARM NEON SIMD implementations for aarch64.

#![cfg(all(feature = "simd", target_arch = "aarch64"))]

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

/// NEON-accelerated offset dot product of two `i8` slices.
///
/// # Safety
///
/// NEON is always available on aarch64. Both slices must have the same
/// length and both offsets must be within `±MAX_SIMD_OFFSET`.
pub unsafe fn dot_s8_neon(lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
    let len = lhs.len().min(rhs.len());
    let lhs_off = vdupq_n_s16(lhs_offset as i16);
    let rhs_off = vdupq_n_s16(rhs_offset as i16);
    let mut acc = vdupq_n_s32(0);

    // 8 bytes per step, widened to one 128-bit register of i16
    let chunks = len / 8;
    for i in 0..chunks {
        let idx = i * 8;
        let a = vaddq_s16(vmovl_s8(vld1_s8(lhs[idx..].as_ptr())), lhs_off);
        let b = vaddq_s16(vmovl_s8(vld1_s8(rhs[idx..].as_ptr())), rhs_off);

        acc = vmlal_s16(acc, vget_low_s16(a), vget_low_s16(b));
        acc = vmlal_high_s16(acc, a, b);
    }

    let mut sum = vaddvq_s32(acc);

    for i in chunks * 8..len {
        let l = i32::from(lhs[i]) + lhs_offset;
        let r = i32::from(rhs[i]) + rhs_offset;
        sum = sum.wrapping_add(l * r);
    }

    sum
}
