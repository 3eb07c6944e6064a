//! AVX2 SIMD implementations for x86_64.

#![cfg(all(feature = "simd", target_arch = "x86_64"))]

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// AVX2-accelerated offset dot product of two `i8` slices.
///
/// Sixteen bytes per step are sign-extended to 16-bit lanes, offset, and
/// reduced pairwise into 32-bit lanes with `vpmaddwd`.
///
/// # Safety
///
/// Caller must ensure AVX2 is available (`is_x86_feature_detected!("avx2")`),
/// that both slices have the same length, and that both offsets are within
/// `±MAX_SIMD_OFFSET`.
#[target_feature(enable = "avx2")]
pub unsafe fn dot_s8_avx2(lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
    let len = lhs.len().min(rhs.len());
    let lhs_off = _mm256_set1_epi16(lhs_offset as i16);
    let rhs_off = _mm256_set1_epi16(rhs_offset as i16);
    let mut acc = _mm256_setzero_si256();

    let chunks = len / 16;
    for i in 0..chunks {
        let idx = i * 16;
        let a = _mm_loadu_si128(lhs[idx..].as_ptr().cast());
        let b = _mm_loadu_si128(rhs[idx..].as_ptr().cast());

        let a16 = _mm256_add_epi16(_mm256_cvtepi8_epi16(a), lhs_off);
        let b16 = _mm256_add_epi16(_mm256_cvtepi8_epi16(b), rhs_off);

        acc = _mm256_add_epi32(acc, _mm256_madd_epi16(a16, b16));
    }

    let lanes: [i32; 8] = std::mem::transmute(acc);
    let mut sum = lanes.iter().fold(0i32, |s, &v| s.wrapping_add(v));

    for i in chunks * 16..len {
        let l = i32::from(lhs[i]) + lhs_offset;
        let r = i32::from(rhs[i]) + rhs_offset;
        sum = sum.wrapping_add(l * r);
    }

    sum
}
