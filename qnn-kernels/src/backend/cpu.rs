// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! CPU backends: scalar reference and SIMD-accelerated.

use crate::backend::DotBackend;
use crate::simd;

/// Plain scalar loop, available everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarBackend;

impl DotBackend for ScalarBackend {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dot_s8(&self, lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
        simd::dot_s8_scalar(lhs, rhs, lhs_offset, rhs_offset)
    }
}

/// CPU backend with optional SIMD acceleration.
///
/// With `use_simd` set and the `simd` feature enabled, dot products use
/// AVX2 on `x86_64` (detected at run time) or NEON on `aarch64`.
#[derive(Debug, Clone, Copy)]
pub struct CpuBackend {
    use_simd: bool,
}

impl CpuBackend {
    /// Create a CPU backend.
    #[must_use]
    pub const fn new(use_simd: bool) -> Self {
        Self { use_simd }
    }

    /// SIMD enabled if available.
    #[must_use]
    pub const fn with_simd() -> Self {
        Self::new(true)
    }

    /// Scalar only.
    #[must_use]
    pub const fn scalar_only() -> Self {
        Self::new(false)
    }

    /// True if SIMD is requested and usable.
    #[must_use]
    pub fn simd_enabled(&self) -> bool {
        self.use_simd && simd::simd_available()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::with_simd()
    }
}

impl DotBackend for CpuBackend {
    fn name(&self) -> &'static str {
        if !self.simd_enabled() {
            return "cpu";
        }
        match simd::simd_impl_name() {
            "AVX2" => "cpu-avx2",
            "NEON" => "cpu-neon",
            _ => "cpu",
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dot_s8(&self, lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
        if self.simd_enabled() {
            simd::dot_s8_simd(lhs, rhs, lhs_offset, rhs_offset)
        } else {
            simd::dot_s8_scalar(lhs, rhs, lhs_offset, rhs_offset)
        }
    }
}
