// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Interchangeable execution strategies for the 8-bit dot product.
//!
//! Kernels reduce through [`crate::simd::dot_s8`]. [`install_backend`] makes
//! a [`BackendConfig`] the process-wide choice for that path, and
//! [`active_backend`] reports it. The same strategies are also available as
//! explicit objects through [`select_backend`], for callers that drive dot
//! products themselves or compare the two paths.
//!
//! ```text
//! +-------------+
//! | DotBackend  |  <- name, availability, dot_s8
//! +-------------+
//!     |      |
//!     v      v
//! +--------+ +-----------------+
//! | Scalar | | Cpu (AVX2/NEON) |
//! +--------+ +-----------------+
//! ```
//!
//! Every backend returns bit-identical results, including 32-bit wrap.

pub mod cpu;

use std::sync::Once;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, Result};

pub use cpu::{CpuBackend, ScalarBackend};

/// Backend selection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Use SIMD when the build and CPU support it (default: true).
    pub prefer_simd: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::auto()
    }
}

impl BackendConfig {
    /// Fastest available path.
    #[must_use]
    pub const fn auto() -> Self {
        Self { prefer_simd: true }
    }

    /// Scalar reference path only.
    #[must_use]
    pub const fn scalar_only() -> Self {
        Self { prefer_simd: false }
    }

    /// Enable or disable SIMD.
    #[must_use]
    pub const fn with_simd(mut self, enabled: bool) -> Self {
        self.prefer_simd = enabled;
        self
    }
}

/// An execution strategy for offset 8-bit dot products.
///
/// Implementations must be `Send + Sync` and agree exactly with
/// [`crate::simd::dot_s8_scalar`].
pub trait DotBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// True if this backend can run on the current machine.
    fn is_available(&self) -> bool;

    /// `sum((lhs[i] + lhs_offset) * (rhs[i] + rhs_offset))` over the shorter slice.
    fn dot_s8(&self, lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32;

    /// Raw accumulators of one row against each of `rows` weight rows.
    ///
    /// # Errors
    ///
    /// Returns an error if `rhs` or `out` is too short.
    fn row_dots_s8(
        &self,
        lhs: &[i8],
        rhs: &[i8],
        rows: usize,
        lhs_offset: i32,
        rhs_offset: i32,
        out: &mut [i32],
    ) -> Result<()> {
        let cols = lhs.len();
        ensure_len("rhs", rows * cols, rhs.len())?;
        ensure_len("out", rows, out.len())?;
        if cols == 0 {
            out[..rows].fill(0);
            return Ok(());
        }
        for (acc, row) in out.iter_mut().zip(rhs.chunks_exact(cols)).take(rows) {
            *acc = self.dot_s8(lhs, row, lhs_offset, rhs_offset);
        }
        Ok(())
    }
}

/// Boxed backend chosen at run time.
pub struct DynamicBackend {
    inner: Box<dyn DotBackend>,
}

impl DynamicBackend {
    /// Wrap a concrete backend.
    pub fn new<B: DotBackend + 'static>(backend: B) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }

    /// The wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &dyn DotBackend {
        &*self.inner
    }
}

impl std::fmt::Debug for DynamicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBackend")
            .field("name", &self.inner.name())
            .finish()
    }
}

impl DotBackend for DynamicBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn dot_s8(&self, lhs: &[i8], rhs: &[i8], lhs_offset: i32, rhs_offset: i32) -> i32 {
        self.inner.dot_s8(lhs, rhs, lhs_offset, rhs_offset)
    }
}

/// Pick a backend for `config`.
///
/// Falls back to scalar when SIMD is not compiled in or not supported. The
/// first selection in a process is logged at debug level.
#[must_use]
pub fn select_backend(config: &BackendConfig) -> DynamicBackend {
    static LOG_ONCE: Once = Once::new();

    let backend = if config.prefer_simd && crate::simd::simd_available() {
        DynamicBackend::new(CpuBackend::with_simd())
    } else {
        DynamicBackend::new(ScalarBackend)
    };

    LOG_ONCE.call_once(|| {
        tracing::debug!(
            backend = backend.name(),
            prefer_simd = config.prefer_simd,
            simd = crate::simd::simd_impl_name(),
            "selected dot-product backend"
        );
    });
    backend
}

/// Make `config` the dot-product path of every kernel in this process.
///
/// Returns the backend kernels now use. Results do not change, only the
/// path that computes them.
pub fn install_backend(config: &BackendConfig) -> DynamicBackend {
    crate::simd::set_kernel_simd(config.prefer_simd);
    let backend = select_backend(config);
    tracing::debug!(backend = backend.name(), "installed kernel backend");
    backend
}

/// The backend kernels currently use.
#[must_use]
pub fn active_backend() -> DynamicBackend {
    select_backend(&BackendConfig::auto().with_simd(crate::simd::kernel_simd()))
}
