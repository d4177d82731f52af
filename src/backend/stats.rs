//! Per-method deletion counters, mutated lock-free by workers.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::method::DeletionMethod;

/// Atomic counters shared across workers. Final reads happen after join.
#[derive(Debug, Default)]
pub struct MethodStats {
    file_info: AtomicU64,
    delete_on_close: AtomicU64,
    nt_api: AtomicU64,
    delete_api: AtomicU64,
    fallback: AtomicU64,
    failures: AtomicU64,
}

impl MethodStats {
    /// Count one successful deletion under the primitive that achieved it.
    pub fn record_success(&self, method: DeletionMethod) {
        match method {
            DeletionMethod::FileInfo => &self.file_info,
            DeletionMethod::DeleteOnClose => &self.delete_on_close,
            DeletionMethod::NtApi => &self.nt_api,
            DeletionMethod::DeleteApi | DeletionMethod::Auto => &self.delete_api,
        }
        .fetch_add(1, Ordering::Relaxed);
    }

    /// Count a success achieved only through the portable fallback after a
    /// forced method failed.
    pub fn record_fallback_success(&self) {
        self.delete_api.fetch_add(1, Ordering::Relaxed);
        self.fallback.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one entry that no primitive could remove.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Race-free copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> MethodStatsSnapshot {
        MethodStatsSnapshot {
            file_info: self.file_info.load(Ordering::Relaxed),
            delete_on_close: self.delete_on_close.load(Ordering::Relaxed),
            nt_api: self.nt_api.load(Ordering::Relaxed),
            delete_api: self.delete_api.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value view of [`MethodStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MethodStatsSnapshot {
    pub file_info: u64,
    pub delete_on_close: u64,
    pub nt_api: u64,
    pub delete_api: u64,
    /// Successes that went through the portable fallback. Already included
    /// in `delete_api`.
    pub fallback: u64,
    pub failures: u64,
}

impl MethodStatsSnapshot {
    /// Sum of per-method success counters; equals the engine's deleted
    /// count for non-dry runs.
    #[must_use]
    pub const fn total_successes(&self) -> u64 {
        self.file_info + self.delete_on_close + self.nt_api + self.delete_api
    }
}
