//! Deletion backend: per-entry primitive selection, fallback cascade, stats.

pub mod bench;
pub mod method;
mod portable;
pub mod stats;
#[cfg(windows)]
mod windows;

use std::io;

use crate::core::errors::EntryErrorKind;
use crate::platform::native::NativePath;

pub use method::DeletionMethod;
pub use stats::{MethodStats, MethodStatsSnapshot};

/// Result of one deletion attempt.
#[derive(Debug, Clone)]
pub enum DeletionOutcome {
    /// Entry is gone. `method` is the primitive that achieved it (or was
    /// attempting it when the entry turned out to be already gone).
    Deleted {
        method: DeletionMethod,
        /// True when the success came through the portable fallback after a
        /// forced method failed.
        via_fallback: bool,
    },
    /// No primitive could remove the entry.
    Failed {
        kind: EntryErrorKind,
        message: String,
    },
}

impl DeletionOutcome {
    /// Convenience predicate.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// Executes deletions with a configured primitive and records statistics.
///
/// `Auto` cascades through the host's primitives in fixed order. A forced
/// method attempts only itself; whether it then falls through to the
/// portable primitive is governed by `fallback_to_delete_api`.
#[derive(Debug)]
pub struct Backend {
    method: DeletionMethod,
    fallback_to_delete_api: bool,
    stats: MethodStats,
}

impl Backend {
    #[must_use]
    pub fn new(method: DeletionMethod, fallback_to_delete_api: bool) -> Self {
        Self {
            method,
            fallback_to_delete_api,
            stats: MethodStats::default(),
        }
    }

    /// Replace the active method. Statistics carry over.
    pub fn set_method(&mut self, method: DeletionMethod) {
        self.method = method;
    }

    /// The configured method.
    #[must_use]
    pub const fn method(&self) -> DeletionMethod {
        self.method
    }

    /// Delete one entry via its pre-converted native buffer.
    ///
    /// An entry that vanished between scan and delete counts as a success;
    /// the goal is achieved either way.
    pub fn delete_entry(&self, native: &NativePath, is_dir: bool) -> DeletionOutcome {
        // Directories only ever go through the portable primitive; the plan
        // guarantees they are empty by the time they arrive here.
        let sequence: &[DeletionMethod] = if is_dir {
            &[DeletionMethod::DeleteApi]
        } else {
            match self.method {
                DeletionMethod::Auto => DeletionMethod::auto_cascade(),
                ref forced => std::slice::from_ref(forced),
            }
        };

        let mut last_error: Option<io::Error> = None;
        for &method in sequence {
            match attempt(method, native, is_dir) {
                Ok(()) => {
                    self.stats.record_success(method);
                    return DeletionOutcome::Deleted {
                        method,
                        via_fallback: false,
                    };
                }
                Err(err) if EntryErrorKind::classify(&err).counts_as_success() => {
                    self.stats.record_success(method);
                    return DeletionOutcome::Deleted {
                        method,
                        via_fallback: false,
                    };
                }
                Err(err) => last_error = Some(err),
            }
        }

        // Forced-method miss: optionally fall through to the guaranteed
        // portable primitive.
        if !is_dir
            && self.fallback_to_delete_api
            && self.method != DeletionMethod::Auto
            && self.method != DeletionMethod::DeleteApi
        {
            match attempt(DeletionMethod::DeleteApi, native, is_dir) {
                Ok(()) => {
                    self.stats.record_fallback_success();
                    return DeletionOutcome::Deleted {
                        method: DeletionMethod::DeleteApi,
                        via_fallback: true,
                    };
                }
                Err(err) if EntryErrorKind::classify(&err).counts_as_success() => {
                    self.stats.record_fallback_success();
                    return DeletionOutcome::Deleted {
                        method: DeletionMethod::DeleteApi,
                        via_fallback: true,
                    };
                }
                Err(err) => last_error = Some(err),
            }
        }

        self.stats.record_failure();
        let err = last_error.unwrap_or_else(|| io::Error::other("no deletion method attempted"));
        DeletionOutcome::Failed {
            kind: EntryErrorKind::classify(&err),
            message: err.to_string(),
        }
    }

    /// Race-free statistics snapshot; read after workers are joined.
    #[must_use]
    pub fn stats(&self) -> MethodStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Run one primitive. Off Windows the three handle-based primitives do not
/// exist and report unsupported, which lets the cascade and the forced-
/// method fallback behave identically on every host.
fn attempt(method: DeletionMethod, native: &NativePath, is_dir: bool) -> io::Result<()> {
    #[cfg(windows)]
    {
        match (method, is_dir) {
            (DeletionMethod::FileInfo, false) => windows::delete_file_disposition(native),
            (DeletionMethod::DeleteOnClose, false) => windows::delete_file_on_close(native),
            (DeletionMethod::NtApi, false) => windows::delete_file_nt(native),
            (DeletionMethod::DeleteApi, false) => windows::delete_file_api(native),
            (DeletionMethod::DeleteApi, true) => windows::remove_dir_api(native),
            (method, true) => Err(io::Error::other(format!(
                "method {method} does not apply to directories"
            ))),
            (DeletionMethod::Auto, _) => Err(io::Error::other("auto is a selection, not a primitive")),
        }
    }
    #[cfg(not(windows))]
    {
        match method {
            DeletionMethod::DeleteApi => {
                if is_dir {
                    portable::remove_dir(native)
                } else {
                    portable::delete_file(native)
                }
            }
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("method {other} is unavailable on this host"),
            )),
        }
    }
}
