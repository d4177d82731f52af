//! Scan orchestration: walk the tree, then assemble the bottom-up plan.

pub mod plan;
pub mod walker;

use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use crate::core::errors::{FpError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::logger::LoggerHandle;
use crate::platform::native::NativePath;
use crate::platform::probes;
use crate::scanner::plan::{Entry, ScanPlan, ScanTotals};
use crate::scanner::walker::{WalkOutput, WalkerConfig, parallel_walk, serial_walk};

/// Default bounded work-queue capacity for the walker.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Scan tuning.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Retain files newer than this many days. `None` or `Some(0)` deletes
    /// everything.
    pub keep_days: Option<u64>,
    /// Walker threads; 0 picks the hardware parallelism.
    pub parallelism: usize,
    /// Bounded queue capacity; 0 picks the default.
    pub queue_capacity: usize,
}

/// Scan the tree rooted at `root` and produce a single-use deletion plan.
///
/// The plan is bottom-up: files first in arbitrary order, then directories
/// by descending depth (ties broken by descending path length), then the
/// root itself when the whole tree is going away. If the parallel walker
/// cannot start, a single-threaded walk produces an identically-ordered
/// plan.
pub fn scan(root: &Path, options: &ScanOptions, logger: &LoggerHandle) -> Result<ScanPlan> {
    let started = Instant::now();

    let metadata = std::fs::symlink_metadata(root).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => FpError::NotFound {
            path: root.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => FpError::AccessDenied {
            path: root.to_path_buf(),
        },
        _ => FpError::ScanFailed {
            path: root.to_path_buf(),
            details: err.to_string(),
        },
    })?;
    if !metadata.is_dir() {
        return Err(FpError::InvalidArgument {
            details: format!("target is not a directory: {}", root.display()),
        });
    }

    let canonical_root = resolve_absolute_path(root);
    let cutoff = age_cutoff(options.keep_days, SystemTime::now());

    let walker_config = WalkerConfig {
        parallelism: if options.parallelism == 0 {
            probes::logical_cpus()
        } else {
            options.parallelism
        },
        queue_capacity: if options.queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            options.queue_capacity
        },
        cutoff,
    };

    let output = match parallel_walk(&canonical_root, &walker_config, logger) {
        Ok(output) => output,
        Err(err) => {
            logger.warn(
                "scanner",
                format!("parallel scan failed ({err}); falling back to serial walk"),
            );
            serial_walk(&canonical_root, cutoff, logger)?
        }
    };

    Ok(assemble_plan(
        canonical_root,
        output,
        cutoff.is_none(),
        started.elapsed(),
        logger,
    ))
}

/// Compute the retain cutoff. Files modified at or after the cutoff stay.
fn age_cutoff(keep_days: Option<u64>, now: SystemTime) -> Option<SystemTime> {
    match keep_days {
        None | Some(0) => None,
        Some(days) => Some(now - Duration::from_secs(days * 24 * 60 * 60)),
    }
}

fn assemble_plan(
    root: std::path::PathBuf,
    output: WalkOutput,
    whole_tree: bool,
    duration: Duration,
    logger: &LoggerHandle,
) -> ScanPlan {
    let WalkOutput {
        files,
        mut dirs,
        scanned_files,
        scanned_dirs,
        retained,
    } = output;

    // Children before parents: deepest directories first, longer paths
    // first among equals.
    dirs.sort_by(|a, b| {
        b.depth
            .cmp(&a.depth)
            .then(b.path.as_os_str().len().cmp(&a.path.as_os_str().len()))
    });

    let bytes: u64 = files.iter().map(|e| e.size_bytes).sum();

    let mut entries = files;
    entries.append(&mut dirs);

    let mut includes_root = false;
    if whole_tree {
        match NativePath::from_path(&root) {
            Ok(native) => {
                entries.push(Entry {
                    path: root.clone(),
                    native,
                    is_dir: true,
                    size_bytes: 0,
                    depth: 0,
                });
                includes_root = true;
            }
            Err(err) => {
                logger.warn(
                    "scanner",
                    format!("root path not convertible, leaving root in place: {err}"),
                );
            }
        }
    }

    let totals = ScanTotals {
        scanned_files,
        scanned_dirs,
        to_delete: entries.len() as u64,
        retained,
        bytes,
    };

    ScanPlan {
        root,
        entries,
        totals,
        duration,
        includes_root,
    }
}
