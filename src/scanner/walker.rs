//! Parallel directory walker feeding the deletion plan.
//!
//! A bounded work queue of directories is drained by a small thread pool.
//! An atomic in-flight counter tracks outstanding directories; the pool
//! shuts down when it reaches zero. When the bounded queue would block an
//! enqueue, the worker processes that subdirectory inline instead of
//! waiting, which keeps the pool deadlock-free at any queue capacity.
//!
//! Reparse points are classified by the tag reported in the enumeration
//! record: links and junctions are recorded for deletion but never
//! traversed, placeholder stubs are traversed, opaque system reparse data is
//! skipped entirely.

#![allow(clippy::cast_possible_truncation)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel as channel;

use crate::core::errors::{FpError, Result};
use crate::logger::LoggerHandle;
use crate::platform::fsenum::{self, DirChild};
use crate::platform::native::NativePath;
use crate::scanner::plan::Entry;

/// Walker tuning derived from engine configuration.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Worker thread count; at least 1.
    pub parallelism: usize,
    /// Bounded work queue capacity; at least 1.
    pub queue_capacity: usize,
    /// Age-filter cutoff: files modified at or after this instant are
    /// retained. `None` deletes everything.
    pub cutoff: Option<SystemTime>,
}

/// Raw walk product, before plan assembly orders it.
#[derive(Debug, Default)]
pub struct WalkOutput {
    /// Deletable non-directories: plain files plus non-traversed reparse
    /// entries (which may carry the directory attribute).
    pub files: Vec<Entry>,
    /// Deletable directories, unordered. Empty when an age filter is active.
    pub dirs: Vec<Entry>,
    /// Files discovered, including retained ones.
    pub scanned_files: u64,
    /// Directories discovered, including the root.
    pub scanned_dirs: u64,
    /// Files excluded by the age filter.
    pub retained: u64,
}

#[derive(Debug, Default)]
struct WalkCounters {
    scanned_files: AtomicU64,
    scanned_dirs: AtomicU64,
    retained: AtomicU64,
}

/// Work item: directory path plus its depth below the root.
type WorkItem = (std::path::PathBuf, usize);

/// Which pile a discovered entry belongs to. Non-traversed reparse entries
/// are leaves even when they carry the directory attribute (junctions), so
/// the flag cannot be derived from `Entry::is_dir`.
enum Discovered {
    Leaf(Entry),
    Dir(Entry),
}

struct WalkContext<'a> {
    work_tx: &'a channel::Sender<WorkItem>,
    result_tx: &'a channel::Sender<Discovered>,
    in_flight: &'a AtomicUsize,
    counters: &'a WalkCounters,
    cutoff: Option<SystemTime>,
    logger: &'a LoggerHandle,
}

/// Walk the tree under `root` with a worker pool.
///
/// Per-directory failures are demoted to warnings; the walk only fails
/// wholesale when the pool itself cannot be spawned, in which case the
/// caller falls back to [`serial_walk`].
pub fn parallel_walk(root: &Path, config: &WalkerConfig, logger: &LoggerHandle) -> Result<WalkOutput> {
    let parallelism = config.parallelism.max(1);
    let capacity = config.queue_capacity.max(1);

    let (work_tx, work_rx) = channel::bounded::<WorkItem>(capacity);
    // Results are unbounded so workers never stall on collection.
    let (result_tx, result_rx) = channel::unbounded::<Discovered>();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let counters = Arc::new(WalkCounters::default());

    counters.scanned_dirs.fetch_add(1, Ordering::Relaxed);
    in_flight.fetch_add(1, Ordering::SeqCst);
    work_tx
        .send((root.to_path_buf(), 0))
        .map_err(|_| FpError::Internal {
            details: "walker queue closed before seeding".to_string(),
        })?;

    let mut workers = Vec::with_capacity(parallelism);
    for index in 0..parallelism {
        let work_rx = work_rx.clone();
        let worker_work_tx = work_tx.clone();
        let worker_result_tx = result_tx.clone();
        let in_flight = Arc::clone(&in_flight);
        let counters = Arc::clone(&counters);
        let cutoff = config.cutoff;
        let logger = logger.clone();

        let handle = thread::Builder::new()
            .name(format!("fastpurge-scan-{index}"))
            .spawn(move || {
                walker_thread(&work_rx, &worker_work_tx, &worker_result_tx, &in_flight, &counters, cutoff, &logger);
            })
            .map_err(|e| FpError::Internal {
                details: format!("failed to spawn scan worker: {e}"),
            });

        match handle {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                // Unwind: release the pool we already have.
                drop(work_tx);
                drop(result_tx);
                for handle in workers {
                    let _ = handle.join();
                }
                return Err(err);
            }
        }
    }

    // Drop our copies so the channels close once workers finish.
    drop(work_tx);
    drop(result_tx);

    let mut output = WalkOutput::default();
    for discovered in result_rx {
        match discovered {
            Discovered::Leaf(entry) => output.files.push(entry),
            Discovered::Dir(entry) => output.dirs.push(entry),
        }
    }

    for handle in workers {
        let _ = handle.join();
    }

    output.scanned_files = counters.scanned_files.load(Ordering::Relaxed);
    output.scanned_dirs = counters.scanned_dirs.load(Ordering::Relaxed);
    output.retained = counters.retained.load(Ordering::Relaxed);
    Ok(output)
}

fn walker_thread(
    work_rx: &channel::Receiver<WorkItem>,
    work_tx: &channel::Sender<WorkItem>,
    result_tx: &channel::Sender<Discovered>,
    in_flight: &AtomicUsize,
    counters: &WalkCounters,
    cutoff: Option<SystemTime>,
    logger: &LoggerHandle,
) {
    let ctx = WalkContext {
        work_tx,
        result_tx,
        in_flight,
        counters,
        cutoff,
        logger,
    };
    loop {
        match work_rx.recv_timeout(Duration::from_millis(50)) {
            Ok((dir, depth)) => {
                process_directory(&dir, depth, &ctx);
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                if in_flight.load(Ordering::SeqCst) == 0 {
                    return;
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Enumerate one directory, emit deletable children, enqueue subdirectories.
fn process_directory(dir: &Path, depth: usize, ctx: &WalkContext<'_>) {
    let children = match fsenum::read_dir_fast(dir) {
        Ok(children) => children,
        Err(fast_err) => match fsenum::read_dir_portable(dir) {
            Ok(children) => {
                ctx.logger.debug(
                    "scanner",
                    format!(
                        "fast enumeration failed for {} ({fast_err}); used portable fallback",
                        dir.display()
                    ),
                );
                children
            }
            Err(err) => {
                ctx.logger.warn(
                    "scanner",
                    format!("skipping unreadable directory {}: {err}", dir.display()),
                );
                return;
            }
        },
    };

    for child in children {
        handle_child(child, depth + 1, ctx);
    }
}

fn handle_child(child: DirChild, depth: usize, ctx: &WalkContext<'_>) {
    if let Some(kind) = child.reparse {
        if !kind.deletable() {
            ctx.logger.debug(
                "scanner",
                format!("skipping opaque reparse point {}", child.path.display()),
            );
            return;
        }
        if !kind.traversable() {
            // Link or junction: delete the entry itself, never descend.
            record_leaf(&child, depth, ctx);
            return;
        }
        // Placeholder stub: the content is real; fall through to the
        // directory/file handling below.
    }

    if child.is_dir {
        ctx.counters.scanned_dirs.fetch_add(1, Ordering::Relaxed);
        if ctx.cutoff.is_none()
            && let Some(entry) = convert_entry(&child, depth, true, ctx.logger)
        {
            let _ = ctx.result_tx.send(Discovered::Dir(entry));
        }
        enqueue_or_inline(child.path, depth, ctx);
        return;
    }

    record_leaf(&child, depth, ctx);
}

/// Record a plain file or a non-traversed reparse entry, honoring the age
/// filter.
fn record_leaf(child: &DirChild, depth: usize, ctx: &WalkContext<'_>) {
    ctx.counters.scanned_files.fetch_add(1, Ordering::Relaxed);

    if let Some(cutoff) = ctx.cutoff
        && child.modified >= cutoff
    {
        ctx.counters.retained.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if let Some(entry) = convert_entry(child, depth, child.is_dir, ctx.logger) {
        let _ = ctx.result_tx.send(Discovered::Leaf(entry));
    }
}

/// Enqueue a subdirectory; if the bounded queue is full, process it inline
/// on this worker to avoid blocking against a full pipeline.
fn enqueue_or_inline(dir: std::path::PathBuf, depth: usize, ctx: &WalkContext<'_>) {
    ctx.in_flight.fetch_add(1, Ordering::SeqCst);
    match ctx.work_tx.try_send((dir, depth)) {
        Ok(()) => {}
        Err(channel::TrySendError::Full((dir, depth))) => {
            process_directory(&dir, depth, ctx);
            ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Err(channel::TrySendError::Disconnected(_)) => {
            ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

fn convert_entry(
    child: &DirChild,
    depth: usize,
    is_dir: bool,
    logger: &LoggerHandle,
) -> Option<Entry> {
    match NativePath::from_path(&child.path) {
        Ok(native) => Some(Entry {
            path: child.path.clone(),
            native,
            is_dir,
            size_bytes: if is_dir { 0 } else { child.size_bytes },
            depth,
        }),
        Err(err) => {
            logger.warn(
                "scanner",
                format!(
                    "omitting entry with unconvertible path {}: {err}",
                    child.path.display()
                ),
            );
            None
        }
    }
}

/// Single-threaded fallback walk producing the same invariants as the
/// parallel path.
pub fn serial_walk(
    root: &Path,
    cutoff: Option<SystemTime>,
    logger: &LoggerHandle,
) -> Result<WalkOutput> {
    let mut output = WalkOutput {
        scanned_dirs: 1,
        ..WalkOutput::default()
    };
    serial_visit(root, 0, cutoff, &mut output, logger);
    Ok(output)
}

fn serial_visit(
    dir: &Path,
    depth: usize,
    cutoff: Option<SystemTime>,
    output: &mut WalkOutput,
    logger: &LoggerHandle,
) {
    let children = match fsenum::read_dir_portable(dir) {
        Ok(children) => children,
        Err(err) => {
            logger.warn(
                "scanner",
                format!("skipping unreadable directory {}: {err}", dir.display()),
            );
            return;
        }
    };

    for child in children {
        let child_depth = depth + 1;

        if let Some(kind) = child.reparse {
            if !kind.deletable() {
                continue;
            }
            if !kind.traversable() {
                serial_record_leaf(&child, child_depth, cutoff, output, logger);
                continue;
            }
        }

        if child.is_dir {
            output.scanned_dirs += 1;
            if cutoff.is_none()
                && let Some(entry) = convert_entry(&child, child_depth, true, logger)
            {
                output.dirs.push(entry);
            }
            serial_visit(&child.path, child_depth, cutoff, output, logger);
        } else {
            serial_record_leaf(&child, child_depth, cutoff, output, logger);
        }
    }
}

fn serial_record_leaf(
    child: &DirChild,
    depth: usize,
    cutoff: Option<SystemTime>,
    output: &mut WalkOutput,
    logger: &LoggerHandle,
) {
    output.scanned_files += 1;
    if let Some(cutoff) = cutoff
        && child.modified >= cutoff
    {
        output.retained += 1;
        return;
    }
    if let Some(entry) = convert_entry(child, depth, child.is_dir, logger) {
        output.files.push(entry);
    }
}
