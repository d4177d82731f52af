//! Deletion engine: bounded worker pool draining the plan in depth layers.
//!
//! The plan arrives bottom-up, but ordering alone cannot stop a worker from
//! starting a parent directory while a sibling worker is still finishing the
//! parent's last child. The engine therefore releases entries one depth
//! layer at a time: no entry at depth d is dispatched until every entry at
//! depth > d has completed.
//!
//! The producer and the result aggregator share the engine's calling
//! thread, which also makes progress callbacks serialized and monotonic for
//! free.

#![allow(missing_docs)]

pub mod rate;

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use parking_lot::Mutex;

use crate::backend::{Backend, DeletionOutcome, MethodStatsSnapshot};
use crate::core::cancel::CancelToken;
use crate::core::errors::{EntryErrorKind, FpError, Result};
use crate::logger::LoggerHandle;
use crate::platform::probes;
use crate::scanner::plan::{Entry, ScanPlan};

use rate::RateTracker;

/// Plans at or above this size get the full worker pool; tiny plans run on
/// one worker.
const LARGE_PLAN_THRESHOLD: usize = 1024;
/// Auto worker count: logical CPUs times this.
const WORKER_MULTIPLIER: usize = 2;
/// Default bounded channel capacity between producer and workers.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Engine tuning. Zeroes mean "pick automatically".
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub dry_run: bool,
    pub workers: usize,
    pub buffer_size: usize,
}

/// One failed entry, in completion order.
#[derive(Debug, Clone)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub kind: EntryErrorKind,
    pub message: String,
}

/// Final accounting for one run.
#[derive(Debug)]
pub struct RunResult {
    pub deleted: u64,
    pub failed: u64,
    /// Entries never attempted because the run was cancelled.
    pub skipped: u64,
    /// Files the age filter kept, copied from the plan.
    pub retained: u64,
    pub bytes_deleted: u64,
    pub duration: Duration,
    /// Fastest sampled window, entries/second.
    pub peak_rate: f64,
    pub avg_rate: f64,
    pub cancelled: bool,
    pub dry_run: bool,
    pub method_stats: MethodStatsSnapshot,
    pub errors: Vec<EntryFailure>,
    /// Attached by the caller after the monitor freezes its samples.
    pub bottleneck_report: Option<String>,
}

/// Live counters shared with the resource monitor. Mutated lock-free by the
/// aggregation loop; read by the monitor thread.
#[derive(Debug, Default)]
pub struct EngineCounters {
    processed: AtomicU64,
    deleted: AtomicU64,
    bytes: AtomicU64,
    rate_bits: AtomicU64,
    active_workers: AtomicUsize,
}

impl EngineCounters {
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_deleted(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Most recent sampled window rate, entries/second.
    #[must_use]
    pub fn current_rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    fn publish_rate(&self, rate: f64) {
        self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }
}

enum ItemResult {
    Deleted { bytes: u64 },
    Failed,
    Skipped,
}

/// Drives workers over a single-use plan.
pub struct Engine {
    backend: Arc<Backend>,
    logger: LoggerHandle,
    counters: Arc<EngineCounters>,
}

impl Engine {
    #[must_use]
    pub fn new(backend: Backend, logger: LoggerHandle) -> Self {
        Self {
            backend: Arc::new(backend),
            logger,
            counters: Arc::new(EngineCounters::default()),
        }
    }

    /// Live counters for sidecar observers.
    #[must_use]
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }

    /// Consume the plan and delete everything in it.
    ///
    /// Per-entry failures never stop the run. Cancellation drains nothing
    /// further, counts the remainder as skipped, joins all workers, and
    /// returns the partial result. Only a failure to spawn the pool is
    /// fatal.
    pub fn run(
        &self,
        plan: ScanPlan,
        options: &EngineOptions,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(u64),
    ) -> Result<RunResult> {
        let started = Instant::now();
        let to_delete = plan.totals.to_delete;
        let retained = plan.totals.retained;

        let worker_count = effective_workers(options.workers, plan.entries.len());
        let capacity = if options.buffer_size == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            options.buffer_size
        };

        self.logger.info(
            "engine",
            format!(
                "starting {} run: {} entries, {worker_count} workers, buffer {capacity}",
                if options.dry_run { "dry" } else { "deletion" },
                plan.entries.len()
            ),
        );

        // Depth layers, deepest first. Entries keep plan order inside a layer.
        let mut layers: BTreeMap<usize, Vec<Entry>> = BTreeMap::new();
        for entry in plan.entries {
            layers.entry(entry.depth).or_default().push(entry);
        }

        let (work_tx, work_rx) = channel::bounded::<Entry>(capacity);
        let (result_tx, result_rx) = channel::unbounded::<ItemResult>();
        let errors = Arc::new(Mutex::new(Vec::<EntryFailure>::new()));

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let backend = Arc::clone(&self.backend);
            let logger = self.logger.clone();
            let cancel = cancel.clone();
            let errors = Arc::clone(&errors);
            let dry_run = options.dry_run;

            let spawned = thread::Builder::new()
                .name(format!("fastpurge-del-{index}"))
                .spawn(move || {
                    worker_loop(&work_rx, &result_tx, &backend, &logger, &cancel, &errors, dry_run);
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    drop(work_tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(FpError::Internal {
                        details: format!("failed to spawn deletion workers: {err}"),
                    });
                }
            }
        }
        drop(work_rx);
        drop(result_tx);
        self.counters
            .active_workers
            .store(worker_count, Ordering::Relaxed);

        let mut deleted = 0u64;
        let mut failed = 0u64;
        let mut skipped = 0u64;
        let mut bytes_deleted = 0u64;
        let mut tracker = RateTracker::new(started);

        let mut handle_result = |msg: ItemResult,
                                 deleted: &mut u64,
                                 failed: &mut u64,
                                 skipped: &mut u64,
                                 bytes_deleted: &mut u64,
                                 tracker: &mut RateTracker| {
            match msg {
                ItemResult::Deleted { bytes } => {
                    *deleted += 1;
                    *bytes_deleted += bytes;
                    self.counters.deleted.fetch_add(1, Ordering::Relaxed);
                    self.counters.bytes.fetch_add(bytes, Ordering::Relaxed);
                }
                ItemResult::Failed => *failed += 1,
                ItemResult::Skipped => {
                    *skipped += 1;
                    return false;
                }
            }
            let processed = self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(rate) = tracker.record(Instant::now()) {
                self.counters.publish_rate(rate);
            }
            progress(processed);
            true
        };

        // Depth barrier: fully drain each layer before releasing the next.
        'layers: for (_, layer) in layers.into_iter().rev() {
            let total = layer.len();
            let mut queue: VecDeque<Entry> = layer.into();
            let mut sent = 0usize;
            let mut received = 0usize;

            while received < total {
                // Stop feeding on cancellation; entries already queued come
                // back as skipped, unsent ones are counted below.
                if cancel.is_cancelled() && received == sent {
                    skipped += (total - sent) as u64;
                    break 'layers;
                }

                if sent < total && !cancel.is_cancelled() {
                    let item = queue.pop_front().expect("layer queue matches count");
                    match work_tx.try_send(item) {
                        Ok(()) => {
                            sent += 1;
                        }
                        Err(channel::TrySendError::Full(item)) => {
                            // Queue full means workers are saturated, so a
                            // result is on its way; block on it and retry
                            // this slot next iteration.
                            queue.push_front(item);
                            match result_rx.recv() {
                                Ok(msg) => {
                                    received += 1;
                                    handle_result(
                                        msg,
                                        &mut deleted,
                                        &mut failed,
                                        &mut skipped,
                                        &mut bytes_deleted,
                                        &mut tracker,
                                    );
                                }
                                Err(_) => break 'layers,
                            }
                        }
                        Err(channel::TrySendError::Disconnected(_)) => break 'layers,
                    }
                } else {
                    match result_rx.recv() {
                        Ok(msg) => {
                            received += 1;
                            handle_result(
                                msg,
                                &mut deleted,
                                &mut failed,
                                &mut skipped,
                                &mut bytes_deleted,
                                &mut tracker,
                            );
                        }
                        Err(_) => break 'layers,
                    }
                }

                // Opportunistically drain finished work between sends.
                while received < sent {
                    match result_rx.try_recv() {
                        Ok(msg) => {
                            received += 1;
                            handle_result(
                                msg,
                                &mut deleted,
                                &mut failed,
                                &mut skipped,
                                &mut bytes_deleted,
                                &mut tracker,
                            );
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Close the queue and join everyone before publishing the result.
        drop(work_tx);
        for handle in workers {
            let _ = handle.join();
        }
        self.counters.active_workers.store(0, Ordering::Relaxed);

        // Entries from skipped layers were never counted in the loop above.
        let accounted = deleted + failed + skipped;
        if accounted < to_delete {
            skipped += to_delete - accounted;
        }

        let ended = Instant::now();
        let (peak_rate, avg_rate) = tracker.finish(ended, started);
        let errors = std::mem::take(&mut *errors.lock());
        let cancelled = cancel.is_cancelled();

        if cancelled {
            self.logger.warn(
                "engine",
                format!("run cancelled: {deleted} deleted, {skipped} skipped"),
            );
        }

        Ok(RunResult {
            deleted,
            failed,
            skipped,
            retained,
            bytes_deleted,
            duration: ended.duration_since(started),
            peak_rate,
            avg_rate,
            cancelled,
            dry_run: options.dry_run,
            method_stats: self.backend.stats(),
            errors,
            bottleneck_report: None,
        })
    }
}

fn effective_workers(configured: usize, plan_len: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    if plan_len >= LARGE_PLAN_THRESHOLD {
        probes::logical_cpus() * WORKER_MULTIPLIER
    } else {
        1
    }
}

fn worker_loop(
    work_rx: &channel::Receiver<Entry>,
    result_tx: &channel::Sender<ItemResult>,
    backend: &Backend,
    logger: &LoggerHandle,
    cancel: &CancelToken,
    errors: &Mutex<Vec<EntryFailure>>,
    dry_run: bool,
) {
    while let Ok(entry) = work_rx.recv() {
        if cancel.is_cancelled() {
            let _ = result_tx.send(ItemResult::Skipped);
            continue;
        }

        if dry_run {
            if logger.enabled(crate::logger::Level::Debug) {
                logger.debug(
                    "engine",
                    format!("dry-run: would delete {}", entry.path.display()),
                );
            }
            let _ = result_tx.send(ItemResult::Deleted {
                bytes: entry.size_bytes,
            });
            continue;
        }

        let attempt = catch_unwind(AssertUnwindSafe(|| {
            backend.delete_entry(&entry.native, entry.is_dir)
        }));

        let result = match attempt {
            Ok(DeletionOutcome::Deleted { .. }) => ItemResult::Deleted {
                bytes: entry.size_bytes,
            },
            Ok(DeletionOutcome::Failed { kind, message }) => {
                errors.lock().push(EntryFailure {
                    path: entry.path.clone(),
                    kind,
                    message,
                });
                ItemResult::Failed
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                logger.error(
                    "engine",
                    format!("backend panicked on {}: {message}", entry.path.display()),
                );
                errors.lock().push(EntryFailure {
                    path: entry.path.clone(),
                    kind: EntryErrorKind::Io,
                    message: format!("backend panicked: {message}"),
                });
                ItemResult::Failed
            }
        };
        let _ = result_tx.send(result);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
