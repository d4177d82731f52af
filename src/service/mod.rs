//! Headless deletion service consumed by GUI front ends.
//!
//! Holds the one scan result a shell is allowed to act on. The plan slot is
//! single-use: `start_deletion` consumes and nulls it atomically, verifies
//! the canonical scanned path against the canonical target supplied at
//! start (TOCTOU defense), and refuses concurrent runs through a
//! single-slot flag that is cleared in a guaranteed post-run scope.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::{Backend, DeletionMethod, MethodStatsSnapshot};
use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::errors::{FpError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::engine::{Engine, EngineCounters, EngineOptions, RunResult};
use crate::logger::LoggerHandle;
use crate::monitor::{MonitorSources, ResourceMonitor};
use crate::safety;
use crate::scanner::plan::ScanPlan;
use crate::scanner::{ScanOptions, scan};

// ──────────────────── DTOs ────────────────────

/// `ValidatePath` response.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDto {
    pub path: String,
    pub canonical: String,
    pub safe: bool,
    pub reason: Option<String>,
}

/// `ScanDirectory` response.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummaryDto {
    pub root: String,
    pub scanned_files: u64,
    pub scanned_dirs: u64,
    pub to_delete: u64,
    pub retained: u64,
    pub total_bytes: u64,
    pub duration_ms: u64,
    pub includes_root: bool,
}

/// One failed entry in a run result.
#[derive(Debug, Clone, Serialize)]
pub struct EntryErrorDto {
    pub path: String,
    pub kind: crate::core::errors::EntryErrorKind,
    pub message: String,
}

/// `StartDeletion` response / `deletion:complete` payload.
#[derive(Debug, Clone, Serialize)]
pub struct RunResultDto {
    pub deleted: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retained: u64,
    pub bytes_deleted: u64,
    pub duration_ms: u64,
    pub peak_rate: f64,
    pub avg_rate: f64,
    pub cancelled: bool,
    pub dry_run: bool,
    pub method_stats: MethodStatsSnapshot,
    pub errors: Vec<EntryErrorDto>,
    pub bottleneck_report: Option<String>,
}

impl RunResultDto {
    fn from_result(result: &RunResult) -> Self {
        Self {
            deleted: result.deleted,
            failed: result.failed,
            skipped: result.skipped,
            retained: result.retained,
            bytes_deleted: result.bytes_deleted,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            peak_rate: result.peak_rate,
            avg_rate: result.avg_rate,
            cancelled: result.cancelled,
            dry_run: result.dry_run,
            method_stats: result.method_stats,
            errors: result
                .errors
                .iter()
                .map(|e| EntryErrorDto {
                    path: e.path.display().to_string(),
                    kind: e.kind,
                    message: e.message.clone(),
                })
                .collect(),
            bottleneck_report: result.bottleneck_report.clone(),
        }
    }
}

/// `GetLiveMetrics` response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveMetricsDto {
    pub running: bool,
    pub files_done: u64,
    pub deleted: u64,
    pub bytes_deleted: u64,
    pub rate: f64,
}

/// Events pushed to the shell while a deletion runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServiceEvent {
    #[serde(rename = "progress:update")]
    Progress { files_done: u64 },
    #[serde(rename = "deletion:complete")]
    Complete(RunResultDto),
    #[serde(rename = "deletion:error")]
    Error { code: String, message: String },
}

// ──────────────────── service ────────────────────

/// One service instance per shell. Thread-safe.
pub struct DeletionService {
    config: Config,
    logger: LoggerHandle,
    running: AtomicBool,
    plan_slot: Mutex<Option<ScanPlan>>,
    cancel_slot: Mutex<Option<CancelToken>>,
    live_counters: Mutex<Option<Arc<EngineCounters>>>,
}

/// Clears the running flag and per-run handles when the run scope exits,
/// no matter how.
struct RunGuard<'a> {
    service: &'a DeletionService,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.service.cancel_slot.lock() = None;
        *self.service.live_counters.lock() = None;
        self.service.running.store(false, Ordering::SeqCst);
    }
}

impl DeletionService {
    #[must_use]
    pub fn new(config: Config, logger: LoggerHandle) -> Self {
        Self {
            config,
            logger,
            running: AtomicBool::new(false),
            plan_slot: Mutex::new(None),
            cancel_slot: Mutex::new(None),
            live_counters: Mutex::new(None),
        }
    }

    /// `ValidatePath`: safety classification without side effects.
    #[must_use]
    pub fn validate_path(&self, path: &Path) -> ValidationDto {
        let verdict = safety::classify(path);
        let canonical = resolve_absolute_path(path);
        match verdict {
            safety::SafetyVerdict::Safe => ValidationDto {
                path: path.display().to_string(),
                canonical: canonical.display().to_string(),
                safe: true,
                reason: None,
            },
            safety::SafetyVerdict::Unsafe { reason } => ValidationDto {
                path: path.display().to_string(),
                canonical: canonical.display().to_string(),
                safe: false,
                reason: Some(reason),
            },
        }
    }

    /// `ScanDirectory`: produce and stash the single-use plan.
    ///
    /// A re-scan replaces any plan that was not yet consumed.
    pub fn scan_directory(&self, path: &Path, keep_days: Option<u64>) -> Result<ScanSummaryDto> {
        if let safety::SafetyVerdict::Unsafe { reason } = safety::classify(path) {
            return Err(FpError::UnsafeTarget {
                path: path.to_path_buf(),
                reason,
            });
        }

        let options = ScanOptions {
            keep_days,
            parallelism: self.config.engine.workers,
            queue_capacity: self.config.engine.buffer_size,
        };
        let plan = scan(path, &options, &self.logger)?;
        let summary = ScanSummaryDto {
            root: plan.root.display().to_string(),
            scanned_files: plan.totals.scanned_files,
            scanned_dirs: plan.totals.scanned_dirs,
            to_delete: plan.totals.to_delete,
            retained: plan.totals.retained,
            total_bytes: plan.totals.bytes,
            duration_ms: u64::try_from(plan.duration.as_millis()).unwrap_or(u64::MAX),
            includes_root: plan.includes_root,
        };
        *self.plan_slot.lock() = Some(plan);
        Ok(summary)
    }

    /// `StartDeletion`: consume the stashed plan and run the engine.
    ///
    /// Fails immediately when a run is already active, when no plan is
    /// stashed, or when the canonical target does not equal the canonical
    /// scanned root.
    pub fn start_deletion(
        &self,
        target: &Path,
        dry_run: bool,
        on_event: &mut dyn FnMut(ServiceEvent),
    ) -> Result<RunResultDto> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FpError::Internal {
                details: "a deletion is already in progress".to_string(),
            });
        }
        let _guard = RunGuard { service: self };

        // Single-use: the plan leaves the slot even if the checks below fail.
        let plan = self.plan_slot.lock().take().ok_or_else(|| FpError::Internal {
            details: "no scan result available; scan before deleting".to_string(),
        })?;

        let canonical_target = resolve_absolute_path(target);
        if canonical_target != plan.root {
            let err = FpError::ScanFailed {
                path: canonical_target.clone(),
                details: format!(
                    "target does not match scanned path {} (re-scan required)",
                    plan.root.display()
                ),
            };
            on_event(ServiceEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            });
            return Err(err);
        }

        let method: DeletionMethod = self.config.backend.method.parse()?;
        let backend = Backend::new(method, self.config.backend.fallback_to_delete_api);
        let engine = Engine::new(backend, self.logger.clone());

        let cancel = CancelToken::new();
        *self.cancel_slot.lock() = Some(cancel.clone());
        let counters = engine.counters();
        *self.live_counters.lock() = Some(Arc::clone(&counters));

        let mut monitor = self.config.monitor.enabled.then(|| {
            ResourceMonitor::start(
                Duration::from_millis(self.config.monitor.interval_ms),
                MonitorSources {
                    counters,
                    memory_budget: crate::core::config::resolve_memory_budget(),
                },
                cancel.clone(),
            )
        });

        let options = EngineOptions {
            dry_run,
            workers: self.config.engine.workers,
            buffer_size: self.config.engine.buffer_size,
        };

        let run = engine.run(plan, &options, &cancel, &mut |files_done| {
            on_event(ServiceEvent::Progress { files_done });
        });

        let mut result = match run {
            Ok(result) => result,
            Err(err) => {
                on_event(ServiceEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        if let Some(monitor) = monitor.as_mut() {
            monitor.stop();
            result.bottleneck_report = Some(monitor.report());
        }

        let dto = RunResultDto::from_result(&result);
        on_event(ServiceEvent::Complete(dto.clone()));
        Ok(dto)
    }

    /// `CancelDeletion`: request cooperative cancellation of the active run.
    ///
    /// Returns whether a run was there to cancel.
    pub fn cancel_deletion(&self) -> bool {
        match self.cancel_slot.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// `GetLiveMetrics`: counters of the active run, or zeros.
    #[must_use]
    pub fn live_metrics(&self) -> LiveMetricsDto {
        let running = self.running.load(Ordering::SeqCst);
        match self.live_counters.lock().as_ref() {
            Some(counters) => LiveMetricsDto {
                running,
                files_done: counters.processed(),
                deleted: counters.deleted(),
                bytes_deleted: counters.bytes_deleted(),
                rate: counters.current_rate(),
            },
            None => LiveMetricsDto {
                running,
                ..LiveMetricsDto::default()
            },
        }
    }
}
