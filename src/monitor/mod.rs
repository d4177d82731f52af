//! Resource monitor: sidecar sampler and post-run bottleneck report.
//!
//! A dedicated thread ticks at a fixed interval, probing process memory,
//! allocator churn, CPU, the engine's live counters, and (Windows) kernel
//! I/O counters. It never mutates engine state. The sample series is owned
//! by the monitor, append-only while live, and frozen before the report is
//! generated; readers always get snapshot copies.

#![allow(missing_docs)]

pub mod alloc;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use parking_lot::Mutex;

use crate::core::cancel::CancelToken;
use crate::engine::EngineCounters;
use crate::platform::probes;

// ──────────────────── thresholds ────────────────────

/// `alloc > sys × 0.95` flags memory pressure.
pub const MEMORY_PRESSURE_RATIO: f64 = 0.95;
/// Allocator cycles per second above this flag churn pressure.
pub const ALLOC_PRESSURE_CYCLES_PER_SEC: f64 = 2.0;
/// Estimated CPU percent above this flags saturation.
pub const CPU_SATURATION_PCT: f64 = 90.0;
/// Read+write ops/second above this flags I/O saturation (Windows).
pub const IO_SATURATION_OPS_PER_SEC: f64 = 10_000.0;

/// Sample fraction that makes memory pressure the primary bottleneck.
const MEMORY_BOTTLENECK_FRACTION: f64 = 0.50;
/// Sample fraction that makes allocator churn the primary bottleneck.
const ALLOC_BOTTLENECK_FRACTION: f64 = 0.30;
/// Sample fraction that makes CPU the primary bottleneck.
const CPU_BOTTLENECK_FRACTION: f64 = 0.70;

// ──────────────────── sample ────────────────────

/// One monitor tick.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Sample {
    /// Seconds since monitoring started.
    pub elapsed_secs: f64,
    /// Process resident set ("allocated").
    pub rss_bytes: u64,
    /// The memory budget the process is expected to stay under
    /// ("system-reserved" bound).
    pub budget_bytes: u64,
    /// Completed allocator cycles since process start.
    pub alloc_cycles: u64,
    /// Allocator cycles per second over the last tick.
    pub alloc_cycles_per_sec: f64,
    /// Worker threads currently alive in the engine.
    pub active_workers: usize,
    pub logical_cpus: usize,
    /// Estimated CPU utilisation percent across all cores.
    pub cpu_percent: f64,
    /// Entries completed so far.
    pub files_done: u64,
    /// Engine's most recent windowed rate, entries/second.
    pub rate: f64,
    pub read_ops_per_sec: f64,
    pub write_ops_per_sec: f64,
    pub memory_pressure: bool,
    pub alloc_pressure: bool,
    pub cpu_saturated: bool,
    pub io_saturated: bool,
}

/// What the sampler observes.
#[derive(Clone)]
pub struct MonitorSources {
    /// Engine counters; the monitor is a pure reader.
    pub counters: Arc<EngineCounters>,
    /// Soft memory budget from the startup knob.
    pub memory_budget: u64,
}

// ──────────────────── monitor ────────────────────

#[derive(Default)]
struct Series {
    samples: Mutex<Vec<Sample>>,
}

/// Sidecar sampler with a frozen-at-stop sample series.
pub struct ResourceMonitor {
    series: Arc<Series>,
    stop_tx: Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ResourceMonitor {
    /// Spawn the sampler thread. It runs until [`ResourceMonitor::stop`] or
    /// until the cancel token fires.
    pub fn start(interval: Duration, sources: MonitorSources, cancel: CancelToken) -> Self {
        let series = Arc::new(Series::default());
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread_series = Arc::clone(&series);
        let handle = std::thread::Builder::new()
            .name("fastpurge-monitor".to_string())
            .spawn(move || {
                let mut ticker = Ticker::new(Instant::now(), &sources);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            if cancel.is_cancelled() {
                                return;
                            }
                            let sample = ticker.sample(Instant::now(), &sources);
                            thread_series.samples.lock().push(sample);
                        }
                        Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                    }
                }
            })
            .ok();

        Self {
            series,
            stop_tx,
            handle,
        }
    }

    /// Consistent copy of all samples so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Sample> {
        self.series.samples.lock().clone()
    }

    /// Stop sampling and freeze the series.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Human-readable bottleneck analysis over the frozen series.
    #[must_use]
    pub fn report(&self) -> String {
        build_report(&self.snapshot())
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ──────────────────── sampling ────────────────────

struct Ticker {
    started: Instant,
    last_tick: Instant,
    last_alloc_cycles: u64,
    last_cpu_time: Option<Duration>,
    last_io_ops: Option<(u64, u64)>,
}

impl Ticker {
    fn new(now: Instant, _sources: &MonitorSources) -> Self {
        Self {
            started: now,
            last_tick: now,
            last_alloc_cycles: alloc::alloc_cycles(),
            last_cpu_time: probes::process_cpu_time(),
            last_io_ops: probes::process_io_ops(),
        }
    }

    fn sample(&mut self, now: Instant, sources: &MonitorSources) -> Sample {
        let tick_secs = now.duration_since(self.last_tick).as_secs_f64().max(1e-6);
        let logical_cpus = probes::logical_cpus();
        let active_workers = sources.counters.active_workers();

        let rss_bytes = probes::process_rss_bytes().unwrap_or(0);
        let budget_bytes = sources.memory_budget;

        let cycles = alloc::alloc_cycles();
        #[allow(clippy::cast_precision_loss)]
        let cycles_per_sec = (cycles - self.last_alloc_cycles) as f64 / tick_secs;
        self.last_alloc_cycles = cycles;

        let cpu_percent = self.cpu_percent(now, tick_secs, logical_cpus, active_workers);

        let (read_ops_per_sec, write_ops_per_sec) = self.io_rates(tick_secs);

        #[allow(clippy::cast_precision_loss)]
        let memory_pressure = rss_bytes as f64 > budget_bytes as f64 * MEMORY_PRESSURE_RATIO;

        let sample = Sample {
            elapsed_secs: now.duration_since(self.started).as_secs_f64(),
            rss_bytes,
            budget_bytes,
            alloc_cycles: cycles,
            alloc_cycles_per_sec: cycles_per_sec,
            active_workers,
            logical_cpus,
            cpu_percent,
            files_done: sources.counters.processed(),
            rate: sources.counters.current_rate(),
            read_ops_per_sec,
            write_ops_per_sec,
            memory_pressure,
            alloc_pressure: cycles_per_sec > ALLOC_PRESSURE_CYCLES_PER_SEC,
            cpu_saturated: cpu_percent > CPU_SATURATION_PCT,
            io_saturated: cfg!(windows)
                && read_ops_per_sec + write_ops_per_sec > IO_SATURATION_OPS_PER_SEC,
        };

        self.last_tick = now;
        sample
    }

    /// CPU-time delta when the platform reports it, otherwise the cheap
    /// active-workers heuristic.
    #[allow(clippy::cast_precision_loss)]
    fn cpu_percent(
        &mut self,
        _now: Instant,
        tick_secs: f64,
        logical_cpus: usize,
        active_workers: usize,
    ) -> f64 {
        if let (Some(previous), Some(current)) = (self.last_cpu_time, probes::process_cpu_time()) {
            self.last_cpu_time = Some(current);
            let used = current.saturating_sub(previous).as_secs_f64();
            return (used / tick_secs / logical_cpus as f64 * 100.0).min(100.0);
        }
        (active_workers.min(logical_cpus) as f64 / logical_cpus as f64) * 100.0
    }

    #[allow(clippy::cast_precision_loss)]
    fn io_rates(&mut self, tick_secs: f64) -> (f64, f64) {
        let Some((reads, writes)) = probes::process_io_ops() else {
            return (0.0, 0.0);
        };
        let (last_reads, last_writes) = self.last_io_ops.unwrap_or((reads, writes));
        self.last_io_ops = Some((reads, writes));
        let read_rate = reads.saturating_sub(last_reads) as f64 / tick_secs;
        let write_rate = writes.saturating_sub(last_writes) as f64 / tick_secs;
        (read_rate, write_rate)
    }
}

// ──────────────────── report ────────────────────

/// Fractions of samples where each pressure flag was raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct PressureSummary {
    pub memory: f64,
    pub alloc: f64,
    pub cpu: f64,
    pub io: f64,
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(samples: &[Sample]) -> PressureSummary {
    if samples.is_empty() {
        return PressureSummary::default();
    }
    let n = samples.len() as f64;
    let count = |f: fn(&Sample) -> bool| samples.iter().filter(|s| f(s)).count() as f64 / n;
    PressureSummary {
        memory: count(|s| s.memory_pressure),
        alloc: count(|s| s.alloc_pressure),
        cpu: count(|s| s.cpu_saturated),
        io: count(|s| s.io_saturated),
    }
}

/// First matching rule names the primary bottleneck.
#[must_use]
pub fn build_report(samples: &[Sample]) -> String {
    if samples.is_empty() {
        return "resource monitor collected no samples (run too short to analyse)".to_string();
    }

    let summary = summarize(samples);
    let last = samples.last().expect("non-empty checked above");

    let (bottleneck, recommendation) = if summary.memory > MEMORY_BOTTLENECK_FRACTION {
        (
            "memory pressure",
            "reduce the worker count or the channel buffer size",
        )
    } else if summary.alloc > ALLOC_BOTTLENECK_FRACTION {
        (
            "allocator churn",
            "reduce per-entry allocations",
        )
    } else if summary.cpu > CPU_BOTTLENECK_FRACTION {
        ("cpu saturation", "raise the worker count")
    } else {
        (
            "disk I/O (likely)",
            "the run appears I/O bound; consider faster storage",
        )
    };

    let mut out = String::new();
    out.push_str("Bottleneck analysis\n");
    out.push_str(&format!(
        "  samples: {} over {:.1}s\n",
        samples.len(),
        last.elapsed_secs
    ));
    out.push_str(&format!(
        "  pressure fractions: memory {:.0}%, allocator {:.0}%, cpu {:.0}%, io {:.0}%\n",
        summary.memory * 100.0,
        summary.alloc * 100.0,
        summary.cpu * 100.0,
        summary.io * 100.0
    ));
    out.push_str(&format!(
        "  last tick: rss {} / budget {}, cpu {:.0}%, rate {:.0} entries/s\n",
        format_bytes(last.rss_bytes),
        format_bytes(last.budget_bytes),
        last.cpu_percent,
        last.rate
    ));
    out.push_str(&format!("  primary bottleneck: {bottleneck}\n"));
    out.push_str(&format!("  recommendation: {recommendation}\n"));
    out
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_sample(elapsed: f64) -> Sample {
        Sample {
            elapsed_secs: elapsed,
            rss_bytes: 100 << 20,
            budget_bytes: 1 << 30,
            alloc_cycles: 0,
            alloc_cycles_per_sec: 0.0,
            active_workers: 4,
            logical_cpus: 8,
            cpu_percent: 25.0,
            files_done: 1000,
            rate: 5000.0,
            read_ops_per_sec: 100.0,
            write_ops_per_sec: 100.0,
            memory_pressure: false,
            alloc_pressure: false,
            cpu_saturated: false,
            io_saturated: false,
        }
    }

    #[test]
    fn empty_series_reports_no_samples() {
        let report = build_report(&[]);
        assert!(report.contains("no samples"));
    }

    #[test]
    fn quiet_run_is_classified_io_bound() {
        let samples: Vec<Sample> = (0..10).map(|i| quiet_sample(f64::from(i))).collect();
        let report = build_report(&samples);
        assert!(report.contains("I/O"), "report was: {report}");
        assert!(report.contains("faster storage"));
    }

    #[test]
    fn memory_fraction_wins_over_cpu() {
        let samples: Vec<Sample> = (0..10)
            .map(|i| {
                let mut s = quiet_sample(f64::from(i));
                s.memory_pressure = i < 6; // 60% > 50% threshold
                s.cpu_saturated = true; // 100% > 70% threshold, but memory is first
                s
            })
            .collect();
        let report = build_report(&samples);
        assert!(report.contains("memory pressure"), "report was: {report}");
        assert!(report.contains("reduce the worker count"));
    }

    #[test]
    fn alloc_churn_recommendation() {
        let samples: Vec<Sample> = (0..10)
            .map(|i| {
                let mut s = quiet_sample(f64::from(i));
                s.alloc_pressure = i < 4; // 40% > 30% threshold
                s
            })
            .collect();
        let report = build_report(&samples);
        assert!(report.contains("allocator churn"), "report was: {report}");
        assert!(report.contains("per-entry allocations"));
    }

    #[test]
    fn cpu_recommendation() {
        let samples: Vec<Sample> = (0..10)
            .map(|i| {
                let mut s = quiet_sample(f64::from(i));
                s.cpu_saturated = i < 8; // 80% > 70% threshold
                s
            })
            .collect();
        let report = build_report(&samples);
        assert!(report.contains("cpu saturation"), "report was: {report}");
        assert!(report.contains("raise the worker count"));
    }

    #[test]
    fn summarize_counts_fractions() {
        let samples: Vec<Sample> = (0..4)
            .map(|i| {
                let mut s = quiet_sample(f64::from(i));
                s.io_saturated = i == 0;
                s
            })
            .collect();
        let summary = summarize(&samples);
        assert!((summary.io - 0.25).abs() < f64::EPSILON);
        assert!(summary.memory.abs() < f64::EPSILON);
    }

    #[test]
    fn monitor_collects_and_freezes_samples() {
        let counters = Arc::new(EngineCounters::default());
        let sources = MonitorSources {
            counters,
            memory_budget: 1 << 30,
        };
        let mut monitor = ResourceMonitor::start(
            Duration::from_millis(10),
            sources,
            CancelToken::new(),
        );
        std::thread::sleep(Duration::from_millis(80));
        monitor.stop();

        let frozen = monitor.snapshot();
        assert!(!frozen.is_empty(), "sampler should have ticked");
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            frozen.len(),
            monitor.snapshot().len(),
            "series must be frozen after stop"
        );

        let report = monitor.report();
        assert!(report.contains("primary bottleneck"));
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
