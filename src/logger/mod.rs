//! Structured logging: level-filtered stderr sink plus optional append-mode file sink.
//!
//! Architecture: a dedicated logger thread owns the sinks. All other threads
//! send records via a bounded crossbeam channel using non-blocking
//! `try_send()`, so scanner and engine workers are never stalled by logging
//! back-pressure. Records dropped under pressure are counted.
//!
//! The handle is an injectable capability passed through the core rather
//! than a process global, which keeps tests deterministic.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{FpError, Result};

/// Default bounded channel capacity for log records.
const CHANNEL_CAPACITY: usize = 1024;

/// Log severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Failures the user must see.
    Error,
    /// Recoverable trouble (per-directory scan errors, fallbacks).
    Warn,
    /// Run lifecycle messages.
    Info,
    /// Per-entry tracing; enabled by `--verbose`.
    Debug,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Parse a config-file level string; unknown values fall back to `Info`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "debug" | "trace" => Self::Debug,
            _ => Self::Info,
        }
    }
}

#[derive(Debug)]
struct LogRecord {
    level: Level,
    scope: &'static str,
    message: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

enum LogEvent {
    Record(LogRecord),
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Options for building the logger.
pub struct LoggerConfig {
    /// Maximum level that is emitted.
    pub level: Level,
    /// Optional file sink; opened in append mode.
    pub file: Option<PathBuf>,
    /// Whether records are mirrored to stderr.
    pub stderr: bool,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            file: None,
            stderr: true,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Thread-safe, cheaply-cloneable handle for sending log records.
#[derive(Clone)]
pub struct LoggerHandle {
    tx: Sender<LogEvent>,
    level: Level,
    dropped_records: Arc<AtomicU64>,
}

impl LoggerHandle {
    /// Whether records at `level` pass the filter. Callers can skip building
    /// expensive messages when this is false.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    /// Emit one record. Non-blocking: if the channel is full the record is
    /// dropped and counted.
    pub fn log(&self, level: Level, scope: &'static str, message: impl Into<String>) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord {
            level,
            scope,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(TrySendError::Full(_)) = self.tx.try_send(LogEvent::Record(record)) {
            self.dropped_records.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    pub fn error(&self, scope: &'static str, message: impl Into<String>) {
        self.log(Level::Error, scope, message);
    }

    pub fn warn(&self, scope: &'static str, message: impl Into<String>) {
        self.log(Level::Warn, scope, message);
    }

    pub fn info(&self, scope: &'static str, message: impl Into<String>) {
        self.log(Level::Info, scope, message);
    }

    pub fn debug(&self, scope: &'static str, message: impl Into<String>) {
        self.log(Level::Debug, scope, message);
    }

    /// Number of records dropped due to channel back-pressure.
    #[must_use]
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown; pending records are flushed first.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LogEvent::Shutdown);
    }

    /// A handle whose records go nowhere. For tests and benchmarks.
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, rx) = bounded(1);
        drop(rx);
        Self {
            tx,
            level: Level::Error,
            dropped_records: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The handle is `Clone + Send` and shared across scanner, engine, and
/// monitor threads. The thread runs until `handle.shutdown()` or until all
/// senders are dropped.
pub fn spawn_logger(config: LoggerConfig) -> Result<(LoggerHandle, thread::JoinHandle<()>)> {
    let file_sink = match &config.file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| FpError::io(path, e))?,
        ),
        None => None,
    };

    let (tx, rx) = bounded::<LogEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_in_thread = Arc::clone(&dropped);

    let handle = LoggerHandle {
        tx,
        level: config.level,
        dropped_records: dropped,
    };

    let stderr_enabled = config.stderr;
    let join = thread::Builder::new()
        .name("fastpurge-logger".to_string())
        .spawn(move || {
            logger_thread_main(&rx, file_sink, stderr_enabled, &dropped_in_thread);
        })
        .map_err(|e| FpError::Internal {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(
    rx: &Receiver<LogEvent>,
    mut file_sink: Option<std::fs::File>,
    stderr_enabled: bool,
    dropped: &AtomicU64,
) {
    while let Ok(event) = rx.recv() {
        match event {
            LogEvent::Record(record) => {
                let line = format!(
                    "{} {:5} [{}] {}",
                    record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    record.level.label(),
                    record.scope,
                    record.message
                );
                if stderr_enabled {
                    let _ = writeln!(std::io::stderr(), "{line}");
                }
                if let Some(file) = file_sink.as_mut() {
                    let _ = writeln!(file, "{line}");
                }
            }
            LogEvent::Shutdown => break,
        }
    }

    let dropped_total = dropped.load(Ordering::Relaxed);
    if dropped_total > 0 {
        let note = format!("logger dropped {dropped_total} records under back-pressure");
        if stderr_enabled {
            let _ = writeln!(std::io::stderr(), "{note}");
        }
        if let Some(file) = file_sink.as_mut() {
            let _ = writeln!(file, "{note}");
        }
    }
    if let Some(file) = file_sink.as_mut() {
        let _ = file.flush();
    }
}
