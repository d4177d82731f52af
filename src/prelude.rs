//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use fastpurge::prelude::*;
//! ```

// Core
pub use crate::core::cancel::CancelToken;
pub use crate::core::config::Config;
pub use crate::core::errors::{EntryErrorKind, FpError, Result};

// Safety
pub use crate::safety::{SafetyVerdict, classify, confirm};

// Scanner
pub use crate::scanner::plan::{Entry, ScanPlan, ScanTotals};
pub use crate::scanner::{ScanOptions, scan};

// Backend
pub use crate::backend::{Backend, DeletionMethod, DeletionOutcome, MethodStatsSnapshot};

// Engine
pub use crate::engine::{Engine, EngineOptions, EntryFailure, RunResult};

// Monitor
pub use crate::monitor::{MonitorSources, ResourceMonitor, Sample};

// Service
pub use crate::service::{DeletionService, ServiceEvent};

// Logging
pub use crate::logger::{Level, LoggerConfig, LoggerHandle, spawn_logger};
