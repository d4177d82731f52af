//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! Precedence is CLI flags > `FASTPURGE_*` environment variables > config
//! file > built-in defaults. The CLI layer performs the merge; this module
//! owns the file/env layers and shared validation.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FpError, Result};

/// Upper bound for `--workers`.
pub const MAX_WORKERS: usize = 1000;
/// Upper bound for `--buffer-size`.
pub const MAX_BUFFER_SIZE: usize = 100_000;

/// Full fastpurge configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub backend: BackendConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

/// Worker pool and channel sizing. Zero means "pick automatically".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub workers: usize,
    pub buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            buffer_size: 0,
        }
    }
}

/// Deletion primitive selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// One of `auto`, `fileinfo`, `deleteonclose`, `ntapi`, `deleteapi`.
    pub method: String,
    /// When a specific method is forced and fails, fall through to the
    /// guaranteed-portable primitive.
    pub fallback_to_delete_api: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            method: "auto".to_string(),
            fallback_to_delete_api: true,
        }
    }
}

/// Resource monitor sampling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 500,
        }
    }
}

/// Log level and optional file sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, or `debug`. Empty means `info`.
    pub level: String,
    pub file: Option<std::path::PathBuf>,
}

impl Config {
    /// Load configuration from an explicit path, or from
    /// `$FASTPURGE_CONFIG` when set. Missing file with no explicit path is
    /// not an error; an explicit path that does not exist is.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match env::var_os("FASTPURGE_CONFIG") {
                Some(path) => Self::from_file(Path::new(&path))?,
                None => Self::default(),
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| FpError::io(path, e))?;
        Ok(toml::from_str(&raw)?)
    }

    /// Overlay `FASTPURGE_*` environment variables.
    fn apply_env(&mut self) {
        if let Some(workers) = env_usize("FASTPURGE_WORKERS") {
            self.engine.workers = workers;
        }
        if let Some(buffer) = env_usize("FASTPURGE_BUFFER_SIZE") {
            self.engine.buffer_size = buffer;
        }
        if let Ok(method) = env::var("FASTPURGE_METHOD") {
            self.backend.method = method;
        }
        if let Ok(level) = env::var("FASTPURGE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Shared bounds checks, mirrored by CLI validation.
    pub fn validate(&self) -> Result<()> {
        if self.engine.workers > MAX_WORKERS {
            return Err(FpError::InvalidArgument {
                details: format!(
                    "workers must be between 0 and {MAX_WORKERS}, got {}",
                    self.engine.workers
                ),
            });
        }
        if self.engine.buffer_size > MAX_BUFFER_SIZE {
            return Err(FpError::InvalidArgument {
                details: format!(
                    "buffer size must be between 0 and {MAX_BUFFER_SIZE}, got {}",
                    self.engine.buffer_size
                ),
            });
        }
        if self.monitor.interval_ms == 0 {
            return Err(FpError::InvalidArgument {
                details: "monitor interval must be at least 1 ms".to_string(),
            });
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok()?.trim().parse().ok()
}

// ──────────────────── memory budget ────────────────────

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Soft memory budget: `min(6 GiB, max(512 MiB, 25% of RAM))`.
#[must_use]
pub fn memory_budget_for(total_ram_bytes: u64) -> u64 {
    (total_ram_bytes / 4).clamp(512 * MIB, 6 * GIB)
}

/// Resolve the effective memory budget: `FASTPURGE_MEMORY_LIMIT` (bytes)
/// when set externally, otherwise derived from installed RAM. Falls back to
/// the floor when the platform probe is unavailable.
#[must_use]
pub fn resolve_memory_budget() -> u64 {
    if let Some(explicit) = env::var("FASTPURGE_MEMORY_LIMIT")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return explicit;
    }
    crate::platform::probes::total_system_memory().map_or(512 * MIB, memory_budget_for)
}
