//! Micro-benchmark of the concrete deletion primitives.
//!
//! Builds a scratch tree of small files per method, times the deletions,
//! and reports files/second. The CLI restricts this to Windows, where more
//! than one primitive exists to compare.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::backend::method::DeletionMethod;
use crate::backend::{Backend, DeletionOutcome};
use crate::core::errors::{FpError, Result};
use crate::platform::native::NativePath;

/// Timing for one primitive.
#[derive(Debug, Clone)]
pub struct BenchResult {
    pub method: DeletionMethod,
    pub files: u64,
    pub failures: u64,
    pub elapsed: Duration,
}

impl BenchResult {
    /// Deletions per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            0.0
        } else {
            (self.files - self.failures) as f64 / secs
        }
    }
}

/// Time every concrete primitive over `files_per_method` scratch files.
pub fn run(files_per_method: u64) -> Result<Vec<BenchResult>> {
    let mut results = Vec::new();
    for &method in DeletionMethod::benchmarkable() {
        results.push(bench_method(method, files_per_method)?);
    }
    Ok(results)
}

fn bench_method(method: DeletionMethod, count: u64) -> Result<BenchResult> {
    let root = scratch_dir()?;
    let mut natives = Vec::with_capacity(usize::try_from(count).unwrap_or(usize::MAX));
    let mut rng = rand::rng();

    for i in 0..count {
        let payload: u64 = rng.random();
        let path = root.join(format!("bench-{i}-{payload:016x}.dat"));
        fs::write(&path, payload.to_le_bytes()).map_err(|e| FpError::io(&path, e))?;
        natives.push(NativePath::from_path(&path)?);
    }

    // Forced method without fallback: the benchmark measures the primitive
    // itself, not the cascade.
    let backend = Backend::new(method, false);
    let started = Instant::now();
    let mut failures = 0u64;
    for native in &natives {
        if let DeletionOutcome::Failed { .. } = backend.delete_entry(native, false) {
            failures += 1;
        }
    }
    let elapsed = started.elapsed();

    let _ = fs::remove_dir_all(&root);

    Ok(BenchResult {
        method,
        files: count,
        failures,
        elapsed,
    })
}

fn scratch_dir() -> Result<PathBuf> {
    let mut rng = rand::rng();
    let tag: u64 = rng.random();
    let dir = std::env::temp_dir().join(format!("fastpurge-bench-{tag:016x}"));
    fs::create_dir_all(&dir).map_err(|e| FpError::io(&dir, e))?;
    Ok(crate::core::paths::resolve_absolute_path(&dir))
}
