//! Shared test infrastructure for fastpurge.
//!
//! Provides:
//! - `CmdResult` + `run_cli_case()` — integration test CLI runner
//! - `TestTree` — directory tree builder with controlled file ages

// Not every test binary uses every item; suppress dead-code warnings for the shared module.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ──────────────────── CLI test runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fastpurge") {
        let p = PathBuf::from(path);
        if p.exists() {
            return p;
        }
    }

    let exe_name = if cfg!(windows) {
        "fastpurge.exe"
    } else {
        "fastpurge"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!(
            "unable to resolve fastpurge binary path for integration test (checked CARGO_BIN_EXE_fastpurge and debug sibling path)"
        ),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("fastpurge-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env_remove("FASTPURGE_CONFIG")
        .output()
        .expect("execute fastpurge command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── TestTree ────────────────────

/// Builder for directory trees with controlled file ages and sizes.
pub struct TestTree {
    root: tempfile::TempDir,
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create test tempdir"),
        }
    }

    /// Root of the scratch area. Build deletion targets underneath it so a
    /// successful run never removes the tempdir itself.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Create a subdirectory (and parents).
    pub fn create_dir(&self, rel_path: &str) -> PathBuf {
        let path = self.root.path().join(rel_path);
        fs::create_dir_all(&path).expect("create test dir");
        path
    }

    /// Create a file with the given content and age.
    pub fn create_file(&self, rel_path: &str, content: &[u8], age: Duration) -> PathBuf {
        let path = self.root.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write test file");

        if age > Duration::ZERO {
            let mtime = SystemTime::now() - age;
            filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(mtime))
                .expect("set test file mtime");
        }

        path
    }

    /// Create a flat directory of `count` small files.
    pub fn create_flat(&self, rel_dir: &str, count: usize) -> PathBuf {
        let dir = self.create_dir(rel_dir);
        for i in 0..count {
            fs::write(dir.join(format!("file_{i:05}.dat")), b"x").expect("write flat file");
        }
        dir
    }
}

/// Days as a `Duration`.
pub fn days(n: u64) -> Duration {
    Duration::from_secs(n * 24 * 60 * 60)
}
