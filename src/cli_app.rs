//! Top-level CLI definition and dispatch.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use thiserror::Error;

use crate::backend::{Backend, DeletionMethod, bench};
use crate::core::cancel::{CancelToken, install_interrupt_handler};
use crate::core::config::{Config, MAX_BUFFER_SIZE, MAX_WORKERS, resolve_memory_budget};
use crate::core::errors::FpError;
use crate::engine::{Engine, EngineOptions, RunResult};
use crate::logger::{Level, LoggerConfig, LoggerHandle, spawn_logger};
use crate::monitor::{MonitorSources, ResourceMonitor};
use crate::safety::{self, SafetyVerdict};
use crate::scanner::plan::ScanPlan;
use crate::scanner::{ScanOptions, scan};

/// Files created per method by `--benchmark`.
const BENCHMARK_FILES: u64 = 2_000;
/// Progress line refresh floor.
const PROGRESS_REFRESH: Duration = Duration::from_millis(100);

/// fastpurge — delete huge directory trees fast.
#[derive(Debug, Parser)]
#[command(
    name = "fastpurge",
    version,
    about = "Rapidly delete directory trees with millions of small files",
    long_about = "fastpurge scans a tree bottom-up in parallel, pre-converts every path \
into the form the deletion syscalls consume, and drains the plan with a bounded worker \
pool using the cheapest per-file deletion primitive the host OS offers.",
    after_help = "EXAMPLES:\n  \
  fastpurge -t ./node_modules             Delete a tree (asks for confirmation)\n  \
  fastpurge -t ./build --dry-run          Preview without deleting\n  \
  fastpurge -t ./cache --keep-days 7      Delete only files older than a week\n  \
  fastpurge -t ./target --force --workers 16\n  \
  fastpurge --benchmark                   Compare deletion primitives (Windows)",
    arg_required_else_help = true
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Directory tree to delete.
    #[arg(
        short = 't',
        long = "target-directory",
        visible_alias = "td",
        value_name = "PATH"
    )]
    pub target_directory: Option<PathBuf>,
    /// Skip the confirmation prompt.
    #[arg(long)]
    pub force: bool,
    /// Scan and simulate; delete nothing.
    #[arg(long)]
    pub dry_run: bool,
    /// Raise the log level to debug.
    #[arg(long)]
    pub verbose: bool,
    /// Duplicate logs to a file (append mode).
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
    /// Retain files newer than N days; -1 disables the age filter.
    #[arg(long, default_value_t = -1, value_name = "N", allow_negative_numbers = true)]
    pub keep_days: i64,
    /// Worker threads; 0 picks automatically.
    #[arg(long, default_value_t = 0, value_name = "N", allow_negative_numbers = true)]
    pub workers: i64,
    /// Channel capacity between producer and workers; 0 picks automatically.
    #[arg(long, default_value_t = 0, value_name = "N", allow_negative_numbers = true)]
    pub buffer_size: i64,
    /// Deletion primitive: auto, fileinfo, deleteonclose, ntapi, deleteapi.
    #[arg(long, default_value = "auto", value_name = "NAME")]
    pub deletion_method: String,
    /// Micro-benchmark all deletion methods (Windows only).
    #[arg(long)]
    pub benchmark: bool,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// CLI error with the process exit-code contract: 1 for a run that
/// completed with per-entry failures (or was cancelled), 2 for fatal
/// refusals and argument errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument error, safety rejection, scan error, or spawn failure.
    #[error("{0}")]
    Fatal(String),
    /// Run completed but at least one entry failed (or was cancelled).
    #[error("{0}")]
    Partial(String),
}

impl CliError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal(_) => 2,
            Self::Partial(_) => 1,
        }
    }
}

impl From<FpError> for CliError {
    fn from(err: FpError) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Checked and merged run parameters.
#[derive(Debug, Clone)]
struct ResolvedArgs {
    keep_days: Option<u64>,
    workers: usize,
    buffer_size: usize,
    method: DeletionMethod,
    fallback_to_delete_api: bool,
}

/// Bounds-check the CLI surface and merge it over the config layers.
fn resolve_args(cli: &Cli, config: &Config) -> Result<ResolvedArgs, CliError> {
    if cli.workers < 0 || cli.workers > MAX_WORKERS as i64 {
        return Err(CliError::Fatal(format!(
            "--workers must be between 0 and {MAX_WORKERS}, got {}",
            cli.workers
        )));
    }
    if cli.buffer_size < 0 || cli.buffer_size > MAX_BUFFER_SIZE as i64 {
        return Err(CliError::Fatal(format!(
            "--buffer-size must be between 0 and {MAX_BUFFER_SIZE}, got {}",
            cli.buffer_size
        )));
    }
    if cli.keep_days < -1 {
        return Err(CliError::Fatal(format!(
            "--keep-days must be -1 or greater, got {}",
            cli.keep_days
        )));
    }

    if cli.benchmark {
        if cli.dry_run {
            return Err(CliError::Fatal(
                "--benchmark cannot be combined with --dry-run".to_string(),
            ));
        }
        if cli.keep_days >= 0 {
            return Err(CliError::Fatal(
                "--benchmark cannot be combined with --keep-days".to_string(),
            ));
        }
        if !cfg!(windows) {
            return Err(CliError::Fatal(
                "--benchmark is only meaningful on Windows, where multiple deletion \
                 primitives exist"
                    .to_string(),
            ));
        }
    } else if cli.target_directory.is_none() {
        return Err(CliError::Fatal(
            "--target-directory is required (see --help)".to_string(),
        ));
    }

    // CLI wins over config; zero/auto defers to the config layer.
    let workers = if cli.workers > 0 {
        usize::try_from(cli.workers).unwrap_or(0)
    } else {
        config.engine.workers
    };
    let buffer_size = if cli.buffer_size > 0 {
        usize::try_from(cli.buffer_size).unwrap_or(0)
    } else {
        config.engine.buffer_size
    };
    let method_raw = if cli.deletion_method == "auto" {
        config.backend.method.clone()
    } else {
        cli.deletion_method.clone()
    };
    let method: DeletionMethod = method_raw.parse().map_err(|e: FpError| {
        CliError::Fatal(e.to_string())
    })?;

    Ok(ResolvedArgs {
        keep_days: u64::try_from(cli.keep_days).ok().filter(|&d| d > 0),
        workers,
        buffer_size,
        method,
        fallback_to_delete_api: config.backend.fallback_to_delete_api,
    })
}

/// Dispatch the parsed CLI.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref()).map_err(|e| CliError::Fatal(e.to_string()))?;
    let args = resolve_args(cli, &config)?;

    let level = if cli.verbose {
        Level::Debug
    } else {
        Level::parse(&config.logging.level)
    };
    let log_file = cli.log_file.clone().or_else(|| config.logging.file.clone());
    let (logger, logger_join) = spawn_logger(LoggerConfig {
        level,
        file: log_file.clone(),
        ..LoggerConfig::default()
    })
    .map_err(|e| CliError::Fatal(e.to_string()))?;

    let outcome = run_inner(cli, &config, &args, &logger, log_file.as_deref());

    logger.shutdown();
    let _ = logger_join.join();
    outcome
}

fn run_inner(
    cli: &Cli,
    config: &Config,
    args: &ResolvedArgs,
    logger: &LoggerHandle,
    log_file: Option<&std::path::Path>,
) -> Result<(), CliError> {
    let memory_budget = resolve_memory_budget();
    logger.info(
        "cli",
        format!("memory budget: {} MiB", memory_budget / (1024 * 1024)),
    );

    if cli.benchmark {
        return run_benchmark(logger);
    }

    let Some(target) = cli.target_directory.as_deref() else {
        return Err(CliError::Fatal(
            "--target-directory is required (see --help)".to_string(),
        ));
    };

    // Safety gate before any scanning work.
    if let SafetyVerdict::Unsafe { reason } = safety::classify(target) {
        let err = FpError::UnsafeTarget {
            path: target.to_path_buf(),
            reason,
        };
        logger.error("cli", err.to_string());
        return Err(CliError::Fatal(err.to_string()));
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel).map_err(|e| CliError::Fatal(e.to_string()))?;

    // Scan.
    let scan_options = ScanOptions {
        keep_days: args.keep_days,
        parallelism: args.workers,
        queue_capacity: args.buffer_size,
    };
    let plan = scan(target, &scan_options, logger).map_err(|e| CliError::Fatal(e.to_string()))?;
    print_scan_summary(&plan);

    // Confirm.
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut prompt_out = io::stderr();
    if !safety::confirm(
        target,
        plan.totals.to_delete,
        cli.dry_run,
        cli.force,
        &mut reader,
        &mut prompt_out,
    ) {
        println!("Aborted.");
        return Ok(());
    }

    // Run.
    let backend = Backend::new(args.method, args.fallback_to_delete_api);
    let engine = Engine::new(backend, logger.clone());

    let mut monitor = config.monitor.enabled.then(|| {
        ResourceMonitor::start(
            Duration::from_millis(config.monitor.interval_ms),
            MonitorSources {
                counters: engine.counters(),
                memory_budget,
            },
            cancel.clone(),
        )
    });

    let total = plan.totals.to_delete;
    let mut progress = ProgressLine::new(total);
    let options = EngineOptions {
        dry_run: cli.dry_run,
        workers: args.workers,
        buffer_size: args.buffer_size,
    };
    let run = engine.run(plan, &options, &cancel, &mut |done| progress.render(done));
    progress.finish();

    let mut result = run.map_err(|e| CliError::Fatal(e.to_string()))?;
    if let Some(monitor) = monitor.as_mut() {
        monitor.stop();
        result.bottleneck_report = Some(monitor.report());
    }

    print_run_summary(&result);
    if let Some(report) = &result.bottleneck_report {
        logger.info("monitor", report.clone());
    }

    if result.cancelled {
        let mut message = format!(
            "cancelled after deleting {} of {} entries",
            result.deleted, total
        );
        if let Some(path) = log_file {
            message.push_str(&format!(" (details in {})", path.display()));
        }
        return Err(CliError::Partial(message));
    }
    if result.failed > 0 {
        let mut message = format!("{} of {total} entries could not be deleted", result.failed);
        if let Some(path) = log_file {
            message.push_str(&format!(" (details in {})", path.display()));
        }
        return Err(CliError::Partial(message));
    }
    Ok(())
}

fn run_benchmark(logger: &LoggerHandle) -> Result<(), CliError> {
    logger.info(
        "bench",
        format!("benchmarking deletion methods over {BENCHMARK_FILES} files each"),
    );
    let results = bench::run(BENCHMARK_FILES).map_err(|e| CliError::Fatal(e.to_string()))?;

    println!("Deletion method benchmark ({BENCHMARK_FILES} files per method):");
    println!("  {:<14} {:>10} {:>10} {:>14}", "Method", "Elapsed", "Failures", "Files/sec");
    println!("  {}", "-".repeat(52));
    for result in &results {
        println!(
            "  {:<14} {:>9.2?} {:>10} {:>14.0}",
            result.method.to_string(),
            result.elapsed,
            result.failures,
            result.rate()
        );
    }
    Ok(())
}

fn print_scan_summary(plan: &ScanPlan) {
    println!(
        "Scanned {} in {:.2?}: {} files, {} directories ({} retained by age filter)",
        plan.root.display(),
        plan.duration,
        plan.totals.scanned_files,
        plan.totals.scanned_dirs,
        plan.totals.retained,
    );
    println!(
        "Plan: {} entries, {}",
        plan.totals.to_delete,
        format_bytes(plan.totals.bytes)
    );
}

fn print_run_summary(result: &RunResult) {
    let headline = if result.dry_run {
        "Dry-run complete".to_string()
    } else if result.cancelled {
        "Cancelled".yellow().to_string()
    } else if result.failed > 0 {
        "Completed with errors".red().to_string()
    } else {
        "Deletion complete".green().to_string()
    };
    println!("\n{headline}");
    println!("  Deleted:   {}", result.deleted);
    if result.failed > 0 {
        println!("  Failed:    {}", result.failed.to_string().red());
    }
    if result.skipped > 0 {
        println!("  Skipped:   {}", result.skipped);
    }
    if result.retained > 0 {
        println!("  Retained:  {}", result.retained);
    }
    println!("  Freed:     {}", format_bytes(result.bytes_deleted));
    println!("  Duration:  {:.2?}", result.duration);
    println!(
        "  Rate:      {:.0} entries/s average, {:.0} peak",
        result.avg_rate, result.peak_rate
    );

    let stats = &result.method_stats;
    if stats.total_successes() > 0 && !result.dry_run {
        println!(
            "  Methods:   fileinfo {}, deleteonclose {}, ntapi {}, deleteapi {} ({} via fallback)",
            stats.file_info, stats.delete_on_close, stats.nt_api, stats.delete_api, stats.fallback
        );
    }

    if !result.errors.is_empty() {
        let shown = result.errors.len().min(10);
        println!("\nFirst {shown} failures:");
        for failure in result.errors.iter().take(shown) {
            println!(
                "  {}: {}: {}",
                failure.path.display(),
                failure.kind,
                failure.message
            );
        }
        if result.errors.len() > shown {
            println!("  ... and {} more", result.errors.len() - shown);
        }
    }
}

/// Terminal line-rewrite progress. Cheap: at most one write per refresh
/// interval, always from the engine's serialized callback.
struct ProgressLine {
    total: u64,
    last_render: Instant,
    enabled: bool,
}

impl ProgressLine {
    fn new(total: u64) -> Self {
        Self {
            total,
            last_render: Instant::now() - PROGRESS_REFRESH,
            enabled: io::IsTerminal::is_terminal(&io::stdout()),
        }
    }

    fn render(&mut self, done: u64) {
        if !self.enabled || self.last_render.elapsed() < PROGRESS_REFRESH {
            return;
        }
        self.last_render = Instant::now();
        let pct = if self.total == 0 {
            100
        } else {
            done * 100 / self.total
        };
        print!("\rDeleting... {pct}% ({done}/{} entries)", self.total);
        let _ = io::stdout().flush();
    }

    fn finish(&mut self) {
        if self.enabled {
            println!();
        }
    }
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

    fn base_cli() -> Cli {
        Cli {
            target_directory: Some(PathBuf::from("/tmp/whatever")),
            force: false,
            dry_run: false,
            verbose: false,
            log_file: None,
            keep_days: -1,
            workers: 0,
            buffer_size: 0,
            deletion_method: "auto".to_string(),
            benchmark: false,
            config: None,
        }
    }

    #[test]
    fn default_arguments_resolve() {
        let args = resolve_args(&base_cli(), &Config::default()).unwrap();
        assert_eq!(args.workers, 0);
        assert_eq!(args.buffer_size, 0);
        assert_eq!(args.method, DeletionMethod::Auto);
        assert!(args.keep_days.is_none());
        assert!(args.fallback_to_delete_api);
    }

    #[test]
    fn negative_workers_rejected() {
        let mut cli = base_cli();
        cli.workers = -1;
        let err = resolve_args(&cli, &Config::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn oversized_workers_rejected() {
        let mut cli = base_cli();
        cli.workers = 1001;
        assert!(resolve_args(&cli, &Config::default()).is_err());
    }

    #[test]
    fn buffer_bounds_enforced() {
        let mut cli = base_cli();
        cli.buffer_size = -5;
        assert!(resolve_args(&cli, &Config::default()).is_err());
        cli.buffer_size = 100_001;
        assert!(resolve_args(&cli, &Config::default()).is_err());
        cli.buffer_size = 100_000;
        assert!(resolve_args(&cli, &Config::default()).is_ok());
    }

    #[test]
    fn keep_days_below_minus_one_rejected() {
        let mut cli = base_cli();
        cli.keep_days = -2;
        assert!(resolve_args(&cli, &Config::default()).is_err());
    }

    #[test]
    fn keep_days_zero_and_minus_one_mean_no_filter() {
        for value in [-1, 0] {
            let mut cli = base_cli();
            cli.keep_days = value;
            let args = resolve_args(&cli, &Config::default()).unwrap();
            assert!(args.keep_days.is_none(), "keep_days={value}");
        }
    }

    #[test]
    fn unknown_method_rejected() {
        let mut cli = base_cli();
        cli.deletion_method = "shred".to_string();
        let err = resolve_args(&cli, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("unknown deletion method"));
    }

    #[test]
    fn benchmark_conflicts_are_rejected() {
        let mut cli = base_cli();
        cli.benchmark = true;
        cli.dry_run = true;
        assert!(resolve_args(&cli, &Config::default()).is_err());

        let mut cli = base_cli();
        cli.benchmark = true;
        cli.keep_days = 5;
        assert!(resolve_args(&cli, &Config::default()).is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn benchmark_rejected_off_windows() {
        let mut cli = base_cli();
        cli.benchmark = true;
        let err = resolve_args(&cli, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("Windows"));
    }

    #[test]
    fn missing_target_rejected_for_normal_runs() {
        let mut cli = base_cli();
        cli.target_directory = None;
        let err = resolve_args(&cli, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("--target-directory"));
    }

    #[test]
    fn config_layer_fills_auto_values() {
        let mut config = Config::default();
        config.engine.workers = 8;
        config.backend.method = "deleteapi".to_string();

        let args = resolve_args(&base_cli(), &config).unwrap();
        assert_eq!(args.workers, 8);
        assert_eq!(args.method, DeletionMethod::DeleteApi);

        // Explicit CLI values win.
        let mut cli = base_cli();
        cli.workers = 2;
        cli.deletion_method = "ntapi".to_string();
        let args = resolve_args(&cli, &config).unwrap();
        assert_eq!(args.workers, 2);
        assert_eq!(args.method, DeletionMethod::NtApi);
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(CliError::Fatal("x".to_string()).exit_code(), 2);
        assert_eq!(CliError::Partial("x".to_string()).exit_code(), 1);
    }

    #[test]
    fn cli_parses_canonical_flags() {
        let cli = Cli::try_parse_from([
            "fastpurge",
            "--target-directory",
            "/data/tmp",
            "--force",
            "--keep-days",
            "30",
            "--workers",
            "8",
            "--deletion-method",
            "deleteapi",
        ])
        .unwrap();
        assert_eq!(cli.target_directory, Some(PathBuf::from("/data/tmp")));
        assert!(cli.force);
        assert_eq!(cli.keep_days, 30);
        assert_eq!(cli.workers, 8);
        assert_eq!(cli.deletion_method, "deleteapi");
    }

    #[test]
    fn cli_rejects_positional_arguments() {
        let err = Cli::try_parse_from(["fastpurge", "/some/path"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn short_alias_parses() {
        let cli = Cli::try_parse_from(["fastpurge", "-t", "/data/tmp"]).unwrap();
        assert_eq!(cli.target_directory, Some(PathBuf::from("/data/tmp")));
        let cli = Cli::try_parse_from(["fastpurge", "--td", "/data/tmp"]).unwrap();
        assert_eq!(cli.target_directory, Some(PathBuf::from("/data/tmp")));
    }
}
