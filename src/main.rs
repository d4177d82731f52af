//! fastpurge CLI entry point.

use clap::Parser;

use fastpurge::cli_app;
use fastpurge::monitor::alloc::CountingAllocator;

// Feeds the monitor's allocator-churn channel.
#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

fn main() {
    let cli = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&cli) {
        eprintln!("fastpurge: {e}");
        std::process::exit(e.exit_code());
    }
}
