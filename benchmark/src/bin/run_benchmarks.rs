// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the snapshot benchmarks and write a JSON report.

use clap::Parser;
use std::path::PathBuf;
use vmsnap_benchmark::{suite, BenchmarkCategory, BenchmarkHarness, BenchmarkReport, JsonReporter};

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Run vmsnap benchmarks and generate JSON reports")]
struct Args {
    /// Output directory for benchmark data
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// Number of iterations for each benchmark
    #[arg(short, long, default_value_t = 100)]
    iterations: u64,

    /// Guest sizes to measure, in megabytes
    #[arg(short, long, value_delimiter = ',', default_values_t = [16u64, 64, 256])]
    guest_mb: Vec<u64>,

    /// Categories to run: save, restore, shared_page (all if not specified)
    #[arg(short, long)]
    category: Vec<BenchmarkCategory>,

    /// Run in quick mode (fewer iterations)
    #[arg(long)]
    quick: bool,
}

/// Dirty-page counts for the restore scenarios.
const DIRTY_PAGES: &[usize] = &[1, 64, 4096];

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let iterations = if args.quick { 10 } else { args.iterations };

    println!("vmsnap Benchmark Suite");
    println!("======================");
    println!("Output directory: {:?}", args.output);
    println!("Iterations: {}", iterations);
    println!("Guest sizes: {:?} MB", args.guest_mb);
    println!();

    let reporter = JsonReporter::new(&args.output)?;
    let mut report = BenchmarkReport::new();

    let should_run = |cat: BenchmarkCategory| args.category.is_empty() || args.category.contains(&cat);

    let harness = BenchmarkHarness::new()
        .warmup((iterations / 10).max(1))
        .iterations(iterations);

    if should_run(BenchmarkCategory::Save) {
        println!("Running save benchmarks...");
        // Every sample writes the whole guest to disk
        let harness = harness.clone().warmup(1).iterations(iterations.min(20));
        for &mb in &args.guest_mb {
            let result = suite::save_latency(&harness, mb)?;
            println!("  ✓ {}", result.name);
            report.add_result(result);
        }
    }

    if should_run(BenchmarkCategory::Restore) {
        println!("Running restore benchmarks...");
        for &mb in &args.guest_mb {
            for &dirty in DIRTY_PAGES {
                for linked in [false, true] {
                    let result = suite::restore_latency(&harness, mb, dirty, linked)?;
                    println!("  ✓ {}", result.name);
                    report.add_result(result);
                }
            }
        }
    }

    if should_run(BenchmarkCategory::SharedPage) {
        println!("Running shared page benchmarks...");
        for &mb in &args.guest_mb {
            let result = suite::link_cycle_latency(&harness, mb)?;
            println!("  ✓ {}", result.name);
            report.add_result(result);
        }
    }

    let path = reporter.save(&report)?;
    println!();
    println!("Benchmark report saved to: {:?}", path);
    println!();

    print_summary(&report);

    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    use vmsnap_benchmark::LatencyMetrics;

    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        println!(
            "{}: median={}, p99={}",
            result.name,
            LatencyMetrics::format_latency(result.latency.median_ns),
            LatencyMetrics::format_latency(result.latency.p99_ns)
        );
    }
}
