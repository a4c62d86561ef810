// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! vmsnap Benchmarking Framework
//!
//! Measures how long the snapshot controller takes to save, restore and
//! link the shared page.
//!
//! # Benchmark Categories
//!
//! - **Save**: full persist of guest memory plus the first copy-on-write remap
//! - **Restore**: whole-region remap as a function of guest size and dirty pages
//! - **Shared Page**: link plus unlink of the one shared page
//!
//! # Data Output
//!
//! `run_benchmarks` writes one timestamped JSON report per run.

pub mod harness;
pub mod metrics;
pub mod reporter;
pub mod suite;

pub use harness::BenchmarkHarness;
pub use metrics::{BenchmarkCategory, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo};
pub use reporter::JsonReporter;
pub use suite::{Fixture, SuiteError};
