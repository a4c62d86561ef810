// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for timing fallible snapshot operations.
//!
//! Snapshot operations return `Result`, so the harness stops at the first
//! failure instead of recording a sample for an operation that did nothing.

use std::time::Instant;

/// A benchmark harness for measuring operation latency.
#[derive(Debug, Clone)]
pub struct BenchmarkHarness {
    /// Iterations run before measurement starts
    warmup_iterations: u64,
    /// Iterations that produce samples
    measurement_iterations: u64,
    /// Whether results keep the raw samples
    keep_raw_samples: bool,
}

impl BenchmarkHarness {
    pub fn new() -> Self {
        Self {
            warmup_iterations: 10,
            measurement_iterations: 100,
            keep_raw_samples: true,
        }
    }

    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    pub fn keep_samples(mut self, keep: bool) -> Self {
        self.keep_raw_samples = keep;
        self
    }

    pub fn should_keep_samples(&self) -> bool {
        self.keep_raw_samples
    }

    /// Time `operation` and return one sample per measured iteration, in
    /// nanoseconds.
    pub fn run<F, E>(&self, mut operation: F) -> Result<Vec<u64>, E>
    where
        F: FnMut() -> Result<(), E>,
    {
        for _ in 0..self.warmup_iterations {
            operation()?;
        }

        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            let start = Instant::now();
            operation()?;
            samples.push(start.elapsed().as_nanos() as u64);
        }

        Ok(samples)
    }

    /// Like [`run`](Self::run), but calls `setup` untimed before every
    /// iteration. Used to dirty guest pages ahead of a restore.
    pub fn run_with_setup<S, O, E>(&self, mut setup: S, mut operation: O) -> Result<Vec<u64>, E>
    where
        S: FnMut() -> Result<(), E>,
        O: FnMut() -> Result<(), E>,
    {
        for _ in 0..self.warmup_iterations {
            setup()?;
            operation()?;
        }

        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            setup()?;

            let start = Instant::now();
            operation()?;
            samples.push(start.elapsed().as_nanos() as u64);
        }

        Ok(samples)
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_harness_counts_only_measured_iterations() {
        let harness = BenchmarkHarness::new().warmup(3).iterations(12);
        let mut calls = 0;

        let samples: Vec<u64> = harness
            .run(|| {
                calls += 1;
                Ok::<_, ()>(())
            })
            .unwrap();

        assert_eq!(samples.len(), 12);
        assert_eq!(calls, 15);
    }

    #[test]
    fn test_setup_is_not_timed() {
        let harness = BenchmarkHarness::new().warmup(0).iterations(5);

        let samples = harness
            .run_with_setup(
                || {
                    thread::sleep(Duration::from_millis(20));
                    Ok::<_, ()>(())
                },
                || Ok(()),
            )
            .unwrap();

        assert_eq!(samples.len(), 5);
        for sample in &samples {
            assert!(*sample < 20_000_000, "setup leaked into sample {}", sample);
        }
    }

    #[test]
    fn test_first_error_stops_the_run() {
        let harness = BenchmarkHarness::new().warmup(2).iterations(10);
        let mut calls = 0;

        let result = harness.run(|| {
            calls += 1;
            if calls == 4 {
                Err("restore failed")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("restore failed"));
        assert_eq!(calls, 4);
    }
}
