// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark scenarios shared by the `run_benchmarks` binary and the
//! criterion benches.
//!
//! Each scenario builds a controller over a fresh temp directory, so runs
//! never touch `/dev/shm` defaults or each other's files.

use std::cell::RefCell;

use tempfile::TempDir;
use thiserror::Error;
use vmsnap_core::error::{GuestAccessError, HardValidationError, MapError};
use vmsnap_core::{
    GuestMemory, GuestSize, NullState, SnapshotController, SnapshotError, SnapshotPaths, PAGE_SIZE,
};

use crate::harness::BenchmarkHarness;
use crate::metrics::{BenchmarkCategory, BenchmarkResult};

/// Errors that abort a scenario.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Failed to create scratch directory: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("Invalid guest size: {0}")]
    GuestSize(#[from] HardValidationError),

    #[error("Failed to allocate guest memory: {0}")]
    Allocate(#[from] MapError),

    #[error("Guest write failed: {0}")]
    Access(#[from] GuestAccessError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// A controller over a scratch directory that lives as long as it does.
pub struct Fixture {
    pub controller: SnapshotController<NullState>,
    // Dropped after the controller so its files outlive every mapping.
    _dir: TempDir,
}

impl Fixture {
    /// Guest of `guest_mb` megabytes filled with a per-page pattern.
    pub fn new(guest_mb: u64) -> Result<Self, SuiteError> {
        let dir = TempDir::new()?;
        let mut guest = GuestMemory::allocate(GuestSize::from_mb(guest_mb)?)?;

        for page in 0..guest.len() / PAGE_SIZE {
            guest.fill(page * PAGE_SIZE, 1, page as u8)?;
        }

        let controller = SnapshotController::new(guest, SnapshotPaths::in_dir(dir.path()), NullState);
        Ok(Self {
            controller,
            _dir: dir,
        })
    }

    /// Fixture with a committed snapshot.
    pub fn saved(guest_mb: u64) -> Result<Self, SuiteError> {
        let mut fixture = Self::new(guest_mb)?;
        fixture.controller.save()?;
        Ok(fixture)
    }

    /// Write one byte into each of the first `pages` guest pages.
    pub fn dirty(&mut self, pages: usize) -> Result<(), SuiteError> {
        let guest = self.controller.guest_mut();
        let pages = pages.min(guest.len() / PAGE_SIZE);
        for page in 0..pages {
            guest.fill(page * PAGE_SIZE + 1, 1, 0xFF)?;
        }
        Ok(())
    }
}

/// Time `save` on fresh fixtures. Each sample persists the whole guest.
pub fn save_latency(harness: &BenchmarkHarness, guest_mb: u64) -> Result<BenchmarkResult, SuiteError> {
    let fixture = RefCell::new(None);

    let samples = harness.run_with_setup(
        || {
            *fixture.borrow_mut() = Some(Fixture::new(guest_mb)?);
            Ok(())
        },
        || match fixture.borrow_mut().as_mut() {
            Some(f) => f.controller.save().map(|_| ()).map_err(SuiteError::from),
            None => Ok(()),
        },
    )?;

    Ok(BenchmarkResult::latency(
        format!("save_{}mb", guest_mb),
        BenchmarkCategory::Save,
        samples,
        harness.should_keep_samples(),
    )
    .with_metadata("guest_mb", guest_mb))
}

/// Time `restore` after dirtying `dirty_pages` pages, optionally with the
/// shared page linked so every restore also re-links it.
pub fn restore_latency(
    harness: &BenchmarkHarness,
    guest_mb: u64,
    dirty_pages: usize,
    linked: bool,
) -> Result<BenchmarkResult, SuiteError> {
    let mut fixture = Fixture::new(guest_mb)?;
    if linked {
        fixture.controller.link_shared(0)?;
    }
    fixture.controller.save()?;

    let fixture = RefCell::new(fixture);
    let samples = harness.run_with_setup(
        || fixture.borrow_mut().dirty(dirty_pages),
        || Ok(fixture.borrow_mut().controller.restore()?),
    )?;

    let name = if linked {
        format!("restore_{}mb_{}dirty_linked", guest_mb, dirty_pages)
    } else {
        format!("restore_{}mb_{}dirty", guest_mb, dirty_pages)
    };

    Ok(BenchmarkResult::latency(
        name,
        BenchmarkCategory::Restore,
        samples,
        harness.should_keep_samples(),
    )
    .with_metadata("guest_mb", guest_mb)
    .with_metadata("dirty_pages", dirty_pages)
    .with_metadata("shared_page_linked", linked))
}

/// Time one link plus unlink of the shared page.
pub fn link_cycle_latency(harness: &BenchmarkHarness, guest_mb: u64) -> Result<BenchmarkResult, SuiteError> {
    let mut fixture = Fixture::new(guest_mb)?;
    let address = (PAGE_SIZE * 16) as u64;

    let samples = harness.run(|| {
        fixture.controller.link_shared(address)?;
        fixture.controller.unlink_shared()?;
        Ok::<_, SuiteError>(())
    })?;

    Ok(BenchmarkResult::latency(
        format!("link_unlink_{}mb", guest_mb),
        BenchmarkCategory::SharedPage,
        samples,
        harness.should_keep_samples(),
    )
    .with_metadata("guest_mb", guest_mb)
    .with_metadata("address", address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> BenchmarkHarness {
        BenchmarkHarness::new().warmup(1).iterations(3)
    }

    #[test]
    fn test_restore_scenario_runs() {
        let result = restore_latency(&quick(), 1, 8, true).unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.category, BenchmarkCategory::Restore);
        assert_eq!(result.name, "restore_1mb_8dirty_linked");
    }

    #[test]
    fn test_save_scenario_runs() {
        let result = save_latency(&quick(), 1).unwrap();
        assert_eq!(result.iterations, 3);
        assert!(result.latency.min_ns > 0);
    }

    #[test]
    fn test_link_cycle_scenario_runs() {
        let result = link_cycle_latency(&quick(), 1).unwrap();
        assert_eq!(result.category, BenchmarkCategory::SharedPage);
    }

    #[test]
    fn test_dirty_pages_are_restored() {
        let mut fixture = Fixture::saved(1).unwrap();
        fixture.dirty(4).unwrap();
        fixture.controller.restore().unwrap();

        let mut byte = [0u8; 1];
        fixture.controller.guest().read(PAGE_SIZE + 1, &mut byte).unwrap();
        assert_eq!(byte[0], 0);
    }
}
