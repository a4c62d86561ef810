// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread-safe handle around a single snapshot controller.
//!
//! The controller assumes one caller at a time. This wrapper is the single
//! global mutex that serializes callers behind a service boundary.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::command::{Command, CommandOutcome};
use crate::controller::SnapshotController;
use crate::error::SnapshotError;
use crate::mapper::{AddressSpaceMapper, LinuxMapper};
use crate::state_adapter::NonMemoryState;
use crate::stats::SnapshotStats;

/// Cloneable, lock-guarded snapshot controller.
pub struct SnapshotService<S, M = LinuxMapper>
where
    S: NonMemoryState,
    M: AddressSpaceMapper,
{
    inner: Arc<Mutex<SnapshotController<S, M>>>,
}

impl<S, M> Clone for SnapshotService<S, M>
where
    S: NonMemoryState,
    M: AddressSpaceMapper,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, M> SnapshotService<S, M>
where
    S: NonMemoryState,
    M: AddressSpaceMapper,
{
    /// Wrap a controller.
    pub fn new(controller: SnapshotController<S, M>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SnapshotController<S, M>>, SnapshotError> {
        self.inner.lock().map_err(|_| SnapshotError::Poisoned)
    }

    /// Run one command to completion while holding the lock.
    pub fn execute(&self, command: Command) -> Result<CommandOutcome, SnapshotError> {
        self.lock()?.execute(command)
    }

    /// Current controller statistics.
    pub fn stats(&self) -> Result<SnapshotStats, SnapshotError> {
        Ok(self.lock()?.stats())
    }

    /// Run `f` with exclusive access to the controller.
    pub fn with_controller<R>(
        &self,
        f: impl FnOnce(&mut SnapshotController<S, M>) -> R,
    ) -> Result<R, SnapshotError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }
}
