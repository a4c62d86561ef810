// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapshot controller - sequences every save, restore, link and unlink.
//!
//! The ordering rules live here:
//!
//! - The backing file is opened and size-checked, and the shared file is
//!   opened, before the shared link is dropped or any page is remapped, so
//!   a missing snapshot or unusable shared file changes nothing.
//! - CPU/device state is applied after memory is remapped. If `apply`
//!   fails, memory is already at the snapshot and the state is not; the
//!   restore is not counted and a retry applies it again.
//! - Remapping the whole region replaces the shared page's mapping, so the
//!   link is discarded first and re-established afterwards at the
//!   configured address.
//! - A save is committed only after memory is persisted and the CPU/device
//!   state is captured. Any failure before that leaves the controller
//!   `Unsaved`.
//!
//! The controller is single-threaded and non-reentrant. Wrap it in a
//! [`crate::service::SnapshotService`] to share it.

use std::path::Path;
use std::time::Instant;

use crate::backing::BackingStore;
use crate::command::{Command, CommandOutcome};
use crate::config::SnapshotPaths;
use crate::error::SnapshotError;
use crate::guest::GuestMemory;
use crate::mapper::{AddressSpaceMapper, LinuxMapper};
use crate::share::SharedPageLink;
use crate::state::{SnapshotPhase, SnapshotStateMachine};
use crate::state_adapter::{NonMemoryBlob, NonMemoryState};
use crate::stats::SnapshotStats;
use crate::types::PageAddress;

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new snapshot was committed.
    Saved,
    /// A snapshot was already committed; nothing changed.
    AlreadySaved,
}

/// Owner of guest memory, its snapshot and its shared page.
pub struct SnapshotController<S, M = LinuxMapper>
where
    S: NonMemoryState,
    M: AddressSpaceMapper,
{
    guest: GuestMemory,
    backing: BackingStore<M>,
    link: SharedPageLink<M>,
    state: S,
    machine: SnapshotStateMachine,
    blob: Option<NonMemoryBlob>,
    /// Address requested by the last set-shared-address command.
    shared_address: Option<PageAddress>,
}

impl<S: NonMemoryState> SnapshotController<S, LinuxMapper> {
    /// Create a controller using the Linux mapper.
    pub fn new(guest: GuestMemory, paths: SnapshotPaths, state: S) -> Self {
        Self::with_mapper(guest, paths, state, LinuxMapper)
    }
}

impl<S, M> SnapshotController<S, M>
where
    S: NonMemoryState,
    M: AddressSpaceMapper,
{
    /// Create a controller with an explicit mapper.
    pub fn with_mapper(guest: GuestMemory, paths: SnapshotPaths, state: S, mapper: M) -> Self {
        let backing = BackingStore::new(paths.backing_file, mapper.clone());
        let link = SharedPageLink::new(paths.shared_file, mapper);

        tracing::info!(
            guest_size = %guest.size(),
            backing_file = %backing.path().display(),
            shared_file = %link.path().display(),
            "SnapshotController initialized"
        );

        Self {
            guest,
            backing,
            link,
            state,
            machine: SnapshotStateMachine::new(),
            blob: None,
            shared_address: None,
        }
    }

    /// Guest memory.
    pub fn guest(&self) -> &GuestMemory {
        &self.guest
    }

    /// Guest memory, for host-side writes between commands.
    pub fn guest_mut(&mut self) -> &mut GuestMemory {
        &mut self.guest
    }

    /// The CPU/device state adapter.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The CPU/device state adapter, for changes between commands.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Current snapshot phase.
    pub fn phase(&self) -> SnapshotPhase {
        self.machine.phase()
    }

    /// Whether a snapshot has been committed.
    pub fn is_saved(&self) -> bool {
        self.machine.is_saved()
    }

    /// Address re-linked after every remap, if one is configured.
    pub fn shared_address(&self) -> Option<PageAddress> {
        self.shared_address
    }

    /// Address linked right now, if any.
    pub fn linked_address(&self) -> Option<PageAddress> {
        self.link.linked_address()
    }

    /// The captured CPU/device state, once saved.
    pub fn blob(&self) -> Option<&NonMemoryBlob> {
        self.blob.as_ref()
    }

    /// Path of the backing file.
    pub fn backing_path(&self) -> &Path {
        self.backing.path()
    }

    /// Path of the shared file.
    pub fn shared_path(&self) -> &Path {
        self.link.path()
    }

    /// Replace guest memory with the backing file and re-link the shared page.
    fn remap_from_backing(&mut self) -> Result<(), SnapshotError> {
        let snapshot = self.backing.open_snapshot(self.guest.size())?;
        let shared = match self.shared_address {
            Some(address) => Some((address, self.link.open_file()?)),
            None => None,
        };

        self.link.discard();
        self.backing.remap(&snapshot, &mut self.guest)?;

        if let Some((address, file)) = shared {
            self.link.link_file(&mut self.guest, address, &file)?;
        }

        Ok(())
    }

    /// Take the snapshot. A no-op once a snapshot is committed.
    pub fn save(&mut self) -> Result<SaveOutcome, SnapshotError> {
        if self.machine.is_saved() {
            tracing::debug!("Snapshot already saved, ignoring save request");
            return Ok(SaveOutcome::AlreadySaved);
        }

        let start = Instant::now();

        self.backing.persist(&self.guest)?;

        // From here on the guest runs on a copy-on-write view of what was
        // just saved, so it never dirties the backing file.
        self.remap_from_backing()?;

        let blob = self.state.capture().map_err(|e| {
            tracing::error!(error = %e, "CPU/device state capture failed, save rolled back");
            e
        })?;

        let elapsed = start.elapsed();
        self.machine.commit_save(elapsed)?;

        tracing::info!(
            guest_size = %self.guest.size(),
            state_bytes = blob.len(),
            shared_address = ?self.shared_address.map(|a| a.value()),
            elapsed_us = elapsed.as_micros() as u64,
            "Snapshot saved"
        );

        self.blob = Some(blob);
        Ok(SaveOutcome::Saved)
    }

    /// Return guest memory and CPU/device state to the snapshot.
    pub fn restore(&mut self) -> Result<(), SnapshotError> {
        let Some(blob) = self.blob.clone().filter(|_| self.machine.is_saved()) else {
            tracing::warn!("Restore requested but state has not been saved");
            return Err(SnapshotError::NotSaved);
        };

        blob.verify()?;

        let start = Instant::now();
        self.remap_from_backing()?;
        self.state.apply(&blob).map_err(|e| {
            tracing::error!(error = %e, "CPU/device state apply failed after memory was restored");
            e
        })?;

        let elapsed = start.elapsed();
        self.machine.record_restore(elapsed);

        tracing::debug!(
            restore_count = self.machine.restore_count(),
            elapsed_us = elapsed.as_micros() as u64,
            "Snapshot restored"
        );

        Ok(())
    }

    /// Link the shared page at `address`, unlinking any current link first.
    ///
    /// The address is validated before anything is unlinked, so an invalid
    /// address leaves the current link in place.
    pub fn link_shared(&mut self, address: u64) -> Result<PageAddress, SnapshotError> {
        let address = PageAddress::new(address, self.guest.size().bytes())?;

        self.link.unlink(&mut self.guest)?;
        self.shared_address = None;

        self.link.link(&mut self.guest, address)?;
        self.shared_address = Some(address);

        Ok(address)
    }

    /// Unlink the shared page and forget its address. No-op if unlinked.
    pub fn unlink_shared(&mut self) -> Result<(), SnapshotError> {
        self.link.unlink(&mut self.guest)?;
        self.shared_address = None;
        Ok(())
    }

    /// Run one command from the dispatcher.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutcome, SnapshotError> {
        tracing::trace!(command = %command, "Executing command");

        match command {
            Command::Save => match self.save()? {
                SaveOutcome::Saved => Ok(CommandOutcome::Saved),
                SaveOutcome::AlreadySaved => Ok(CommandOutcome::AlreadySaved),
            },
            Command::Restore => {
                self.restore()?;
                Ok(CommandOutcome::Restored)
            }
            Command::UnlinkShared => {
                self.unlink_shared()?;
                Ok(CommandOutcome::Unlinked)
            }
            Command::SetSharedAddress(address) => {
                let address = self.link_shared(address)?;
                Ok(CommandOutcome::Linked(address.value()))
            }
        }
    }

    /// Snapshot of the controller's counters and configuration.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            phase: self.machine.phase(),
            guest_size: self.guest.size().bytes(),
            restore_count: self.machine.restore_count(),
            last_save_us: self.machine.last_save().map(|d| d.as_micros() as u64),
            last_restore_us: self.machine.last_restore().map(|d| d.as_micros() as u64),
            shared_address: self.shared_address.map(|a| a.value()),
            linked_address: self.link.linked_address().map(|a| a.value()),
            state_blob_bytes: self.blob.as_ref().map(|b| b.len()),
        }
    }
}

impl<S, M> Drop for SnapshotController<S, M>
where
    S: NonMemoryState,
    M: AddressSpaceMapper,
{
    fn drop(&mut self) {
        // Hand the guest its own page back; matters for adopted memory that
        // outlives the controller.
        if let Err(e) = self.link.unlink(&mut self.guest) {
            tracing::warn!(error = %e, "Failed to unlink shared page on drop");
        }
    }
}
