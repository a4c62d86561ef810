// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Boundary to the CPU/device state collaborator.
//!
//! The controller never looks inside a [`NonMemoryBlob`]. It only checks
//! the CRC32 taken at capture time before handing the blob back, so a
//! corrupted blob fails loudly instead of being applied.

use std::sync::Arc;

use crate::error::StateError;

/// Opaque, immutable capture of CPU and device state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonMemoryBlob {
    bytes: Arc<[u8]>,
    checksum: u32,
}

impl NonMemoryBlob {
    /// Wrap captured bytes, recording their checksum.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let checksum = crc32fast::hash(&bytes);
        Self { bytes, checksum }
    }

    /// An empty blob, for guests without external state.
    pub fn empty() -> Self {
        Self::new(Vec::<u8>::new())
    }

    /// The captured bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of captured bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Checksum recorded at capture time.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Check the bytes still match the recorded checksum.
    pub fn verify(&self) -> Result<(), StateError> {
        let actual = crc32fast::hash(&self.bytes);
        if actual != self.checksum {
            return Err(StateError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}

/// Save/restore of everything that is not guest memory.
///
/// `apply` must restore the state as of the matching `capture`,
/// deterministically, any number of times.
pub trait NonMemoryState {
    /// Capture the current CPU/device state.
    fn capture(&mut self) -> Result<NonMemoryBlob, StateError>;

    /// Restore the CPU/device state captured in `blob`.
    fn apply(&mut self, blob: &NonMemoryBlob) -> Result<(), StateError>;
}

impl<T: NonMemoryState + ?Sized> NonMemoryState for Box<T> {
    fn capture(&mut self) -> Result<NonMemoryBlob, StateError> {
        (**self).capture()
    }

    fn apply(&mut self, blob: &NonMemoryBlob) -> Result<(), StateError> {
        (**self).apply(blob)
    }
}

/// Adapter for guests whose only state is memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullState;

impl NonMemoryState for NullState {
    fn capture(&mut self) -> Result<NonMemoryBlob, StateError> {
        Ok(NonMemoryBlob::empty())
    }

    fn apply(&mut self, _blob: &NonMemoryBlob) -> Result<(), StateError> {
        Ok(())
    }
}
