// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Backing store - one file holding a full copy of guest memory.
//!
//! `persist` writes the file once per snapshot; every restore maps it back
//! over guest memory as a private copy-on-write view, so the file itself
//! never changes after it is written. Use a tmpfs path such as `/dev/shm`
//! for speed.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::BackingStoreError;
use crate::guest::GuestMemory;
use crate::mapper::{AddressSpaceMapper, MapMode, Mapping};
use crate::types::GuestSize;

/// Suffix of the file written before it is renamed into place.
const STAGING_SUFFIX: &str = ".partial";

/// A backing file opened for restore whose size matches guest memory.
#[derive(Debug)]
pub struct SnapshotFile {
    file: File,
    len: u64,
}

impl SnapshotFile {
    /// Size of the snapshot in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Always false; a snapshot file matches a non-empty guest.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Manager for the backing file.
#[derive(Debug)]
pub struct BackingStore<M: AddressSpaceMapper> {
    path: PathBuf,
    mapper: M,
}

impl<M: AddressSpaceMapper> BackingStore<M> {
    /// Create a backing store at `path`. Nothing is touched on disk yet.
    pub fn new(path: impl Into<PathBuf>, mapper: M) -> Self {
        Self {
            path: path.into(),
            mapper,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a backing file is present on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(STAGING_SUFFIX);
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, context: &'static str, source: std::io::Error) -> BackingStoreError {
        BackingStoreError::Io {
            path: path.to_path_buf(),
            context,
            source,
        }
    }

    /// Write an exact byte copy of guest memory to the backing file.
    ///
    /// The copy is staged next to the backing file and renamed into place
    /// only after it has been flushed, so a failure never leaves a partial
    /// snapshot at the configured path.
    pub fn persist(&self, guest: &GuestMemory) -> Result<(), BackingStoreError> {
        let start = Instant::now();
        let staging = self.staging_path();

        if let Err(e) = self.write_staging(&staging, guest) {
            if let Err(cleanup) = std::fs::remove_file(&staging) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %staging.display(),
                        error = %cleanup,
                        "Failed to remove staging file"
                    );
                }
            }
            return Err(e);
        }

        std::fs::rename(&staging, &self.path)
            .map_err(|e| self.io_error(&self.path, "renaming staged snapshot into place", e))?;

        tracing::info!(
            path = %self.path.display(),
            size = %guest.size(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Persisted guest memory"
        );

        Ok(())
    }

    fn write_staging(&self, staging: &Path, guest: &GuestMemory) -> Result<(), BackingStoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(staging)
            .map_err(|e| self.io_error(staging, "creating backing file", e))?;

        file.set_len(guest.size().bytes())
            .map_err(|e| self.io_error(staging, "expanding backing file to guest size", e))?;

        let mut mapping = Mapping::file(&self.mapper, &file, guest.len(), MapMode::Shared)?;

        // SAFETY: the staging file is private to us until renamed, and the
        // guest cannot be remapped while we hold `&GuestMemory`.
        unsafe { mapping.as_mut_slice().copy_from_slice(guest.as_slice()) };

        mapping.flush()?;
        Ok(())
    }

    /// Open the backing file for a restore and check it matches the guest.
    ///
    /// This is the fallible half of [`BackingStore::map_copy_on_write`] and
    /// touches no mapping.
    pub fn open_snapshot(&self, guest_size: GuestSize) -> Result<SnapshotFile, BackingStoreError> {
        let file = File::open(&self.path)
            .map_err(|e| self.io_error(&self.path, "opening backing file", e))?;

        let len = file
            .metadata()
            .map_err(|e| self.io_error(&self.path, "reading backing file metadata", e))?
            .len();

        if len != guest_size.bytes() {
            return Err(BackingStoreError::SizeMismatch {
                path: self.path.clone(),
                expected: guest_size.bytes(),
                actual: len,
            });
        }

        Ok(SnapshotFile { file, len })
    }

    /// Replace all of guest memory with a copy-on-write view of `snapshot`.
    pub fn remap(&self, snapshot: &SnapshotFile, guest: &mut GuestMemory) -> Result<(), BackingStoreError> {
        if snapshot.len != guest.size().bytes() {
            return Err(BackingStoreError::SizeMismatch {
                path: self.path.clone(),
                expected: guest.size().bytes(),
                actual: snapshot.len,
            });
        }

        // SAFETY: `&mut GuestMemory` guarantees no host references into the
        // region; MAP_FIXED replaces every page, shared page included.
        unsafe {
            self.mapper
                .map_file_at(guest.base(), guest.len(), &snapshot.file, MapMode::Private)?;
        }

        Ok(())
    }

    /// Open the backing file and map it copy-on-write over guest memory.
    pub fn map_copy_on_write(&self, guest: &mut GuestMemory) -> Result<(), BackingStoreError> {
        let snapshot = self.open_snapshot(guest.size())?;
        self.remap(&snapshot, guest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::LinuxMapper;
    use crate::types::PAGE_SIZE;
    use tempfile::TempDir;

    fn guest(pages: u64) -> GuestMemory {
        GuestMemory::allocate(GuestSize::new(pages * PAGE_SIZE as u64).unwrap()).unwrap()
    }

    #[test]
    fn test_staging_path() {
        let store = BackingStore::new("/dev/shm/snapshot0", LinuxMapper);
        assert_eq!(store.staging_path(), PathBuf::from("/dev/shm/snapshot0.partial"));
    }

    #[test]
    fn test_persist_writes_exact_copy() {
        let dir = TempDir::new().unwrap();
        let store = BackingStore::new(dir.path().join("snapshot0"), LinuxMapper);

        let mut memory = guest(4);
        memory.fill(0, PAGE_SIZE, 0x11).unwrap();
        memory.write(3 * PAGE_SIZE + 5, b"tail").unwrap();

        store.persist(&memory).unwrap();

        let bytes = std::fs::read(store.path()).unwrap();
        assert_eq!(bytes.len(), 4 * PAGE_SIZE);
        assert!(bytes[..PAGE_SIZE].iter().all(|&b| b == 0x11));
        assert_eq!(&bytes[3 * PAGE_SIZE + 5..3 * PAGE_SIZE + 9], b"tail");
        assert!(!store.staging_path().exists());
    }

    #[test]
    fn test_persist_into_missing_directory_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let store = BackingStore::new(dir.path().join("missing").join("snapshot0"), LinuxMapper);

        let err = store.persist(&guest(1)).unwrap_err();
        assert!(matches!(err, BackingStoreError::Io { .. }));
        assert!(!store.exists());
    }

    #[test]
    fn test_copy_on_write_never_reaches_file() {
        let dir = TempDir::new().unwrap();
        let store = BackingStore::new(dir.path().join("snapshot0"), LinuxMapper);

        let mut memory = guest(2);
        memory.fill(0, 2 * PAGE_SIZE, 0x42).unwrap();
        store.persist(&memory).unwrap();
        store.map_copy_on_write(&mut memory).unwrap();

        memory.fill(0, PAGE_SIZE, 0x00).unwrap();
        let on_disk = std::fs::read(store.path()).unwrap();
        assert!(on_disk.iter().all(|&b| b == 0x42));

        store.map_copy_on_write(&mut memory).unwrap();
        let mut buf = [0u8; 8];
        memory.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x42; 8]);
    }

    #[test]
    fn test_open_snapshot_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = BackingStore::new(dir.path().join("absent"), LinuxMapper);
        let size = GuestSize::new(PAGE_SIZE as u64).unwrap();
        assert!(matches!(
            store.open_snapshot(size),
            Err(BackingStoreError::Io { .. })
        ));
    }

    #[test]
    fn test_open_snapshot_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot0");
        std::fs::write(&path, vec![0u8; PAGE_SIZE]).unwrap();

        let store = BackingStore::new(&path, LinuxMapper);
        let err = store
            .open_snapshot(GuestSize::new(2 * PAGE_SIZE as u64).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            BackingStoreError::SizeMismatch {
                expected,
                actual,
                ..
            } if expected == 2 * PAGE_SIZE as u64 && actual == PAGE_SIZE as u64
        ));
    }
}
