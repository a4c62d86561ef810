// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Address-space mapper - the raw virtual-memory capability.
//!
//! Everything that touches `mmap`, `munmap`, `mremap` or `msync` goes
//! through [`AddressSpaceMapper`]. The snapshot logic depends only on the
//! contract documented on each method, so it can be exercised against a
//! wrapping mapper that injects failures.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::ptr::NonNull;

use crate::error::MapError;

/// How a file is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Writes go to the file and are visible to every other mapper of it.
    Shared,
    /// Copy-on-write: writes stay in this mapping and never reach the file.
    Private,
}

impl MapMode {
    fn flags(self) -> libc::c_int {
        match self {
            Self::Shared => libc::MAP_SHARED,
            Self::Private => libc::MAP_PRIVATE,
        }
    }
}

/// Virtual-memory operations used by the backing store and shared-page link.
///
/// All mappings are read/write. Implementations are cheap handles: they are
/// cloned into every component that owns mappings.
pub trait AddressSpaceMapper: Clone {
    /// Map `len` bytes of `file`, from offset 0, at exactly `addr`.
    ///
    /// Whatever was mapped in `[addr, addr + len)` is replaced atomically.
    ///
    /// # Safety
    /// `addr` must be page-aligned and the range must belong to the caller,
    /// with no live references into it.
    unsafe fn map_file_at(
        &self,
        addr: NonNull<u8>,
        len: usize,
        file: &File,
        mode: MapMode,
    ) -> Result<(), MapError>;

    /// Remove the mapping covering `[addr, addr + len)`.
    ///
    /// # Safety
    /// The range must belong to the caller, with no live references into it.
    unsafe fn unmap_at(&self, addr: NonNull<u8>, len: usize) -> Result<(), MapError>;

    /// Relocate the mapping at `src` so that `dst` shows its pages.
    ///
    /// Whatever was mapped at `dst` is replaced atomically and `src` is no
    /// longer mapped afterwards.
    ///
    /// # Safety
    /// Both ranges must belong to the caller, with no live references into
    /// them, and `src` must be a single mapping of at least `len` bytes.
    unsafe fn move_mapping(
        &self,
        src: NonNull<u8>,
        dst: NonNull<u8>,
        len: usize,
    ) -> Result<(), MapError>;

    /// Create a private anonymous mapping at a kernel-chosen address.
    fn map_anonymous(&self, len: usize) -> Result<NonNull<u8>, MapError>;

    /// Map `len` bytes of `file` at a kernel-chosen address.
    fn map_file(&self, file: &File, len: usize, mode: MapMode) -> Result<NonNull<u8>, MapError>;

    /// Synchronously write back a shared file mapping.
    ///
    /// # Safety
    /// The range must be a live mapping created by this mapper.
    unsafe fn flush(&self, addr: NonNull<u8>, len: usize) -> Result<(), MapError>;
}

/// [`AddressSpaceMapper`] backed by the Linux `mmap` family.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxMapper;

fn last_os_error() -> String {
    std::io::Error::last_os_error().to_string()
}

fn check_len(len: usize) -> Result<(), MapError> {
    if len == 0 {
        return Err(MapError::InvalidLength { len });
    }
    Ok(())
}

impl AddressSpaceMapper for LinuxMapper {
    unsafe fn map_file_at(
        &self,
        addr: NonNull<u8>,
        len: usize,
        file: &File,
        mode: MapMode,
    ) -> Result<(), MapError> {
        check_len(len)?;

        // SAFETY: the caller owns the range; MAP_FIXED replaces it in place.
        let ptr = libc::mmap(
            addr.as_ptr().cast(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            mode.flags() | libc::MAP_FIXED,
            file.as_raw_fd(),
            0,
        );

        if ptr == libc::MAP_FAILED {
            return Err(MapError::MapFailed {
                addr: addr.as_ptr() as usize,
                len,
                reason: format!("mmap failed: {}", last_os_error()),
            });
        }

        if ptr != addr.as_ptr().cast() {
            return Err(MapError::MapFailed {
                addr: addr.as_ptr() as usize,
                len,
                reason: format!("kernel placed mapping at {:p}", ptr),
            });
        }

        tracing::trace!(addr = ?addr, len = len, mode = ?mode, "Mapped file at fixed address");
        Ok(())
    }

    unsafe fn unmap_at(&self, addr: NonNull<u8>, len: usize) -> Result<(), MapError> {
        check_len(len)?;

        // SAFETY: the caller owns the range.
        if libc::munmap(addr.as_ptr().cast(), len) < 0 {
            return Err(MapError::UnmapFailed {
                addr: addr.as_ptr() as usize,
                len,
                reason: format!("munmap failed: {}", last_os_error()),
            });
        }

        tracing::trace!(addr = ?addr, len = len, "Unmapped range");
        Ok(())
    }

    unsafe fn move_mapping(
        &self,
        src: NonNull<u8>,
        dst: NonNull<u8>,
        len: usize,
    ) -> Result<(), MapError> {
        check_len(len)?;

        // SAFETY: the caller owns both ranges; MREMAP_FIXED unmaps `dst` first.
        let ptr = libc::mremap(
            src.as_ptr().cast(),
            len,
            len,
            libc::MREMAP_MAYMOVE | libc::MREMAP_FIXED,
            dst.as_ptr().cast::<libc::c_void>(),
        );

        if ptr == libc::MAP_FAILED {
            return Err(MapError::MoveFailed {
                src: src.as_ptr() as usize,
                dst: dst.as_ptr() as usize,
                len,
                reason: format!("mremap failed: {}", last_os_error()),
            });
        }

        tracing::trace!(src = ?src, dst = ?dst, len = len, "Moved mapping");
        Ok(())
    }

    fn map_anonymous(&self, len: usize) -> Result<NonNull<u8>, MapError> {
        check_len(len)?;

        // SAFETY: a fresh mapping at a kernel-chosen address aliases nothing.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MapError::MapFailed {
                addr: 0,
                len,
                reason: format!("anonymous mmap failed: {}", last_os_error()),
            });
        }

        NonNull::new(ptr.cast()).ok_or_else(|| MapError::MapFailed {
            addr: 0,
            len,
            reason: "mmap returned null".to_string(),
        })
    }

    fn map_file(&self, file: &File, len: usize, mode: MapMode) -> Result<NonNull<u8>, MapError> {
        check_len(len)?;

        // SAFETY: fd is valid for the call; the kernel picks the address.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                mode.flags(),
                file.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MapError::MapFailed {
                addr: 0,
                len,
                reason: format!("file mmap failed: {}", last_os_error()),
            });
        }

        NonNull::new(ptr.cast()).ok_or_else(|| MapError::MapFailed {
            addr: 0,
            len,
            reason: "mmap returned null".to_string(),
        })
    }

    unsafe fn flush(&self, addr: NonNull<u8>, len: usize) -> Result<(), MapError> {
        check_len(len)?;

        // SAFETY: the caller guarantees this is a live mapping.
        if libc::msync(addr.as_ptr().cast(), len, libc::MS_SYNC) < 0 {
            return Err(MapError::FlushFailed {
                addr: addr.as_ptr() as usize,
                len,
                reason: format!("msync failed: {}", last_os_error()),
            });
        }
        Ok(())
    }
}

/// An owned mapping at a kernel-chosen address.
///
/// The mapping is removed on drop unless it has been handed off with
/// [`Mapping::disarm`].
pub struct Mapping<M: AddressSpaceMapper> {
    mapper: M,
    ptr: NonNull<u8>,
    len: usize,
    armed: bool,
}

// SAFETY: Mapping exclusively owns its memory range.
unsafe impl<M: AddressSpaceMapper + Send> Send for Mapping<M> {}

impl<M: AddressSpaceMapper> Mapping<M> {
    /// Create a private anonymous mapping.
    pub fn anonymous(mapper: &M, len: usize) -> Result<Self, MapError> {
        let ptr = mapper.map_anonymous(len)?;
        Ok(Self {
            mapper: mapper.clone(),
            ptr,
            len,
            armed: true,
        })
    }

    /// Map a file.
    pub fn file(mapper: &M, file: &File, len: usize, mode: MapMode) -> Result<Self, MapError> {
        let ptr = mapper.map_file(file, len, mode)?;
        Ok(Self {
            mapper: mapper.clone(),
            ptr,
            len,
            armed: true,
        })
    }

    /// Start of the mapping.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty. Never true for a live mapping.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a slice view of the mapping.
    ///
    /// # Safety
    /// For shared file mappings the caller must ensure no other process
    /// writes the file while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    /// Get a mutable slice view of the mapping.
    ///
    /// # Safety
    /// Same requirements as [`Mapping::as_slice`].
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
    }

    /// Synchronously write back a shared file mapping.
    pub fn flush(&self) -> Result<(), MapError> {
        // SAFETY: ptr/len describe our own live mapping.
        unsafe { self.mapper.flush(self.ptr, self.len) }
    }

    /// Give up ownership without unmapping, because the pages were moved
    /// elsewhere and `ptr` is no longer mapped.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl<M: AddressSpaceMapper> Drop for Mapping<M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        // SAFETY: ptr and len were set when the mapping was created.
        if let Err(e) = unsafe { self.mapper.unmap_at(self.ptr, self.len) } {
            tracing::error!(error = %e, "Failed to unmap owned mapping");
        }
    }
}

impl<M: AddressSpaceMapper> std::fmt::Debug for Mapping<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("armed", &self.armed)
            .finish()
    }
}
