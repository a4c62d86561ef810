// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Guest memory - the contiguous region holding a VM's RAM.
//!
//! The region's base and size never change. What is mapped inside it does:
//! the backing store and shared-page link replace its pages, and both
//! require `&mut GuestMemory` so no host-side slice can outlive a remap.

use std::ptr::NonNull;

use crate::error::{GuestAccessError, LinkError, MapError};
use crate::types::{GuestSize, PageAddress};

/// Handle to guest RAM.
pub struct GuestMemory {
    base: NonNull<u8>,
    size: GuestSize,
    /// Whether this handle allocated the region (and unmaps it on drop).
    owned: bool,
}

// SAFETY: GuestMemory is the single owner of the region it describes.
unsafe impl Send for GuestMemory {}

impl GuestMemory {
    /// Allocate zeroed anonymous guest memory.
    pub fn allocate(size: GuestSize) -> Result<Self, MapError> {
        let len = size.as_usize();

        // SAFETY: a fresh mapping at a kernel-chosen address aliases nothing.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MapError::MapFailed {
                addr: 0,
                len,
                reason: format!("guest mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        let base = NonNull::new(ptr.cast()).ok_or_else(|| MapError::MapFailed {
            addr: 0,
            len,
            reason: "mmap returned null".to_string(),
        })?;

        tracing::debug!(base = ?base, size = %size, "Allocated guest memory");

        Ok(Self {
            base,
            size,
            owned: true,
        })
    }

    /// Adopt guest memory owned by an embedding VMM.
    ///
    /// # Safety
    /// `base` must be page-aligned and `[base, base + size)` must be mapped
    /// read/write for as long as this handle lives. The caller gives up the
    /// right to remap the region while the handle exists. The region is not
    /// unmapped on drop.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, size: GuestSize) -> Self {
        Self {
            base,
            size,
            owned: false,
        }
    }

    /// Start of guest memory in the host address space.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Size of guest memory.
    pub fn size(&self) -> GuestSize {
        self.size
    }

    /// Size of guest memory in bytes.
    pub fn len(&self) -> usize {
        self.size.as_usize()
    }

    /// Always false; guest memory is at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Host pointer to the page at `address`.
    pub fn page_ptr(&self, address: PageAddress) -> Result<NonNull<u8>, LinkError> {
        // Re-validate: the address may have been checked against another size.
        let address = PageAddress::new(address.value(), self.size.bytes())?;

        // SAFETY: address.offset() + PAGE_SIZE <= len, checked above.
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(address.offset())) })
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), GuestAccessError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(GuestAccessError {
                offset,
                len,
                size: self.len(),
            }),
        }
    }

    /// Copy guest bytes at `offset` into `buf`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), GuestAccessError> {
        self.check_range(offset, buf.len())?;

        // SAFETY: range checked; buf is host memory outside the guest.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Copy `data` into guest memory at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), GuestAccessError> {
        self.check_range(offset, data.len())?;

        // SAFETY: range checked; data is host memory outside the guest.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.base.as_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Fill `len` guest bytes at `offset` with `value`.
    pub fn fill(&mut self, offset: usize, len: usize, value: u8) -> Result<(), GuestAccessError> {
        self.check_range(offset, len)?;

        // SAFETY: range checked.
        unsafe { std::ptr::write_bytes(self.base.as_ptr().add(offset), value, len) };
        Ok(())
    }

    /// Get a slice view of all guest memory.
    ///
    /// # Safety
    /// A linked shared page may be written by another process at any time;
    /// the caller must tolerate or exclude that.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.base.as_ptr(), self.len())
    }
}

impl Drop for GuestMemory {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }

        // SAFETY: base/len describe the region allocated in `allocate`;
        // munmap removes whatever has since been mapped inside it.
        let result = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len()) };
        if result < 0 {
            tracing::error!(
                base = ?self.base,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap guest memory"
            );
        }
    }
}

impl std::fmt::Debug for GuestMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestMemory")
            .field("base", &self.base)
            .field("size", &self.size)
            .field("owned", &self.owned)
            .finish()
    }
}
