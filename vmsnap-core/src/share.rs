// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared-page link - one guest page backed by a file another process maps.
//!
//! Linking copies the page's current bytes into a private anonymous page,
//! then maps the shared file over the guest page. Unlinking moves the saved
//! page back into place, so the guest sees exactly what it had before.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::LinkError;
use crate::guest::GuestMemory;
use crate::mapper::{AddressSpaceMapper, MapMode, Mapping};
use crate::types::{PageAddress, PAGE_SIZE};

/// A live link: the linked address and the bytes it replaced.
///
/// Keeping both in one value means one can never exist without the other.
#[derive(Debug)]
struct LinkedPage<M: AddressSpaceMapper> {
    address: PageAddress,
    saved_original: Mapping<M>,
}

/// Manager for the single shared page.
#[derive(Debug)]
pub struct SharedPageLink<M: AddressSpaceMapper> {
    path: PathBuf,
    mapper: M,
    linked: Option<LinkedPage<M>>,
}

impl<M: AddressSpaceMapper> SharedPageLink<M> {
    /// Create an unlinked manager for the shared file at `path`.
    pub fn new(path: impl Into<PathBuf>, mapper: M) -> Self {
        Self {
            path: path.into(),
            mapper,
            linked: None,
        }
    }

    /// Path of the shared file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Address of the linked page, if any.
    pub fn linked_address(&self) -> Option<PageAddress> {
        self.linked.as_ref().map(|linked| linked.address)
    }

    /// Whether a page is currently linked.
    pub fn is_linked(&self) -> bool {
        self.linked.is_some()
    }

    /// Open the shared file, creating it and sizing it to one page.
    ///
    /// Touches no mapping, so callers can surface an unusable shared file
    /// before doing anything destructive.
    pub fn open_file(&self) -> Result<File, LinkError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .custom_flags(libc::O_SYNC)
            .mode(0o666)
            .open(&self.path)
            .map_err(|source| LinkError::Io {
                path: self.path.clone(),
                context: "opening shared memory file",
                source,
            })?;

        file.set_len(PAGE_SIZE as u64).map_err(|source| LinkError::Io {
            path: self.path.clone(),
            context: "expanding shared memory file to page size",
            source,
        })?;

        Ok(file)
    }

    /// Back the guest page at `address` with the shared file.
    ///
    /// Fails with `AlreadyLinked` if a page is linked; callers unlink first.
    /// On any failure the guest page and the link state are unchanged.
    pub fn link(&mut self, guest: &mut GuestMemory, address: PageAddress) -> Result<(), LinkError> {
        if let Some(linked) = &self.linked {
            return Err(LinkError::AlreadyLinked {
                address: linked.address.value(),
            });
        }

        let file = self.open_file()?;
        self.link_file(guest, address, &file)
    }

    /// Like [`link`](Self::link), with a shared file from [`open_file`](Self::open_file).
    pub fn link_file(
        &mut self,
        guest: &mut GuestMemory,
        address: PageAddress,
        file: &File,
    ) -> Result<(), LinkError> {
        if let Some(linked) = &self.linked {
            return Err(LinkError::AlreadyLinked {
                address: linked.address.value(),
            });
        }

        let page = guest.page_ptr(address)?;

        // The copy must be taken before the shared mapping hides the page.
        let saved_original = Mapping::anonymous(&self.mapper, PAGE_SIZE)?;
        // SAFETY: both ranges are one live page; `&mut GuestMemory` excludes
        // other host references to the guest page.
        unsafe {
            std::ptr::copy_nonoverlapping(page.as_ptr(), saved_original.as_ptr().as_ptr(), PAGE_SIZE);
        }

        // SAFETY: page is page-aligned and inside guest memory. On failure
        // `saved_original` is dropped and unmapped.
        unsafe {
            self.mapper
                .map_file_at(page, PAGE_SIZE, file, MapMode::Shared)?;
        }

        self.linked = Some(LinkedPage {
            address,
            saved_original,
        });

        tracing::debug!(
            address = %address,
            path = %self.path.display(),
            "Linked shared page"
        );

        Ok(())
    }

    /// Put the original bytes back at the linked address. No-op if unlinked.
    ///
    /// On failure the link is kept as it was.
    pub fn unlink(&mut self, guest: &mut GuestMemory) -> Result<(), LinkError> {
        let Some(address) = self.linked_address() else {
            return Ok(());
        };
        let page = guest.page_ptr(address)?;

        let Some(linked) = self.linked.take() else {
            return Ok(());
        };

        // SAFETY: the saved page is a single anonymous mapping we own and the
        // destination is the linked guest page; MREMAP_FIXED drops the
        // shared mapping that was there.
        let moved = unsafe {
            self.mapper
                .move_mapping(linked.saved_original.as_ptr(), page, PAGE_SIZE)
        };

        if let Err(e) = moved {
            self.linked = Some(linked);
            return Err(e.into());
        }

        // The saved page now lives inside guest memory.
        linked.saved_original.disarm();

        tracing::debug!(address = %address, "Unlinked shared page");
        Ok(())
    }

    /// Forget the live link without putting the original bytes back.
    ///
    /// Only valid right before the whole guest region is remapped, which
    /// replaces the shared mapping anyway.
    pub fn discard(&mut self) {
        if let Some(linked) = self.linked.take() {
            tracing::trace!(address = %linked.address, "Discarded shared page link");
        }
    }
}
