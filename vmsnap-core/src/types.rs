// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Sizes and addresses arrive as raw `u64`s from the control surface.
//! These types validate their invariants at creation time so the mapping
//! code never sees a misaligned or out-of-range value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, LinkError};

/// Size of the shared page, and the granularity of every mapping.
pub const PAGE_SIZE: usize = 0x1000;

/// Smallest guest we accept: a single page.
const MIN_GUEST_SIZE: u64 = PAGE_SIZE as u64;
/// Largest guest we accept: 256 GB.
const MAX_GUEST_SIZE: u64 = 256 * 1024 * 1024 * 1024;

/// Validated guest memory size in bytes.
/// Must be a non-zero multiple of [`PAGE_SIZE`] and at most 256 GB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct GuestSize(u64);

impl GuestSize {
    /// Create a new GuestSize with bounds and alignment validation.
    pub fn new(bytes: u64) -> Result<Self, HardValidationError> {
        if !(MIN_GUEST_SIZE..=MAX_GUEST_SIZE).contains(&bytes) {
            return Err(HardValidationError::GuestSizeOutOfBounds {
                size_bytes: bytes,
                min: MIN_GUEST_SIZE,
                max: MAX_GUEST_SIZE,
            });
        }

        if bytes % PAGE_SIZE as u64 != 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "guest_size",
                value: bytes.to_string(),
                reason: format!("Must be a multiple of the {} byte page size", PAGE_SIZE),
            });
        }

        Ok(Self(bytes))
    }

    /// Create from megabytes for convenience.
    pub fn from_mb(mb: u64) -> Result<Self, HardValidationError> {
        Self::new(mb.saturating_mul(1024 * 1024))
    }

    /// Get the size in bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Get the size as a host length.
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Number of pages covered.
    pub fn pages(&self) -> u64 {
        self.0 / PAGE_SIZE as u64
    }
}

impl fmt::Display for GuestSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % (1024 * 1024) == 0 {
            write!(f, "{}MB", self.0 / (1024 * 1024))
        } else {
            write!(f, "{}KB", self.0 / 1024)
        }
    }
}

impl TryFrom<u64> for GuestSize {
    type Error = HardValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GuestSize> for u64 {
    fn from(size: GuestSize) -> Self {
        size.0
    }
}

/// A page-aligned offset into guest memory, validated against its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageAddress(u64);

impl PageAddress {
    /// Validate `address` as the start of a page inside `guest_size` bytes.
    pub fn new(address: u64, guest_size: u64) -> Result<Self, LinkError> {
        if address % PAGE_SIZE as u64 != 0 {
            return Err(LinkError::OutOfBounds {
                address,
                guest_size,
                reason: "not page-aligned",
            });
        }

        // The whole page must fit; guest sizes are page multiples so this
        // reduces to `address < guest_size`.
        match address.checked_add(PAGE_SIZE as u64) {
            Some(end) if end <= guest_size => Ok(Self(address)),
            _ => Err(LinkError::OutOfBounds {
                address,
                guest_size,
                reason: "beyond end of guest memory",
            }),
        }
    }

    /// Get the raw offset.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Get the offset as a host length.
    pub fn offset(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<PageAddress> for u64 {
    fn from(address: PageAddress) -> Self {
        address.0
    }
}
