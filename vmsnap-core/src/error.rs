// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for vmsnap.
//!
//! Every concern gets its own explicit enum; the controller surfaces them
//! through [`SnapshotError`] and the binary through [`VmSnapError`].
//! No `Box<dyn Error>`, no `anyhow::Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for vmsnap.
#[derive(Debug, Error)]
pub enum VmSnapError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Snapshot Errors
    // =========================================================================
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject a configuration before anything is mapped.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Guest memory size out of bounds: {size_bytes} bytes (min: {min}, max: {max})")]
    GuestSizeOutOfBounds { size_bytes: u64, min: u64, max: u64 },

    #[error("Shared address rejected: {0}")]
    SharedAddress(#[from] LinkError),
}

/// Failures of the raw virtual-memory operations.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("Failed to map {len:#x} bytes at {addr:#x}: {reason}")]
    MapFailed {
        addr: usize,
        len: usize,
        reason: String,
    },

    #[error("Failed to unmap {len:#x} bytes at {addr:#x}: {reason}")]
    UnmapFailed {
        addr: usize,
        len: usize,
        reason: String,
    },

    #[error("Failed to move {len:#x} bytes from {src:#x} to {dst:#x}: {reason}")]
    MoveFailed {
        src: usize,
        dst: usize,
        len: usize,
        reason: String,
    },

    #[error("Failed to flush {len:#x} bytes at {addr:#x}: {reason}")]
    FlushFailed {
        addr: usize,
        len: usize,
        reason: String,
    },

    #[error("Invalid mapping length: {len}")]
    InvalidLength { len: usize },
}

/// State transition errors for the snapshot state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition snapshot from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Host-side access outside guest memory.
#[derive(Debug, Error)]
#[error("Guest access of {len} bytes at {offset:#x} exceeds {size:#x} bytes of guest memory")]
pub struct GuestAccessError {
    pub offset: usize,
    pub len: usize,
    pub size: usize,
}

/// Shared-page link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Shared page address {address:#x} is out of bounds for {guest_size:#x} bytes of guest memory: {reason}")]
    OutOfBounds {
        address: u64,
        guest_size: u64,
        reason: &'static str,
    },

    #[error("A shared page is already linked at {address:#x}")]
    AlreadyLinked { address: u64 },

    #[error("Shared file {path}: {context} - {source}")]
    Io {
        path: PathBuf,
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Shared page mapping failed: {0}")]
    Map(#[from] MapError),
}

/// Backing store errors.
#[derive(Debug, Error)]
pub enum BackingStoreError {
    #[error("Backing file {path}: {context} - {source}")]
    Io {
        path: PathBuf,
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Backing file {path} holds {actual} bytes, guest memory is {expected} bytes")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Backing file mapping failed: {0}")]
    Map(#[from] MapError),
}

/// Errors raised by the CPU/device state collaborator.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to capture CPU/device state: {reason}")]
    CaptureFailed { reason: String },

    #[error("Failed to apply CPU/device state: {reason}")]
    ApplyFailed { reason: String },

    #[error("State blob checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Errors returned by the snapshot controller to its dispatcher.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Restore requested but no snapshot has been saved")]
    NotSaved,

    #[error("Shared page: {0}")]
    Link(#[from] LinkError),

    #[error("Backing store: {0}")]
    Backing(#[from] BackingStoreError),

    #[error("Non-memory state: {0}")]
    State(#[from] StateError),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] StateTransitionError),

    #[error("Snapshot controller lock poisoned by a panicking caller")]
    Poisoned,
}

/// Errors parsing a text-protocol command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {command}")]
    Unknown { command: String },

    #[error("Command '{command}' requires an address argument")]
    MissingAddress { command: &'static str },

    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Unexpected argument '{argument}' for '{command}'")]
    UnexpectedArgument {
        command: &'static str,
        argument: String,
    },
}

/// Coarse classification of a [`SnapshotError`] for dispatchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OutOfBounds,
    IoFailure,
    NotSaved,
    AlreadyLinked,
    StateFailure,
    InvalidState,
    Poisoned,
}

impl SnapshotError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSaved => ErrorKind::NotSaved,
            Self::Link(LinkError::OutOfBounds { .. }) => ErrorKind::OutOfBounds,
            Self::Link(LinkError::AlreadyLinked { .. }) => ErrorKind::AlreadyLinked,
            Self::Link(_) | Self::Backing(_) => ErrorKind::IoFailure,
            Self::State(_) => ErrorKind::StateFailure,
            Self::InvalidTransition(_) => ErrorKind::InvalidState,
            Self::Poisoned => ErrorKind::Poisoned,
        }
    }
}

/// Result type alias using VmSnapError.
pub type VmSnapResult<T> = Result<T, VmSnapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::MissingRequiredField {
            field: "backing_file",
            context: "snapshot section".to_string(),
        };
        assert!(err.to_string().contains("backing_file"));
        assert!(err.to_string().contains("snapshot section"));
    }

    #[test]
    fn test_error_chain() {
        let snap_err: SnapshotError = LinkError::AlreadyLinked { address: 0x1000 }.into();
        let top: VmSnapError = snap_err.into();
        assert!(matches!(
            top,
            VmSnapError::Snapshot(SnapshotError::Link(LinkError::AlreadyLinked { .. }))
        ));
    }

    #[test]
    fn test_error_kind_classification() {
        let out_of_bounds: SnapshotError = LinkError::OutOfBounds {
            address: 0x1001,
            guest_size: 0x10000,
            reason: "not page-aligned",
        }
        .into();
        assert_eq!(out_of_bounds.kind(), ErrorKind::OutOfBounds);

        let io: SnapshotError = BackingStoreError::SizeMismatch {
            path: PathBuf::from("/dev/shm/snapshot0"),
            expected: 4096,
            actual: 0,
        }
        .into();
        assert_eq!(io.kind(), ErrorKind::IoFailure);

        let map: SnapshotError = LinkError::Map(MapError::InvalidLength { len: 0 }).into();
        assert_eq!(map.kind(), ErrorKind::IoFailure);

        assert_eq!(SnapshotError::NotSaved.kind(), ErrorKind::NotSaved);
        assert_eq!(
            SnapshotError::from(StateError::CaptureFailed {
                reason: "vcpu busy".to_string()
            })
            .kind(),
            ErrorKind::StateFailure
        );
    }

    #[test]
    fn test_out_of_bounds_display_is_hex() {
        let err = LinkError::OutOfBounds {
            address: 0x2000,
            guest_size: 0x2000,
            reason: "beyond end of guest memory",
        };
        let msg = err.to_string();
        assert!(msg.contains("0x2000"));
        assert!(msg.contains("beyond end"));
    }
}
