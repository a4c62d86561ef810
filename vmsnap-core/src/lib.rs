// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! vmsnap Core Library
//!
//! Memory snapshot and restore for a VM guest address space, plus a single
//! guest page linked to a file that an external process maps.
//! Provides the address-space mapper, backing store, shared-page link,
//! snapshot controller, command decoding and configuration parsing.

pub mod backing;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod guest;
pub mod mapper;
pub mod service;
pub mod share;
pub mod state;
pub mod state_adapter;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use backing::BackingStore;
pub use command::{Command, CommandOutcome};
pub use config::{Config, ConfigLoader, SnapshotPaths};
pub use controller::{SaveOutcome, SnapshotController};
pub use error::{ErrorKind, SnapshotError, VmSnapError, VmSnapResult};
pub use guest::GuestMemory;
pub use mapper::{AddressSpaceMapper, LinuxMapper, MapMode};
pub use service::SnapshotService;
pub use share::SharedPageLink;
pub use state::{SnapshotPhase, SnapshotStateMachine};
pub use state_adapter::{NonMemoryBlob, NonMemoryState, NullState};
pub use stats::SnapshotStats;
pub use types::{GuestSize, PageAddress, PAGE_SIZE};
