// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Backing and shared file paths are configuration, injected into each
//! controller, so independent controllers can coexist. Any invalid field
//! results in a HardValidationError before guest memory is touched.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HardValidationError, VmSnapError, VmSnapResult};
use crate::types::{GuestSize, PageAddress};

/// Raw snapshot section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawSnapshotConfig {
    #[serde(default = "default_backing_file")]
    backing_file: String,
    #[serde(default = "default_shared_file")]
    shared_file: String,
}

fn default_backing_file() -> String {
    "/dev/shm/snapshot0".to_string()
}

fn default_shared_file() -> String {
    "/dev/shm/snapshot_data".to_string()
}

impl Default for RawSnapshotConfig {
    fn default() -> Self {
        Self {
            backing_file: default_backing_file(),
            shared_file: default_shared_file(),
        }
    }
}

/// Raw guest section.
#[derive(Debug, Deserialize)]
struct RawGuestConfig {
    #[serde(default = "default_memory_mb")]
    memory_mb: u64,
    #[serde(default)]
    shared_address: Option<u64>,
}

fn default_memory_mb() -> u64 {
    64
}

impl Default for RawGuestConfig {
    fn default() -> Self {
        Self {
            memory_mb: default_memory_mb(),
            shared_address: None,
        }
    }
}

/// Raw server section.
#[derive(Debug, Deserialize)]
struct RawServerConfig {
    #[serde(default = "default_socket_path")]
    socket_path: String,
}

fn default_socket_path() -> String {
    "/tmp/vmsnap.sock".to_string()
}

impl Default for RawServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    snapshot: RawSnapshotConfig,
    #[serde(default)]
    guest: RawGuestConfig,
    #[serde(default)]
    server: RawServerConfig,
}

/// Where a controller keeps its snapshot and shared page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    /// Full copy of guest memory, written by save.
    pub backing_file: PathBuf,
    /// One page shared with the external process.
    pub shared_file: PathBuf,
}

impl SnapshotPaths {
    /// Paths rooted in `dir`, using the default file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            backing_file: dir.join("snapshot0"),
            shared_file: dir.join("snapshot_data"),
        }
    }
}

impl Default for SnapshotPaths {
    fn default() -> Self {
        Self {
            backing_file: PathBuf::from(default_backing_file()),
            shared_file: PathBuf::from(default_shared_file()),
        }
    }
}

/// Validated guest configuration.
#[derive(Debug, Clone)]
pub struct GuestConfig {
    pub memory: GuestSize,
    /// Page to link as soon as the guest is created.
    pub shared_address: Option<PageAddress>,
}

/// Validated command server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot: SnapshotPaths,
    pub guest: GuestConfig,
    pub server: ServerConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> VmSnapResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(VmSnapError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| VmSnapError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> VmSnapResult<Config> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| VmSnapError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> VmSnapResult<Config> {
        let snapshot = Self::validate_snapshot(raw.snapshot)?;
        let guest = Self::validate_guest(raw.guest)?;
        let server = Self::validate_server(raw.server)?;

        Ok(Config {
            snapshot,
            guest,
            server,
        })
    }

    fn validate_file_path(field: &'static str, value: &str) -> Result<PathBuf, HardValidationError> {
        if value.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field,
                context: "snapshot".to_string(),
            });
        }

        let path = PathBuf::from(value);
        if path.file_name().is_none() {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: value.to_string(),
                reason: "Must name a file, not a directory".to_string(),
            });
        }

        Ok(path)
    }

    fn validate_snapshot(raw: RawSnapshotConfig) -> VmSnapResult<SnapshotPaths> {
        let backing_file = Self::validate_file_path("backing_file", &raw.backing_file)?;
        let shared_file = Self::validate_file_path("shared_file", &raw.shared_file)?;

        if backing_file == shared_file {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shared_file",
                value: raw.shared_file,
                reason: "Shared file must differ from the backing file".to_string(),
            }
            .into());
        }

        Ok(SnapshotPaths {
            backing_file,
            shared_file,
        })
    }

    fn validate_guest(raw: RawGuestConfig) -> VmSnapResult<GuestConfig> {
        let memory = GuestSize::from_mb(raw.memory_mb).map_err(|e| {
            HardValidationError::InvalidFieldValue {
                field: "memory_mb",
                value: raw.memory_mb.to_string(),
                reason: e.to_string(),
            }
        })?;

        let shared_address = raw
            .shared_address
            .map(|address| PageAddress::new(address, memory.bytes()))
            .transpose()
            .map_err(HardValidationError::from)?;

        Ok(GuestConfig {
            memory,
            shared_address,
        })
    }

    fn validate_server(raw: RawServerConfig) -> VmSnapResult<ServerConfig> {
        if raw.socket_path.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "socket_path",
                context: "server".to_string(),
            }
            .into());
        }

        Ok(ServerConfig {
            socket_path: PathBuf::from(raw.socket_path),
        })
    }
}
