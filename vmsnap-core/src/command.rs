// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Commands accepted by the snapshot controller.
//!
//! Two encodings feed the same enum: the device register protocol a guest
//! driver writes to, and a line-oriented text protocol for host tools.

use std::fmt;
use std::str::FromStr;

use crate::error::CommandParseError;

/// Offset of the control register; the value selects save/restore/unlink.
pub const CONTROL_REGISTER: u64 = 0x00;
/// Offset of the register that links the shared page at the written address.
pub const SHARED_ADDRESS_REGISTER: u64 = 0x10;

/// Control register value: take the snapshot.
pub const CMD_SAVE: u64 = 0x101;
/// Control register value: restore the snapshot.
pub const CMD_RESTORE: u64 = 0x102;
/// Control register value: unlink the shared page.
pub const CMD_UNLINK_SHARED: u64 = 0x202;

/// A single request to the snapshot controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Save,
    Restore,
    UnlinkShared,
    /// Unlink any current shared page, then link the page at this address.
    SetSharedAddress(u64),
}

impl Command {
    /// Decode a register write.
    ///
    /// Writes that do not name a command return `None` and are ignored.
    pub fn from_register(offset: u64, value: u64) -> Option<Self> {
        match (offset, value) {
            (CONTROL_REGISTER, CMD_SAVE) => Some(Self::Save),
            (CONTROL_REGISTER, CMD_RESTORE) => Some(Self::Restore),
            (CONTROL_REGISTER, CMD_UNLINK_SHARED) => Some(Self::UnlinkShared),
            (SHARED_ADDRESS_REGISTER, address) => Some(Self::SetSharedAddress(address)),
            _ => None,
        }
    }

    /// The register write that encodes this command.
    pub fn to_register(&self) -> (u64, u64) {
        match self {
            Self::Save => (CONTROL_REGISTER, CMD_SAVE),
            Self::Restore => (CONTROL_REGISTER, CMD_RESTORE),
            Self::UnlinkShared => (CONTROL_REGISTER, CMD_UNLINK_SHARED),
            Self::SetSharedAddress(address) => (SHARED_ADDRESS_REGISTER, *address),
        }
    }
}

fn parse_address(value: &str) -> Result<u64, CommandParseError> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };

    parsed.map_err(|e| CommandParseError::InvalidAddress {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let name = parts.next().ok_or(CommandParseError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "save" => Self::Save,
            "restore" => Self::Restore,
            "unlink" => Self::UnlinkShared,
            "link" => {
                let value = parts
                    .next()
                    .ok_or(CommandParseError::MissingAddress { command: "link" })?;
                Self::SetSharedAddress(parse_address(value)?)
            }
            _ => {
                return Err(CommandParseError::Unknown {
                    command: name.to_string(),
                })
            }
        };

        if let Some(extra) = parts.next() {
            return Err(CommandParseError::UnexpectedArgument {
                command: command.name(),
                argument: extra.to_string(),
            });
        }

        Ok(command)
    }
}

impl Command {
    /// Text-protocol name of the command.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Restore => "restore",
            Self::UnlinkShared => "unlink",
            Self::SetSharedAddress(_) => "link",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetSharedAddress(address) => write!(f, "link {:#x}", address),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// What a successfully executed command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Saved,
    /// Save was a no-op because a snapshot is already committed.
    AlreadySaved,
    Restored,
    Linked(u64),
    Unlinked,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved => write!(f, "saved"),
            Self::AlreadySaved => write!(f, "already-saved"),
            Self::Restored => write!(f, "restored"),
            Self::Linked(address) => write!(f, "linked {:#x}", address),
            Self::Unlinked => write!(f, "unlinked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_decoding() {
        assert_eq!(Command::from_register(0x00, 0x101), Some(Command::Save));
        assert_eq!(Command::from_register(0x00, 0x102), Some(Command::Restore));
        assert_eq!(Command::from_register(0x00, 0x202), Some(Command::UnlinkShared));
        assert_eq!(
            Command::from_register(0x10, 0x7000),
            Some(Command::SetSharedAddress(0x7000))
        );
    }

    #[test]
    fn test_unknown_register_writes_ignored() {
        assert_eq!(Command::from_register(0x00, 0x0), None);
        assert_eq!(Command::from_register(0x00, 0x201), None);
        assert_eq!(Command::from_register(0x08, 0x101), None);
    }

    #[test]
    fn test_to_register_matches_decoding() {
        for command in [
            Command::Save,
            Command::Restore,
            Command::UnlinkShared,
            Command::SetSharedAddress(0x3000),
        ] {
            let (offset, value) = command.to_register();
            assert_eq!(Command::from_register(offset, value), Some(command));
        }
    }

    #[test]
    fn test_parse_text_commands() {
        assert_eq!("save".parse::<Command>(), Ok(Command::Save));
        assert_eq!(" RESTORE ".parse::<Command>(), Ok(Command::Restore));
        assert_eq!("unlink".parse::<Command>(), Ok(Command::UnlinkShared));
        assert_eq!(
            "link 0x2000".parse::<Command>(),
            Ok(Command::SetSharedAddress(0x2000))
        );
        assert_eq!(
            "link 8192".parse::<Command>(),
            Ok(Command::SetSharedAddress(8192))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert!(matches!(
            "snapshot".parse::<Command>(),
            Err(CommandParseError::Unknown { .. })
        ));
        assert_eq!(
            "link".parse::<Command>(),
            Err(CommandParseError::MissingAddress { command: "link" })
        );
        assert!(matches!(
            "link 0xZZ".parse::<Command>(),
            Err(CommandParseError::InvalidAddress { .. })
        ));
        assert!(matches!(
            "save now".parse::<Command>(),
            Err(CommandParseError::UnexpectedArgument { command: "save", .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::SetSharedAddress(4096).to_string(), "link 0x1000");
        assert_eq!(Command::UnlinkShared.to_string(), "unlink");
        assert_eq!(CommandOutcome::Linked(0x1000).to_string(), "linked 0x1000");
        assert_eq!(CommandOutcome::AlreadySaved.to_string(), "already-saved");
    }
}
