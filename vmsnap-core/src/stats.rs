// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use serde::{Deserialize, Serialize};

use crate::state::SnapshotPhase;

/// Point-in-time view of a snapshot controller.
/// Serialized as JSON by the command server's `stats` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub phase: SnapshotPhase,
    pub guest_size: u64,
    pub restore_count: u64,
    pub last_save_us: Option<u64>,
    pub last_restore_us: Option<u64>,
    /// Address the controller re-links after every remap.
    pub shared_address: Option<u64>,
    /// Address actually linked right now.
    pub linked_address: Option<u64>,
    pub state_blob_bytes: Option<usize>,
}

impl SnapshotStats {
    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_json() {
        let stats = SnapshotStats {
            phase: SnapshotPhase::Saved,
            guest_size: 4096,
            restore_count: 2,
            last_save_us: Some(120),
            last_restore_us: Some(15),
            shared_address: Some(0),
            linked_address: Some(0),
            state_blob_bytes: Some(0),
        };

        let json = stats.to_json().unwrap();
        assert!(json.contains(r#""phase":"Saved""#));
        assert!(json.contains(r#""restore_count":2"#));

        let back: SnapshotStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
