//! Party snapshots
//!
//! The snapshot is the ordered credential log. Restoring replays it through
//! a fresh state machine, so accepted and rejected credentials alike are
//! kept to reproduce the exact log.

use serde::{Deserialize, Serialize};

use weft_core::{Credential, FeedKey};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub message: Credential,
    /// Feed the credential was read from
    pub feed_key: FeedKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub messages: Vec<SnapshotEntry>,
}

impl PartySnapshot {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
