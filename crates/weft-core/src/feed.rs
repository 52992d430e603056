//! Feed blocks and the messages derived from them
//!
//! A feed block carries exactly one of two payloads: a membership envelope
//! (a party credential) or an application envelope (item data). The pipeline
//! splits blocks into [`MembershipMessage`]s and [`ApplicationMessage`]s.

use bytes::Bytes;

use crate::{Credential, FeedKey, ItemId, MemberKey, Timeframe};

/// One block read from a feed
#[derive(Clone, Debug)]
pub struct FeedBlock {
    /// Key of the feed the block was read from
    pub key: FeedKey,
    /// Position of the block in its feed
    pub seq: u64,
    pub data: FeedMessage,
}

/// Block payload. Exactly one field is expected to be set.
#[derive(Clone, Debug, Default)]
pub struct FeedMessage {
    pub membership: Option<MembershipEnvelope>,
    pub application: Option<ApplicationEnvelope>,
}

impl FeedMessage {
    pub fn membership(credential: Credential) -> Self {
        FeedMessage {
            membership: Some(MembershipEnvelope { credential }),
            application: None,
        }
    }

    pub fn application(envelope: ApplicationEnvelope) -> Self {
        FeedMessage {
            membership: None,
            application: Some(envelope),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MembershipEnvelope {
    pub credential: Credential,
}

/// Item creation request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemGenesis {
    /// Registered model type of the new item
    pub model_type: String,
}

/// Application payload addressed to an item
#[derive(Clone, Debug, Default)]
pub struct ApplicationEnvelope {
    /// Target item; envelopes without one are not routed
    pub item_id: Option<ItemId>,
    /// Writer's view of the party when the envelope was authored
    pub timeframe: Timeframe,
    pub genesis: Option<ItemGenesis>,
    /// Encoded model mutation
    pub mutation: Option<Bytes>,
}

impl ApplicationEnvelope {
    pub fn genesis(item_id: ItemId, model_type: impl Into<String>) -> Self {
        ApplicationEnvelope {
            item_id: Some(item_id),
            timeframe: Timeframe::new(),
            genesis: Some(ItemGenesis {
                model_type: model_type.into(),
            }),
            mutation: None,
        }
    }

    pub fn mutation(item_id: ItemId, mutation: Bytes) -> Self {
        ApplicationEnvelope {
            item_id: Some(item_id),
            timeframe: Timeframe::new(),
            genesis: None,
            mutation: Some(mutation),
        }
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }
}

/// Position of a block in its feed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeedMeta {
    pub feed_key: FeedKey,
    pub seq: u64,
}

/// Credential extracted from a feed block
#[derive(Clone, Debug)]
pub struct MembershipMessage {
    pub meta: FeedMeta,
    pub credential: Credential,
}

/// Metadata attached to an attributed application message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationMeta {
    pub seq: u64,
    pub feed_key: FeedKey,
    /// Member that admitted the source feed
    pub member_key: MemberKey,
    pub timeframe: Timeframe,
}

/// Application payload attributed to its admitting member
#[derive(Clone, Debug)]
pub struct ApplicationMessage {
    pub meta: ApplicationMeta,
    pub data: ApplicationEnvelope,
}
