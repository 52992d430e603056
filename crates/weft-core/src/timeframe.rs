//! Timeframes - per-feed replication progress
//!
//! A timeframe maps each feed to the highest sequence number seen from it.
//! Like a version vector it gives causal (not total) ordering between
//! replicas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::FeedKey;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    frames: BTreeMap<FeedKey, u64>,
}

impl Timeframe {
    pub fn new() -> Self {
        Timeframe {
            frames: BTreeMap::new(),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (FeedKey, u64)>) -> Self {
        Timeframe {
            frames: entries.into_iter().collect(),
        }
    }

    /// Sequence number recorded for a feed
    #[inline]
    pub fn get(&self, feed: &FeedKey) -> Option<u64> {
        self.frames.get(feed).copied()
    }

    /// Record a sequence number, keeping the maximum
    pub fn advance(&mut self, feed: FeedKey, seq: u64) {
        self.frames
            .entry(feed)
            .and_modify(|s| *s = (*s).max(seq))
            .or_insert(seq);
    }

    /// Element-wise maximum of two timeframes
    pub fn merge(&self, other: &Timeframe) -> Timeframe {
        let mut merged = self.clone();
        for (feed, &seq) in &other.frames {
            merged.advance(*feed, seq);
        }
        merged
    }

    /// True if every feed in `other` is covered by `self`
    pub fn dominates(&self, other: &Timeframe) -> bool {
        other
            .frames
            .iter()
            .all(|(feed, &seq)| self.get(feed).is_some_and(|s| s >= seq))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeedKey, &u64)> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
