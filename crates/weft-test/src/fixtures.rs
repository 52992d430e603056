//! Party and feed fixtures

use std::sync::Arc;

use bytes::Bytes;

use weft_core::{ApplicationEnvelope, Credential, FeedBlock, FeedKey, FeedMessage, ItemId, PartyKey};
use weft_credentials::{feed_admit, key_admit, party_genesis, CredentialProcessor, Keypair};

/// Append-only writer producing consecutive blocks for one feed
#[derive(Debug)]
pub struct FeedWriter {
    keypair: Keypair,
    next_seq: u64,
}

impl FeedWriter {
    pub fn new(keypair: Keypair) -> Self {
        FeedWriter {
            keypair,
            next_seq: 0,
        }
    }

    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }

    pub fn key(&self) -> FeedKey {
        self.keypair.public_key()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn append(&mut self, data: FeedMessage) -> FeedBlock {
        let block = FeedBlock {
            key: self.key(),
            seq: self.next_seq,
            data,
        };
        self.next_seq += 1;
        block
    }

    pub fn credential(&mut self, credential: Credential) -> FeedBlock {
        self.append(FeedMessage::membership(credential))
    }

    pub fn genesis(&mut self, item_id: &ItemId, model_type: &str) -> FeedBlock {
        self.append(FeedMessage::application(ApplicationEnvelope::genesis(
            item_id.clone(),
            model_type,
        )))
    }

    pub fn mutation(&mut self, item_id: &ItemId, payload: Bytes) -> FeedBlock {
        self.append(FeedMessage::application(ApplicationEnvelope::mutation(
            item_id.clone(),
            payload,
        )))
    }
}

/// A party with its founding member and that member's feed
#[derive(Debug)]
pub struct TestParty {
    pub party: Keypair,
    pub founder: Keypair,
    pub feed: FeedWriter,
}

impl TestParty {
    pub fn new() -> Self {
        TestParty {
            party: Keypair::generate(),
            founder: Keypair::generate(),
            feed: FeedWriter::generate(),
        }
    }

    pub fn key(&self) -> PartyKey {
        self.party.public_key()
    }

    pub fn processor(&self) -> Arc<CredentialProcessor> {
        Arc::new(CredentialProcessor::new(self.key()))
    }

    /// Genesis credential, written as the next block of the founder's feed
    pub fn genesis_block(&mut self) -> FeedBlock {
        let credential = party_genesis(&self.party, &self.founder, self.feed.keypair());
        self.feed.credential(credential)
    }

    /// Admit `member`, written to the founder's feed
    pub fn admit_member(&mut self, member: &Keypair) -> FeedBlock {
        let credential = key_admit(self.key(), member, &self.founder);
        self.feed.credential(credential)
    }

    /// Admit `feed` as owned by `owner`, written to the founder's feed
    pub fn admit_feed(&mut self, feed: &FeedWriter, owner: &Keypair) -> FeedBlock {
        let credential = feed_admit(self.key(), feed.keypair(), owner);
        self.feed.credential(credential)
    }
}

impl Default for TestParty {
    fn default() -> Self {
        Self::new()
    }
}
