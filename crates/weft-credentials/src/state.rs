//! Party state machine
//!
//! Validates credentials against the current membership and applies the
//! admissions they carry. The machine is either uninitialized (no genesis
//! yet) or live; a live party never terminates.

use std::collections::BTreeMap;

use thiserror::Error;

use weft_core::{Assertion, Credential, FeedKey, MemberKey, PartyKey, PublicKey};

use crate::verify;

/// Admitted member
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberInfo {
    pub key: MemberKey,
    /// Member (or, for the founder, the party key) that vouched for this one
    pub admitted_by: PublicKey,
}

/// Admitted feed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedInfo {
    pub feed_key: FeedKey,
    /// Identity key the feed writes on behalf of
    pub owner: MemberKey,
    pub admitted_by: PublicKey,
}

/// State change produced by an accepted credential
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Genesis { member: MemberInfo, feed: FeedInfo },
    Member(MemberInfo),
    Feed(FeedInfo),
}

/// Why a credential was refused
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    #[error("invalid signature by {0}")]
    InvalidSignature(PublicKey),

    #[error("missing signature by {0}")]
    MissingSignature(PublicKey),

    #[error("credential for party {actual}, expected {expected}")]
    WrongParty {
        expected: PartyKey,
        actual: PartyKey,
    },

    #[error("party genesis already processed")]
    GenesisAlreadyProcessed,

    #[error("party genesis required before admissions")]
    GenesisRequired,

    #[error("key already admitted: {0}")]
    AlreadyAdmitted(PublicKey),

    #[error("not a party member: {0}")]
    NotAMember(MemberKey),

    #[error("no admitted member signed the admission")]
    NoAdmittingMember,
}

/// Membership state of one party
#[derive(Clone, Debug)]
pub struct PartyState {
    party_key: PartyKey,
    genesis_processed: bool,
    members: BTreeMap<MemberKey, MemberInfo>,
    feeds: BTreeMap<FeedKey, FeedInfo>,
}

impl PartyState {
    pub fn new(party_key: PartyKey) -> Self {
        PartyState {
            party_key,
            genesis_processed: false,
            members: BTreeMap::new(),
            feeds: BTreeMap::new(),
        }
    }

    pub fn party_key(&self) -> PartyKey {
        self.party_key
    }

    pub fn genesis_processed(&self) -> bool {
        self.genesis_processed
    }

    pub fn member(&self, key: &MemberKey) -> Option<&MemberInfo> {
        self.members.get(key)
    }

    pub fn feed(&self, key: &FeedKey) -> Option<&FeedInfo> {
        self.feeds.get(key)
    }

    pub fn member_keys(&self) -> Vec<MemberKey> {
        self.members.keys().copied().collect()
    }

    pub fn feed_keys(&self) -> Vec<FeedKey> {
        self.feeds.keys().copied().collect()
    }

    /// Validate a credential and apply it.
    ///
    /// A rejected credential leaves the state untouched.
    pub fn process(&mut self, credential: &Credential) -> Result<Admission, RejectReason> {
        Self::check_signatures(credential)?;

        let assertion = &credential.assertion;
        if assertion.party_key() != self.party_key {
            return Err(RejectReason::WrongParty {
                expected: self.party_key,
                actual: assertion.party_key(),
            });
        }

        match *assertion {
            Assertion::PartyGenesis {
                party_key,
                member_key,
                feed_key,
            } => {
                if self.genesis_processed {
                    return Err(RejectReason::GenesisAlreadyProcessed);
                }

                let member = MemberInfo {
                    key: member_key,
                    admitted_by: party_key,
                };
                let feed = FeedInfo {
                    feed_key,
                    owner: member_key,
                    admitted_by: member_key,
                };
                self.members.insert(member_key, member);
                self.feeds.insert(feed_key, feed);
                self.genesis_processed = true;
                Ok(Admission::Genesis { member, feed })
            }
            Assertion::KeyAdmit { admit_key, .. } => {
                self.require_genesis()?;
                if self.members.contains_key(&admit_key) {
                    return Err(RejectReason::AlreadyAdmitted(admit_key));
                }

                let admitted_by = credential
                    .signers()
                    .find(|k| **k != admit_key && self.members.contains_key(k))
                    .copied()
                    .ok_or(RejectReason::NoAdmittingMember)?;

                let member = MemberInfo {
                    key: admit_key,
                    admitted_by,
                };
                self.members.insert(admit_key, member);
                Ok(Admission::Member(member))
            }
            Assertion::FeedAdmit {
                feed_key, owner, ..
            } => {
                self.require_genesis()?;
                if self.feeds.contains_key(&feed_key) {
                    return Err(RejectReason::AlreadyAdmitted(feed_key));
                }
                if !self.members.contains_key(&owner) {
                    return Err(RejectReason::NotAMember(owner));
                }

                let feed = FeedInfo {
                    feed_key,
                    owner,
                    admitted_by: owner,
                };
                self.feeds.insert(feed_key, feed);
                Ok(Admission::Feed(feed))
            }
        }
    }

    fn require_genesis(&self) -> Result<(), RejectReason> {
        if self.genesis_processed {
            Ok(())
        } else {
            Err(RejectReason::GenesisRequired)
        }
    }

    fn check_signatures(credential: &Credential) -> Result<(), RejectReason> {
        let message = credential.assertion.signing_bytes();
        for sig in &credential.signatures {
            if !verify(&sig.signer, &message, &sig.signature) {
                return Err(RejectReason::InvalidSignature(sig.signer));
            }
        }

        for required in credential.assertion.required_signers() {
            if !credential.is_signed_by(&required) {
                return Err(RejectReason::MissingSignature(required));
            }
        }
        Ok(())
    }
}
