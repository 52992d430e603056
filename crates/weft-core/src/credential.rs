//! Party credentials
//!
//! A credential is an assertion plus the signatures that authorize it.
//! Verification and the membership state machine live in
//! `weft-credentials`; this module only defines the data and its canonical
//! signing encoding.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{FeedKey, MemberKey, PartyKey, PublicKey};

/// ed25519 signature length
pub const SIGNATURE_LENGTH: usize = 64;

/// Assertion tags in the canonical encoding
const TAG_PARTY_GENESIS: u8 = 0x01;
const TAG_KEY_ADMIT: u8 = 0x02;
const TAG_FEED_ADMIT: u8 = 0x03;

/// What a credential claims
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Founds a party with its first member and that member's feed
    PartyGenesis {
        party_key: PartyKey,
        member_key: MemberKey,
        feed_key: FeedKey,
    },
    /// Admits a new member key
    KeyAdmit {
        party_key: PartyKey,
        admit_key: MemberKey,
    },
    /// Admits a feed owned by an existing member
    FeedAdmit {
        party_key: PartyKey,
        feed_key: FeedKey,
        owner: MemberKey,
    },
}

impl Assertion {
    pub fn party_key(&self) -> PartyKey {
        match self {
            Assertion::PartyGenesis { party_key, .. }
            | Assertion::KeyAdmit { party_key, .. }
            | Assertion::FeedAdmit { party_key, .. } => *party_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Assertion::PartyGenesis { .. } => "party_genesis",
            Assertion::KeyAdmit { .. } => "key_admit",
            Assertion::FeedAdmit { .. } => "feed_admit",
        }
    }

    /// Keys that must sign regardless of party state.
    ///
    /// Key admission additionally needs one existing member, which only the
    /// state machine can check.
    pub fn required_signers(&self) -> Vec<PublicKey> {
        match self {
            Assertion::PartyGenesis {
                party_key,
                member_key,
                feed_key,
            } => vec![*party_key, *member_key, *feed_key],
            Assertion::KeyAdmit { admit_key, .. } => vec![*admit_key],
            Assertion::FeedAdmit { feed_key, owner, .. } => vec![*feed_key, *owner],
        }
    }

    /// Canonical bytes covered by signatures: tag followed by keys
    pub fn signing_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + 3 * 32);
        match self {
            Assertion::PartyGenesis {
                party_key,
                member_key,
                feed_key,
            } => {
                buf.put_u8(TAG_PARTY_GENESIS);
                buf.put_slice(party_key.as_bytes());
                buf.put_slice(member_key.as_bytes());
                buf.put_slice(feed_key.as_bytes());
            }
            Assertion::KeyAdmit {
                party_key,
                admit_key,
            } => {
                buf.put_u8(TAG_KEY_ADMIT);
                buf.put_slice(party_key.as_bytes());
                buf.put_slice(admit_key.as_bytes());
            }
            Assertion::FeedAdmit {
                party_key,
                feed_key,
                owner,
            } => {
                buf.put_u8(TAG_FEED_ADMIT);
                buf.put_slice(party_key.as_bytes());
                buf.put_slice(feed_key.as_bytes());
                buf.put_slice(owner.as_bytes());
            }
        }
        buf.freeze()
    }
}

/// Raw ed25519 signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LENGTH]);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({})", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        let bytes: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| de::Error::custom("signature must be 64 bytes"))?;
        Ok(Signature(bytes))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub signer: PublicKey,
    pub signature: Signature,
}

/// Signed assertion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub assertion: Assertion,
    pub signatures: Vec<KeySignature>,
}

impl Credential {
    pub fn signers(&self) -> impl Iterator<Item = &PublicKey> {
        self.signatures.iter().map(|s| &s.signer)
    }

    pub fn is_signed_by(&self, key: &PublicKey) -> bool {
        self.signers().any(|k| k == key)
    }
}
