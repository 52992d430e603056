//! Identity types for Weft
//!
//! Keys are raw 32-byte ed25519 public keys. Feeds, members and parties are
//! all addressed by public key; peers in the gossip mesh use a separate
//! fixed-length identifier so the two namespaces never mix.

use std::fmt;

use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{WeftError, WeftResult};

/// Length in bytes of every key and peer identifier
pub const KEY_LENGTH: usize = 32;

/// ed25519 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey(pub [u8; KEY_LENGTH]);

/// Key of an append-only feed
pub type FeedKey = PublicKey;

/// Identity key of a party member
pub type MemberKey = PublicKey;

/// Root key of a party
pub type PartyKey = PublicKey;

impl PublicKey {
    #[inline]
    pub fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        PublicKey(bytes)
    }

    /// Build a key from an untyped slice, rejecting anything not 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> WeftResult<Self> {
        let bytes: [u8; KEY_LENGTH] =
            bytes.try_into().map_err(|_| WeftError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(PublicKey(bytes))
    }

    pub fn from_hex(s: &str) -> WeftResult<Self> {
        let bytes = hex::decode(s).map_err(|e| WeftError::InvalidEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Peer identity in the gossip mesh
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(pub [u8; KEY_LENGTH]);

impl PeerId {
    #[inline]
    pub fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        PeerId(bytes)
    }

    /// Generate a random peer id
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        PeerId(bytes)
    }

    /// Build a peer id from wire bytes.
    ///
    /// Peer ids are fixed-length; any other length is rejected.
    pub fn from_slice(bytes: &[u8]) -> WeftResult<Self> {
        let bytes: [u8; KEY_LENGTH] =
            bytes.try_into().map_err(|_| WeftError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(PeerId(bytes))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<PublicKey> for PeerId {
    fn from(key: PublicKey) -> Self {
        PeerId(key.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Item identity - unique within a party
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    /// Random 128-bit id, hex encoded
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        ItemId(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}
