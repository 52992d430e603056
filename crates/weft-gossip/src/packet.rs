//! Gossip packet wire format
//!
//! Layout (little endian):
//! - Byte 0: version
//! - seqno: u32 length + bytes
//! - origin: u8 length (0 or 32) + bytes
//! - from: u8 length (0 or 32) + bytes
//! - data: u32 length + bytes
//!
//! A zero-length seqno, origin or from encodes a missing field. The codec
//! carries such packets; the broadcaster drops them on receipt.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use weft_core::{PeerId, KEY_LENGTH};

/// Current packet version
pub const PACKET_VERSION: u8 = 1;

/// Length of a generated seqno
pub const SEQNO_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet truncated: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unsupported packet version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid peer id length: {0}")]
    InvalidPeerId(usize),

    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

/// One flooded message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipPacket {
    /// Unique per origin
    pub seqno: Bytes,
    /// Peer that published the message
    pub origin: Option<PeerId>,
    /// Last hop
    pub from: Option<PeerId>,
    pub data: Bytes,
}

impl GossipPacket {
    pub fn new(seqno: Bytes, origin: PeerId, data: Bytes) -> Self {
        GossipPacket {
            seqno,
            origin: Some(origin),
            from: None,
            data,
        }
    }

    /// Random seqno for a fresh publication
    pub fn random_seqno() -> Bytes {
        let mut seqno = [0u8; SEQNO_LENGTH];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut seqno);
        Bytes::copy_from_slice(&seqno)
    }

    /// True when seqno, origin and from are all present
    pub fn is_complete(&self) -> bool {
        !self.seqno.is_empty() && self.origin.is_some() && self.from.is_some()
    }

    pub fn encoded_len(&self) -> usize {
        let peer_len = |p: &Option<PeerId>| if p.is_some() { KEY_LENGTH } else { 0 };
        1 + 4 + self.seqno.len() + 1 + peer_len(&self.origin) + 1 + peer_len(&self.from) + 4 + self.data.len()
    }

    pub fn encode(&self) -> Bytes {
        debug_assert!(u32::try_from(self.seqno.len()).is_ok() && u32::try_from(self.data.len()).is_ok());
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(PACKET_VERSION);
        buf.put_u32_le(self.seqno.len() as u32);
        buf.put_slice(&self.seqno);
        put_peer(&mut buf, self.origin.as_ref());
        put_peer(&mut buf, self.from.as_ref());
        buf.put_u32_le(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, PacketError> {
        need(buf, 1)?;
        let version = buf.get_u8();
        if version != PACKET_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }

        need(buf, 4)?;
        let seqno_len = buf.get_u32_le() as usize;
        need(buf, seqno_len)?;
        let seqno = buf.copy_to_bytes(seqno_len);

        let origin = take_peer(&mut buf)?;
        let from = take_peer(&mut buf)?;

        need(buf, 4)?;
        let data_len = buf.get_u32_le() as usize;
        need(buf, data_len)?;
        let data = buf.copy_to_bytes(data_len);

        if buf.has_remaining() {
            return Err(PacketError::TrailingBytes(buf.remaining()));
        }

        Ok(GossipPacket {
            seqno,
            origin,
            from,
            data,
        })
    }
}

fn need(buf: &[u8], len: usize) -> Result<(), PacketError> {
    if buf.remaining() < len {
        return Err(PacketError::Truncated {
            expected: len,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

fn put_peer(buf: &mut BytesMut, peer: Option<&PeerId>) {
    match peer {
        Some(peer) => {
            buf.put_u8(KEY_LENGTH as u8);
            buf.put_slice(peer.as_bytes());
        }
        None => buf.put_u8(0),
    }
}

fn take_peer(buf: &mut &[u8]) -> Result<Option<PeerId>, PacketError> {
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    match len {
        0 => Ok(None),
        KEY_LENGTH => {
            need(buf, KEY_LENGTH)?;
            let mut id = [0u8; KEY_LENGTH];
            buf.copy_to_slice(&mut id);
            Ok(Some(PeerId::new(id)))
        }
        other => Err(PacketError::InvalidPeerId(other)),
    }
}
