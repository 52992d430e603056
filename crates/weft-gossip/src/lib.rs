//! Weft Gossip - Flood broadcast over an arbitrary point-to-point transport
//!
//! A [`Broadcaster`] floods every novel packet to all of its peers except the
//! packet's origin and last hop. A bounded, age-aware [`DedupCache`] keyed by
//! `(origin, seqno)` stops packets from circulating forever.

pub mod broadcaster;
pub mod cache;
pub mod middleware;
pub mod packet;

pub use broadcaster::*;
pub use cache::*;
pub use middleware::*;
pub use packet::*;
