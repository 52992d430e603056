//! Weft Core - Fundamental types shared by the replication pipeline
//!
//! This crate defines the types used throughout Weft:
//! - Keys and identifiers (PublicKey, PeerId, ItemId)
//! - Party credentials and their canonical signing encoding
//! - Timeframes (per-feed replication progress)
//! - Feed blocks and their membership/application envelopes
//! - Observer registries with stable subscription handles
//! - The unified error type

pub mod credential;
pub mod error;
pub mod feed;
pub mod id;
pub mod observer;
pub mod timeframe;

pub use credential::*;
pub use error::*;
pub use feed::*;
pub use id::*;
pub use observer::*;
pub use timeframe::*;
