//! Weft Pipeline - From feed blocks to item mutations
//!
//! The consumer reads blocks from the party's feeds, hands credentials to
//! the credential processor and attributes application payloads to the
//! member that admitted their feed. The item demuxer takes those attributed
//! messages and replays them into one model per item.

pub mod consumer;
pub mod demuxer;

pub use consumer::*;
pub use demuxer::*;
