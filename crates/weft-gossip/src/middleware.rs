//! Transport seam of the broadcaster

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use weft_core::{PeerId, WeftResult};

/// Inbound side of a middleware
#[derive(Debug)]
pub struct MiddlewareStreams {
    /// Raw encoded packets from any peer
    pub packets: mpsc::Receiver<Bytes>,
    /// Full replacement peer sets
    pub peers: mpsc::Receiver<Vec<PeerId>>,
}

/// Point-to-point transport used to flood packets.
#[async_trait]
pub trait GossipMiddleware: Send + Sync + 'static {
    async fn send(&self, peer: &PeerId, payload: Bytes) -> WeftResult<()>;

    /// Open the inbound streams. Called once per `open()` of the broadcaster.
    fn subscribe(&self) -> MiddlewareStreams;

    /// Current peer set, if the transport can answer on demand
    async fn lookup(&self) -> Option<Vec<PeerId>> {
        None
    }
}
