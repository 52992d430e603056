//! In-memory gossip mesh
//!
//! Every node gets a [`MeshNode`] middleware. Links are bidirectional and can
//! be severed to simulate an unreachable peer. Inbound packets and peer
//! updates are delivered over the same kind of channels a real transport
//! would hand to the broadcaster.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use weft_core::{PeerId, WeftError, WeftResult};
use weft_gossip::{GossipMiddleware, MiddlewareStreams};

/// Inbox depth per node
pub const MESH_BUFFER: usize = 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Default)]
struct MeshState {
    inboxes: HashMap<PeerId, mpsc::Sender<Bytes>>,
    peer_updates: HashMap<PeerId, mpsc::Sender<Vec<PeerId>>>,
    links: BTreeMap<PeerId, BTreeSet<PeerId>>,
    severed: HashSet<(PeerId, PeerId)>,
    stats: MeshStats,
}

impl MeshState {
    fn neighbours(&self, id: &PeerId) -> Vec<PeerId> {
        self.links
            .get(id)
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    fn notify(&self, id: &PeerId) {
        if let Some(updates) = self.peer_updates.get(id) {
            let _ = updates.try_send(self.neighbours(id));
        }
    }
}

/// Shared in-memory network
#[derive(Clone)]
pub struct MeshNetwork {
    state: Arc<Mutex<MeshState>>,
    lookup: bool,
}

impl MeshNetwork {
    /// Nodes answer `lookup()` with their current neighbours
    pub fn new() -> Self {
        MeshNetwork {
            state: Arc::new(Mutex::new(MeshState::default())),
            lookup: true,
        }
    }

    /// Nodes only learn peers through the peer-update stream
    pub fn push_only() -> Self {
        MeshNetwork {
            lookup: false,
            ..Self::new()
        }
    }

    pub fn node(&self, id: PeerId) -> Arc<MeshNode> {
        self.state.lock().links.entry(id).or_default();
        Arc::new(MeshNode {
            id,
            state: Arc::clone(&self.state),
            lookup: self.lookup,
        })
    }

    pub fn connect(&self, a: PeerId, b: PeerId) {
        let mut state = self.state.lock();
        state.links.entry(a).or_default().insert(b);
        state.links.entry(b).or_default().insert(a);
        state.severed.remove(&(a, b));
        state.severed.remove(&(b, a));
        state.notify(&a);
        state.notify(&b);
    }

    /// Connect every pair of `peers`
    pub fn connect_all(&self, peers: &[PeerId]) {
        for (i, a) in peers.iter().enumerate() {
            for b in &peers[i + 1..] {
                self.connect(*a, *b);
            }
        }
    }

    /// Keep the link in peer lists but fail every send across it
    pub fn sever(&self, a: PeerId, b: PeerId) {
        let mut state = self.state.lock();
        state.severed.insert((a, b));
        state.severed.insert((b, a));
    }

    pub fn neighbours(&self, id: &PeerId) -> Vec<PeerId> {
        self.state.lock().neighbours(id)
    }

    pub fn stats(&self) -> MeshStats {
        self.state.lock().stats.clone()
    }
}

impl Default for MeshNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's view of the mesh
pub struct MeshNode {
    id: PeerId,
    state: Arc<Mutex<MeshState>>,
    lookup: bool,
}

impl MeshNode {
    pub fn id(&self) -> PeerId {
        self.id
    }
}

#[async_trait]
impl GossipMiddleware for MeshNode {
    async fn send(&self, peer: &PeerId, payload: Bytes) -> WeftResult<()> {
        let inbox = {
            let mut state = self.state.lock();
            let linked = state.links.get(&self.id).is_some_and(|p| p.contains(peer));
            let inbox = state.inboxes.get(peer).cloned();
            match inbox {
                Some(inbox) if linked && !state.severed.contains(&(self.id, *peer)) => inbox,
                _ => {
                    state.stats.failed += 1;
                    return Err(WeftError::TransportError(format!("{peer:?} unreachable")));
                }
            }
        };

        inbox.send(payload).await.map_err(|_| {
            self.state.lock().stats.failed += 1;
            WeftError::TransportError(format!("{peer:?} is not listening"))
        })?;
        self.state.lock().stats.delivered += 1;
        Ok(())
    }

    fn subscribe(&self) -> MiddlewareStreams {
        let (packet_tx, packets) = mpsc::channel(MESH_BUFFER);
        let (peer_tx, peers) = mpsc::channel(MESH_BUFFER);

        let mut state = self.state.lock();
        state.inboxes.insert(self.id, packet_tx);
        state.peer_updates.insert(self.id, peer_tx);
        state.notify(&self.id);

        MiddlewareStreams { packets, peers }
    }

    async fn lookup(&self) -> Option<Vec<PeerId>> {
        self.lookup.then(|| self.state.lock().neighbours(&self.id))
    }
}
