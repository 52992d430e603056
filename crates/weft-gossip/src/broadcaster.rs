//! Flood broadcaster
//!
//! Every novel packet is forwarded to all known peers except its origin and
//! the hop it came from. Novelty is decided by a bounded [`DedupCache`].
//! Outbound `publish` works whether or not the broadcaster is open; inbound
//! packets are only processed between `open()` and `close()`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use weft_core::{Observers, PeerId, Subscription, WeftError};

use crate::{
    CacheOptions, DedupCache, GossipMiddleware, GossipPacket, MiddlewareStreams, DEFAULT_MAX_AGE,
    DEFAULT_MAX_SIZE,
};

/// Broadcaster configuration
#[derive(Clone, Debug)]
pub struct BroadcasterConfig {
    /// Own peer id; random when unset
    pub id: Option<PeerId>,
    pub max_age: Duration,
    pub max_size: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        BroadcasterConfig {
            id: None,
            max_age: DEFAULT_MAX_AGE,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl BroadcasterConfig {
    pub fn with_id(id: PeerId) -> Self {
        BroadcasterConfig {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            max_age: self.max_age,
            max_size: self.max_size,
        }
    }
}

/// Notifications from a broadcaster
#[derive(Clone, Debug)]
pub enum BroadcastEvent {
    /// Packet handed to the middleware for `peer`
    Sent { peer: PeerId, packet: GossipPacket },
    /// Middleware failed to send to `peer`; other peers are unaffected
    SendError { peer: PeerId, error: WeftError },
    /// Novel packet from another peer
    Packet(GossipPacket),
    /// Inbound bytes that could not be decoded
    SubscribeError(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub published: u64,
    /// Received packets forwarded to at least one peer
    pub relayed: u64,
    /// Novel packets emitted to subscribers
    pub delivered: u64,
    pub duplicates: u64,
    /// Malformed, incomplete or own-origin packets
    pub dropped: u64,
    pub sent: u64,
    pub send_errors: u64,
}

pub struct Broadcaster {
    id: PeerId,
    middleware: Arc<dyn GossipMiddleware>,
    peers: RwLock<Vec<PeerId>>,
    cache: Mutex<DedupCache>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    stats: Mutex<BroadcastStats>,
    events: Observers<BroadcastEvent>,
}

impl Broadcaster {
    pub fn new(middleware: Arc<dyn GossipMiddleware>, config: BroadcasterConfig) -> Self {
        Broadcaster {
            id: config.id.unwrap_or_else(PeerId::random),
            cache: Mutex::new(DedupCache::new(config.cache_options())),
            middleware,
            peers: RwLock::new(Vec::new()),
            receive_task: Mutex::new(None),
            stats: Mutex::new(BroadcastStats::default()),
            events: Observers::new(),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.read().clone()
    }

    pub fn is_open(&self) -> bool {
        self.receive_task.lock().is_some()
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats.lock().clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&BroadcastEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Subscribe to the middleware and start processing inbound packets.
    /// Opening an open broadcaster does nothing.
    pub fn open(self: &Arc<Self>) {
        let mut task = self.receive_task.lock();
        if task.is_some() {
            return;
        }

        let MiddlewareStreams {
            mut packets,
            mut peers,
        } = self.middleware.subscribe();
        let broadcaster: Weak<Self> = Arc::downgrade(self);

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(raw) = packets.recv() => {
                        let Some(this) = broadcaster.upgrade() else { break };
                        this.on_packet(&raw).await;
                    }
                    Some(update) = peers.recv() => {
                        let Some(this) = broadcaster.upgrade() else { break };
                        this.update_peers(update);
                    }
                    else => break,
                }
            }
            trace!("broadcaster receive loop ended");
        }));
        debug!(peer = ?self.id, "broadcaster opened");
    }

    /// Stop inbound processing and forget every seen packet.
    /// Closing a closed broadcaster does nothing.
    pub fn close(&self) {
        let Some(task) = self.receive_task.lock().take() else {
            return;
        };
        task.abort();
        self.cache.lock().clear();
        debug!(peer = ?self.id, "broadcaster closed");
    }

    /// Replace the known peer set. The own id is never a target.
    pub fn update_peers(&self, peers: Vec<PeerId>) {
        let mut peers = peers;
        peers.retain(|p| *p != self.id);
        peers.sort_unstable();
        peers.dedup();
        trace!(count = peers.len(), "peers updated");
        *self.peers.write() = peers;
    }

    pub fn update_cache(&self, options: CacheOptions) {
        self.cache.lock().update(options);
    }

    /// Remove aged entries from the dedup cache
    pub fn prune_cache(&self) -> usize {
        let pruned = self.cache.lock().prune();
        if pruned > 0 {
            trace!(pruned, "dedup cache pruned");
        }
        pruned
    }

    /// Flood `data` as a new packet originating here.
    ///
    /// Returns the packet as sent, or `None` when there was no peer to send
    /// it to.
    pub async fn publish(&self, data: Bytes, seqno: Option<Bytes>) -> Option<GossipPacket> {
        let seqno = seqno.unwrap_or_else(GossipPacket::random_seqno);
        self.stats.lock().published += 1;
        self.flood(GossipPacket::new(seqno, self.id, data)).await
    }

    /// Handle one encoded packet from the middleware
    pub async fn on_packet(&self, raw: &[u8]) {
        if !self.is_open() {
            trace!("packet ignored while closed");
            return;
        }

        let packet = match GossipPacket::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "undecodable gossip packet");
                self.stats.lock().dropped += 1;
                self.events.emit(&BroadcastEvent::SubscribeError(e.to_string()));
                return;
            }
        };

        let origin = match packet.origin {
            Some(origin) if packet.is_complete() => origin,
            _ => {
                debug!("incomplete gossip packet dropped");
                self.stats.lock().dropped += 1;
                return;
            }
        };

        if origin == self.id {
            trace!("own packet dropped");
            self.stats.lock().dropped += 1;
            return;
        }

        let key = DedupCache::key(&origin, &packet.seqno);
        if !self.cache.lock().check_and_insert(key) {
            self.stats.lock().duplicates += 1;
            return;
        }

        if self.flood(packet.clone()).await.is_some() {
            self.stats.lock().relayed += 1;
        }
        self.stats.lock().delivered += 1;
        self.events.emit(&BroadcastEvent::Packet(packet));
    }

    async fn flood(&self, mut packet: GossipPacket) -> Option<GossipPacket> {
        if let Some(peers) = self.middleware.lookup().await {
            self.update_peers(peers);
        }

        let targets: Vec<PeerId> = self
            .peers
            .read()
            .iter()
            .copied()
            .filter(|p| Some(*p) != packet.origin && Some(*p) != packet.from)
            .collect();
        if targets.is_empty() {
            trace!("no peers to flood to");
            return None;
        }

        packet.from = Some(self.id);
        let payload = packet.encode();

        let stamped = &packet;
        let sends = targets.into_iter().map(|peer| {
            let payload = payload.clone();
            async move {
                match self.middleware.send(&peer, payload).await {
                    Ok(()) => {
                        self.stats.lock().sent += 1;
                        self.events.emit(&BroadcastEvent::Sent {
                            peer,
                            packet: stamped.clone(),
                        });
                    }
                    Err(error) => {
                        warn!(peer = ?peer, error = %error, "gossip send failed");
                        self.stats.lock().send_errors += 1;
                        self.events.emit(&BroadcastEvent::SendError { peer, error });
                    }
                }
            }
        });
        join_all(sends).await;

        Some(packet)
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("peers", &self.peers.read().len())
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::sync::{mpsc, Notify};
    use weft_core::WeftResult;

    #[derive(Default)]
    struct MockMiddleware {
        sent: Mutex<Vec<(PeerId, Bytes)>>,
        failing: HashSet<PeerId>,
        lookup: Option<Vec<PeerId>>,
        /// Sends to this peer wait until the `Notify` is released
        stalled: Option<(PeerId, Arc<Notify>)>,
        inbound: Mutex<Vec<(mpsc::Sender<Bytes>, mpsc::Sender<Vec<PeerId>>)>>,
    }

    impl MockMiddleware {
        fn sent_to(&self) -> Vec<PeerId> {
            let mut peers: Vec<_> = self.sent.lock().iter().map(|(p, _)| *p).collect();
            peers.sort();
            peers
        }

        fn inbound(&self) -> (mpsc::Sender<Bytes>, mpsc::Sender<Vec<PeerId>>) {
            self.inbound.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GossipMiddleware for MockMiddleware {
        async fn send(&self, peer: &PeerId, payload: Bytes) -> WeftResult<()> {
            if let Some((stalled, release)) = &self.stalled {
                if stalled == peer {
                    release.notified().await;
                }
            }
            if self.failing.contains(peer) {
                return Err(WeftError::TransportError("unreachable".into()));
            }
            self.sent.lock().push((*peer, payload));
            Ok(())
        }

        fn subscribe(&self) -> MiddlewareStreams {
            let (packet_tx, packets) = mpsc::channel(16);
            let (peer_tx, peers) = mpsc::channel(16);
            self.inbound.lock().push((packet_tx, peer_tx));
            MiddlewareStreams { packets, peers }
        }

        async fn lookup(&self) -> Option<Vec<PeerId>> {
            self.lookup.clone()
        }
    }

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn setup(middleware: MockMiddleware) -> (Arc<MockMiddleware>, Arc<Broadcaster>) {
        let middleware = Arc::new(middleware);
        let broadcaster = Arc::new(Broadcaster::new(
            middleware.clone(),
            BroadcasterConfig::with_id(peer(0)),
        ));
        (middleware, broadcaster)
    }

    fn record(broadcaster: &Broadcaster) -> Arc<Mutex<Vec<BroadcastEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        // Kept registered for the broadcaster's lifetime
        let _subscription = broadcaster.subscribe(move |e| sink.lock().push(e.clone()));
        events
    }

    fn relayed(origin: u8, from: u8, seqno: &'static [u8]) -> Bytes {
        GossipPacket {
            seqno: Bytes::from_static(seqno),
            origin: Some(peer(origin)),
            from: Some(peer(from)),
            data: Bytes::from_static(b"payload"),
        }
        .encode()
    }

    #[tokio::test]
    async fn test_publish_floods_every_peer() {
        let (middleware, broadcaster) = setup(MockMiddleware::default());
        broadcaster.update_peers(vec![peer(1), peer(2), peer(0)]);

        let packet = broadcaster
            .publish(Bytes::from_static(b"hi"), Some(Bytes::from_static(b"s1")))
            .await
            .unwrap();

        assert_eq!(packet.origin, Some(peer(0)));
        assert_eq!(packet.from, Some(peer(0)));
        assert_eq!(middleware.sent_to(), vec![peer(1), peer(2)]);

        let (_, payload) = middleware.sent.lock()[0].clone();
        assert_eq!(GossipPacket::decode(&payload).unwrap(), packet);
        assert_eq!(broadcaster.stats().published, 1);
        assert_eq!(broadcaster.stats().sent, 2);
    }

    #[tokio::test]
    async fn test_publish_without_peers() {
        let (middleware, broadcaster) = setup(MockMiddleware::default());
        assert!(broadcaster.publish(Bytes::from_static(b"hi"), None).await.is_none());
        assert!(middleware.sent_to().is_empty());
    }

    #[tokio::test]
    async fn test_send_error_is_per_peer() {
        let (middleware, broadcaster) = setup(MockMiddleware {
            failing: [peer(2)].into_iter().collect(),
            ..Default::default()
        });
        let events = record(&broadcaster);
        broadcaster.update_peers(vec![peer(1), peer(2), peer(3)]);

        broadcaster.publish(Bytes::from_static(b"hi"), None).await.unwrap();

        assert_eq!(middleware.sent_to(), vec![peer(1), peer(3)]);
        let events = events.lock();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BroadcastEvent::SendError { peer, .. } => Some(*peer),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![peer(2)]);
        assert_eq!(
            events.iter().filter(|e| matches!(e, BroadcastEvent::Sent { .. })).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_slow_peer_does_not_hold_back_others() {
        let release = Arc::new(Notify::new());
        let (middleware, broadcaster) = setup(MockMiddleware {
            stalled: Some((peer(2), Arc::clone(&release))),
            ..Default::default()
        });
        let events = record(&broadcaster);
        broadcaster.update_peers(vec![peer(1), peer(2)]);

        let publisher = Arc::clone(&broadcaster);
        let publish = tokio::spawn(async move {
            publisher.publish(Bytes::from_static(b"hi"), None).await
        });

        fn sent_to(events: &Mutex<Vec<BroadcastEvent>>) -> Vec<PeerId> {
            events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    BroadcastEvent::Sent { peer, .. } => Some(*peer),
                    _ => None,
                })
                .collect()
        }

        for _ in 0..100 {
            if !sent_to(&events).is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sent_to(&events), vec![peer(1)]);
        assert_eq!(broadcaster.stats().sent, 1);
        assert!(!publish.is_finished());

        release.notify_one();
        assert!(publish.await.unwrap().is_some());
        assert_eq!(sent_to(&events), vec![peer(1), peer(2)]);
        assert_eq!(middleware.sent_to(), vec![peer(1), peer(2)]);
    }

    #[tokio::test]
    async fn test_lookup_refreshes_peers() {
        let (middleware, broadcaster) = setup(MockMiddleware {
            lookup: Some(vec![peer(5)]),
            ..Default::default()
        });
        broadcaster.update_peers(vec![peer(1)]);

        broadcaster.publish(Bytes::from_static(b"hi"), None).await.unwrap();
        assert_eq!(middleware.sent_to(), vec![peer(5)]);
        assert_eq!(broadcaster.peers(), vec![peer(5)]);
    }

    #[tokio::test]
    async fn test_publish_after_close_still_sends() {
        let (middleware, broadcaster) = setup(MockMiddleware::default());
        broadcaster.update_peers(vec![peer(1)]);
        broadcaster.open();
        broadcaster.close();
        assert!(!broadcaster.is_open());

        assert!(broadcaster.publish(Bytes::from_static(b"late"), None).await.is_some());
        assert_eq!(middleware.sent_to(), vec![peer(1)]);
    }

    #[tokio::test]
    async fn test_inbound_dedup_and_relay() {
        let (middleware, broadcaster) = setup(MockMiddleware::default());
        let events = record(&broadcaster);
        broadcaster.update_peers(vec![peer(1), peer(2), peer(3)]);

        // Closed: ignored entirely
        broadcaster.on_packet(&relayed(1, 2, b"a")).await;
        assert!(events.lock().is_empty());

        broadcaster.open();
        broadcaster.on_packet(&relayed(1, 2, b"a")).await;
        broadcaster.on_packet(&relayed(1, 3, b"a")).await;

        // Relayed once, skipping origin and last hop
        assert_eq!(middleware.sent_to(), vec![peer(3)]);
        let delivered = events
            .lock()
            .iter()
            .filter(|e| matches!(e, BroadcastEvent::Packet(_)))
            .count();
        assert_eq!(delivered, 1);

        let stats = broadcaster.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.relayed, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[tokio::test]
    async fn test_inbound_drops() {
        let (middleware, broadcaster) = setup(MockMiddleware::default());
        let events = record(&broadcaster);
        broadcaster.update_peers(vec![peer(1), peer(2)]);
        broadcaster.open();

        broadcaster.on_packet(&[0xFF, 0x00]).await;
        broadcaster.on_packet(&relayed(0, 1, b"own")).await;
        broadcaster.on_packet(&relayed(1, 1, b"")).await;

        assert!(middleware.sent_to().is_empty());
        assert_eq!(broadcaster.stats().dropped, 3);
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BroadcastEvent::SubscribeError(_)));
    }

    #[tokio::test]
    async fn test_close_clears_cache() {
        let (_middleware, broadcaster) = setup(MockMiddleware::default());
        let events = record(&broadcaster);
        broadcaster.open();
        broadcaster.on_packet(&relayed(1, 1, b"a")).await;

        broadcaster.close();
        broadcaster.open();
        broadcaster.on_packet(&relayed(1, 1, b"a")).await;

        assert_eq!(broadcaster.stats().delivered, 2);
        assert_eq!(events.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_drives_streams() {
        let (middleware, broadcaster) = setup(MockMiddleware::default());
        broadcaster.open();
        broadcaster.open();
        assert_eq!(middleware.inbound.lock().len(), 1);

        let (delivered_tx, mut delivered) = mpsc::unbounded_channel();
        let _subscription = broadcaster.subscribe(move |e| {
            if let BroadcastEvent::Packet(p) = e {
                let _ = delivered_tx.send(p.clone());
            }
        });

        let (packets, peers) = middleware.inbound();
        peers.send(vec![peer(4)]).await.unwrap();
        while broadcaster.peers().is_empty() {
            tokio::task::yield_now().await;
        }
        packets.send(relayed(1, 1, b"a")).await.unwrap();

        let packet = delivered.recv().await.unwrap();
        assert_eq!(packet.seqno, Bytes::from_static(b"a"));
        assert_eq!(broadcaster.peers(), vec![peer(4)]);
        assert_eq!(middleware.sent_to(), vec![peer(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_cache() {
        let (_middleware, broadcaster) = setup(MockMiddleware::default());
        broadcaster.update_cache(CacheOptions {
            max_age: Duration::from_millis(50),
            max_size: 10,
        });
        broadcaster.open();
        broadcaster.on_packet(&relayed(1, 1, b"a")).await;
        broadcaster.on_packet(&relayed(1, 1, b"b")).await;

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(broadcaster.prune_cache(), 2);
        assert_eq!(broadcaster.prune_cache(), 0);
    }
}
