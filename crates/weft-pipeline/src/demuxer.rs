//! Item demuxer - routes application messages to item models
//!
//! A genesis payload creates the item's model through the registry. Mutation
//! payloads are handed, still encoded, to the model of their item, which
//! decodes and applies them in arrival order.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace, warn};

use weft_core::{ApplicationMessage, ItemId, WeftError, WeftResult};
use weft_model::{ItemModel, ModelRegistry, MutationMeta, WriteChannel};

/// Counters for an item demuxer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemuxerStats {
    /// Items created from genesis payloads
    pub created: u64,
    /// Mutations processed
    pub mutations: u64,
    /// Mutations that changed model state
    pub changed: u64,
    pub errors: u64,
}

pub struct ItemDemuxer {
    registry: Arc<ModelRegistry>,
    /// Handed to every model the demuxer creates
    writer: Option<WriteChannel>,
    items: RwLock<HashMap<ItemId, Arc<dyn ItemModel>>>,
    stats: Mutex<DemuxerStats>,
}

impl ItemDemuxer {
    /// Create a demuxer whose models are read-only replicas
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self::with_writer(registry, None)
    }

    pub fn with_writer(registry: Arc<ModelRegistry>, writer: Option<WriteChannel>) -> Self {
        ItemDemuxer {
            registry,
            writer,
            items: RwLock::new(HashMap::new()),
            stats: Mutex::new(DemuxerStats::default()),
        }
    }

    /// Model of a live item
    pub fn model(&self, item_id: &ItemId) -> Option<Arc<dyn ItemModel>> {
        self.items.read().get(item_id).cloned()
    }

    /// Ids of all live items, sorted
    pub fn items(&self) -> Vec<ItemId> {
        let mut ids: Vec<_> = self.items.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> DemuxerStats {
        self.stats.lock().clone()
    }

    /// Route one application message.
    ///
    /// An envelope may carry a genesis and a first mutation together; the
    /// genesis is handled first.
    pub async fn process(&self, message: ApplicationMessage) -> WeftResult<()> {
        let result = self.route(message).await;
        if result.is_err() {
            self.stats.lock().errors += 1;
        }
        result
    }

    async fn route(&self, message: ApplicationMessage) -> WeftResult<()> {
        let ApplicationMessage { meta, data } = message;
        let item_id = data.item_id.ok_or_else(|| {
            WeftError::InvalidMutation("application message without item id".into())
        })?;

        if let Some(genesis) = data.genesis {
            match self.items.write().entry(item_id.clone()) {
                Entry::Occupied(_) => {
                    warn!(item = %item_id, "duplicate genesis for live item");
                    return Err(WeftError::ItemExists(item_id));
                }
                Entry::Vacant(slot) => {
                    let model = self.registry.create(
                        &genesis.model_type,
                        item_id.clone(),
                        self.writer.clone(),
                    )?;
                    slot.insert(model);
                }
            }
            self.stats.lock().created += 1;
            debug!(item = %item_id, model_type = %genesis.model_type, "item created");
        }

        let Some(mutation) = data.mutation else {
            return Ok(());
        };

        let model = self
            .model(&item_id)
            .ok_or_else(|| WeftError::ItemNotFound(item_id.clone()))?;
        let mutation_meta = MutationMeta {
            feed_key: meta.feed_key,
            seq: meta.seq,
            member_key: Some(meta.member_key),
        };
        let changed = model.process_encoded(mutation_meta, &mutation).await?;
        trace!(item = %item_id, seq = meta.seq, changed, "mutation processed");

        let mut stats = self.stats.lock();
        stats.mutations += 1;
        if changed {
            stats.changed += 1;
        }
        Ok(())
    }

    /// Drain `messages` on a background task until every sender is dropped.
    /// Failed messages go to `on_error` and routing continues.
    pub fn spawn<E>(
        self: &Arc<Self>,
        mut messages: mpsc::Receiver<ApplicationMessage>,
        mut on_error: E,
    ) -> DemuxerHandle
    where
        E: FnMut(WeftError) + Send + 'static,
    {
        let demuxer = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                if let Err(e) = demuxer.process(message).await {
                    warn!(error = %e, "failed to route application message");
                    on_error(e);
                }
            }
            debug!(stats = ?demuxer.stats(), "item demuxer finished");
        });

        DemuxerHandle { task }
    }
}

impl std::fmt::Debug for ItemDemuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemDemuxer")
            .field("items", &self.items())
            .field("read_only", &self.writer.is_none())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Handle to a running demuxer task
pub struct DemuxerHandle {
    task: JoinHandle<()>,
}

impl DemuxerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}
