//! Model wrapper and reducer traits

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{trace, warn};

use weft_core::{FeedKey, ItemId, MemberKey, Observers, Subscription, WeftError, WeftResult};

/// Static description of a model type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelMeta {
    /// Registry key of the model
    pub type_id: &'static str,
    /// Tag attached to every mutation the model writes
    pub mutation_type_id: &'static str,
}

/// Origin of a replicated mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationMeta {
    pub feed_key: FeedKey,
    pub seq: u64,
    /// Member that admitted the source feed, when known
    pub member_key: Option<MemberKey>,
}

/// One replicated change for one item
#[derive(Clone, Debug)]
pub struct ModelMessage<T> {
    pub meta: MutationMeta,
    pub mutation: T,
}

/// Mutation queued for replication by [`Model::write`]
#[derive(Clone, Debug)]
pub struct OutboundMutation {
    pub item_id: ItemId,
    pub mutation_type_id: &'static str,
    pub payload: Bytes,
}

/// Outbound channel of a writable model
pub type WriteChannel = mpsc::Sender<OutboundMutation>;

/// Binary form of a mutation, used wherever models are type-erased
pub trait MutationCodec: Sized {
    /// Fails when a field does not fit its length prefix
    fn encode(&self) -> WeftResult<Bytes>;
    fn decode(buf: &[u8]) -> WeftResult<Self>;
}

/// Model-specific state and its apply step
pub trait StateReducer: Default + Send + Sync + 'static {
    type Mutation: MutationCodec + Clone + fmt::Debug + Send + Sync + 'static;

    const META: ModelMeta;

    /// Apply one mutation. Returns `true` if the state changed.
    fn apply(&mut self, meta: &MutationMeta, mutation: &Self::Mutation) -> WeftResult<bool>;
}

/// Replicated state of one item
pub struct Model<R: StateReducer> {
    item_id: ItemId,
    writer: Option<WriteChannel>,
    state: RwLock<R>,
    /// Serializes `process_message`; held across apply and notification
    ingest: Mutex<()>,
    observers: Observers<Model<R>>,
}

impl<R: StateReducer> Model<R> {
    /// Create a model. Without a write channel the model is a read-only replica.
    pub fn new(item_id: ItemId, writer: Option<WriteChannel>) -> Self {
        Model {
            item_id,
            writer,
            state: RwLock::new(R::default()),
            ingest: Mutex::new(()),
            observers: Observers::new(),
        }
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn meta(&self) -> ModelMeta {
        R::META
    }

    pub fn read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Read the reducer state
    pub fn read<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.state.read())
    }

    /// Observe state changes. Callbacks run after each mutation that
    /// changed the state.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Model<R>) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Apply a replicated mutation and notify observers if it changed state.
    ///
    /// Concurrent calls are applied one at a time in arrival order.
    /// Observers must not feed mutations back into the same model
    /// synchronously.
    pub async fn process_message(&self, message: ModelMessage<R::Mutation>) -> WeftResult<bool> {
        let _gate = self.ingest.lock().await;

        let changed = self.state.write().apply(&message.meta, &message.mutation)?;
        trace!(
            item = %self.item_id,
            feed = %message.meta.feed_key,
            seq = message.meta.seq,
            changed,
            "mutation applied"
        );
        if changed {
            self.observers.emit(self);
        }
        Ok(changed)
    }

    /// Queue a mutation for replication.
    ///
    /// Local state is unchanged until the mutation comes back through
    /// [`Model::process_message`].
    pub async fn write(&self, mutation: R::Mutation) -> WeftResult<()> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| WeftError::ReadOnlyModel(self.item_id.clone()))?;

        let payload = mutation.encode()?;
        writer
            .send(OutboundMutation {
                item_id: self.item_id.clone(),
                mutation_type_id: R::META.mutation_type_id,
                payload,
            })
            .await
            .map_err(|_| WeftError::ChannelClosed)
    }

    /// Spawn a task that feeds a channel into this model.
    ///
    /// The task exits once every sender has been dropped.
    pub fn spawn_processor(self: &Arc<Self>, buffer: usize) -> mpsc::Sender<ModelMessage<R::Mutation>> {
        let (tx, mut rx) = mpsc::channel(buffer);
        let model = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = model.process_message(message).await {
                    warn!(item = %model.item_id, error = %e, "mutation failed");
                }
            }
        });

        tx
    }
}

impl<R: StateReducer + fmt::Debug> fmt::Debug for Model<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("item_id", &self.item_id)
            .field("type_id", &R::META.type_id)
            .field("read_only", &self.read_only())
            .field("state", &*self.state.read())
            .finish()
    }
}

/// Type-erased model, as produced by the registry
#[async_trait]
pub trait ItemModel: Send + Sync + 'static {
    fn item_id(&self) -> &ItemId;

    fn meta(&self) -> ModelMeta;

    fn read_only(&self) -> bool;

    /// Decode a mutation and process it
    async fn process_encoded(&self, meta: MutationMeta, payload: &[u8]) -> WeftResult<bool>;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<R: StateReducer> ItemModel for Model<R> {
    fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    fn meta(&self) -> ModelMeta {
        R::META
    }

    fn read_only(&self) -> bool {
        self.writer.is_none()
    }

    async fn process_encoded(&self, meta: MutationMeta, payload: &[u8]) -> WeftResult<bool> {
        let mutation = R::Mutation::decode(payload)?;
        self.process_message(ModelMessage { meta, mutation }).await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recover the concrete model behind a type-erased one
pub fn downcast_model<R: StateReducer>(model: Arc<dyn ItemModel>) -> Option<Arc<Model<R>>> {
    model.as_any().downcast::<Model<R>>().ok()
}
