//! Minimal property model registered as `"test"`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

use weft_core::{FeedKey, ItemId, WeftError, WeftResult};
use weft_model::{
    downcast_model, Model, ModelMessage, ModelMeta, ModelRegistry, MutationCodec, MutationMeta,
    StateReducer,
};

/// `key = value`, both UTF-8
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestMutation {
    pub key: String,
    pub value: String,
}

impl MutationCodec for TestMutation {
    fn encode(&self) -> WeftResult<Bytes> {
        let mut buf = BytesMut::with_capacity(8 + self.key.len() + self.value.len());
        for field in [&self.key, &self.value] {
            let len = u32::try_from(field.len())
                .map_err(|_| WeftError::InvalidMutation("field too long".into()))?;
            buf.put_u32_le(len);
            buf.put_slice(field.as_bytes());
        }
        Ok(buf.freeze())
    }

    fn decode(mut buf: &[u8]) -> WeftResult<Self> {
        let key = take_field(&mut buf)?;
        let value = take_field(&mut buf)?;
        if buf.has_remaining() {
            return Err(WeftError::InvalidMutation("trailing bytes".into()));
        }
        Ok(TestMutation { key, value })
    }
}

fn take_field(buf: &mut &[u8]) -> WeftResult<String> {
    if buf.remaining() < 4 {
        return Err(WeftError::BufferTooShort {
            expected: 4,
            actual: buf.remaining(),
        });
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(WeftError::BufferTooShort {
            expected: len,
            actual: buf.remaining(),
        });
    }
    String::from_utf8(buf.copy_to_bytes(len).to_vec())
        .map_err(|e| WeftError::InvalidMutation(e.to_string()))
}

#[derive(Debug, Default)]
pub struct TestModel {
    properties: HashMap<String, String>,
}

impl StateReducer for TestModel {
    type Mutation = TestMutation;

    const META: ModelMeta = ModelMeta {
        type_id: "test",
        mutation_type_id: "test/mutation",
    };

    /// Every mutation counts as a change, even an identical write.
    fn apply(&mut self, _meta: &MutationMeta, mutation: &TestMutation) -> WeftResult<bool> {
        self.properties
            .insert(mutation.key.clone(), mutation.value.clone());
        Ok(true)
    }
}

/// Property accessors on a [`TestModel`]
#[async_trait]
pub trait TestModelExt {
    fn get_property(&self, key: &str) -> Option<String>;

    async fn set_property(&self, key: &str, value: &str) -> WeftResult<()>;
}

#[async_trait]
impl TestModelExt for Model<TestModel> {
    fn get_property(&self, key: &str) -> Option<String> {
        self.read(|state| state.properties.get(key).cloned())
    }

    async fn set_property(&self, key: &str, value: &str) -> WeftResult<()> {
        self.write(TestMutation {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }
}

/// Create a model through `registry` whose writes are replayed into itself,
/// as if they had gone out to a feed and come back.
pub fn loopback_model<R: StateReducer>(
    registry: &ModelRegistry,
    item_id: ItemId,
    feed_key: FeedKey,
) -> WeftResult<Arc<Model<R>>> {
    let (writer, mut outbound) = mpsc::channel(64);
    let model = registry.create(R::META.type_id, item_id, Some(writer))?;
    let model = downcast_model::<R>(model)
        .ok_or_else(|| WeftError::UnknownModelType(R::META.type_id.to_string()))?;
    let inbound = model.spawn_processor(64);
    let seq = AtomicU64::new(0);

    tokio::spawn(async move {
        while let Some(write) = outbound.recv().await {
            let mutation = match R::Mutation::decode(&write.payload) {
                Ok(mutation) => mutation,
                Err(e) => {
                    tracing::warn!(error = %e, "loopback dropped undecodable mutation");
                    continue;
                }
            };
            let meta = MutationMeta {
                feed_key,
                seq: seq.fetch_add(1, Ordering::Relaxed),
                member_key: None,
            };
            if inbound.send(ModelMessage { meta, mutation }).await.is_err() {
                break;
            }
        }
    });

    Ok(model)
}
