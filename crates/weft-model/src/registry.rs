//! Model registry - maps model type ids to constructors

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use weft_core::{ItemId, WeftError, WeftResult};

use crate::{ItemModel, Model, ModelMeta, StateReducer, WriteChannel};

type Constructor = Arc<dyn Fn(ItemId, Option<WriteChannel>) -> Arc<dyn ItemModel> + Send + Sync>;

struct Registration {
    meta: ModelMeta,
    constructor: Constructor,
}

#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<&'static str, Registration>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry {
            models: HashMap::new(),
        }
    }

    /// Register a reducer under its type id. Registering twice is a no-op.
    pub fn register<R: StateReducer>(&mut self) -> &mut Self {
        self.models.entry(R::META.type_id).or_insert_with(|| {
            debug!(type_id = R::META.type_id, "model registered");
            Registration {
                meta: R::META,
                constructor: Arc::new(|item_id: ItemId, writer: Option<WriteChannel>| {
                    Arc::new(Model::<R>::new(item_id, writer)) as Arc<dyn ItemModel>
                }),
            }
        });
        self
    }

    /// Register a custom constructor for `meta.type_id`.
    ///
    /// Like [`register`](Self::register), the first registration for a type
    /// id wins.
    pub fn register_with<F>(&mut self, meta: ModelMeta, constructor: F) -> &mut Self
    where
        F: Fn(ItemId, Option<WriteChannel>) -> Arc<dyn ItemModel> + Send + Sync + 'static,
    {
        self.models.entry(meta.type_id).or_insert_with(|| {
            debug!(type_id = meta.type_id, "model registered");
            Registration {
                meta,
                constructor: Arc::new(constructor),
            }
        });
        self
    }

    pub fn has_model(&self, type_id: &str) -> bool {
        self.models.contains_key(type_id)
    }

    pub fn meta(&self, type_id: &str) -> Option<ModelMeta> {
        self.models.get(type_id).map(|r| r.meta)
    }

    pub fn type_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.models.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Construct a model instance for an item
    pub fn create(
        &self,
        type_id: &str,
        item_id: ItemId,
        writer: Option<WriteChannel>,
    ) -> WeftResult<Arc<dyn ItemModel>> {
        let registration = self
            .models
            .get(type_id)
            .ok_or_else(|| WeftError::UnknownModelType(type_id.to_string()))?;
        Ok((registration.constructor)(item_id, writer))
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("types", &self.type_ids())
            .finish()
    }
}
