//! End-to-end pipeline harness
//!
//! Wires a credential processor, a pipeline consumer and an item demuxer
//! together and runs a fixed list of blocks through them.

use std::sync::Arc;

use futures::stream;
use parking_lot::Mutex;

use weft_core::{FeedBlock, PartyKey, WeftError, WeftResult};
use weft_credentials::CredentialProcessor;
use weft_model::ModelRegistry;
use weft_pipeline::{ConsumerConfig, ConsumerStats, ItemDemuxer, PipelineConsumer};

pub struct PipelineHarness {
    pub processor: Arc<CredentialProcessor>,
    pub demuxer: Arc<ItemDemuxer>,
    errors: Arc<Mutex<Vec<WeftError>>>,
}

impl PipelineHarness {
    pub fn new(party_key: PartyKey, registry: ModelRegistry) -> Self {
        Self::with_processor(Arc::new(CredentialProcessor::new(party_key)), registry)
    }

    pub fn with_processor(processor: Arc<CredentialProcessor>, registry: ModelRegistry) -> Self {
        PipelineHarness {
            processor,
            demuxer: Arc::new(ItemDemuxer::new(Arc::new(registry))),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Consume `blocks` and wait until every routed message reached its model
    pub async fn run(&self, blocks: Vec<FeedBlock>) -> WeftResult<ConsumerStats> {
        let (consumer, items) =
            PipelineConsumer::with_config(Arc::clone(&self.processor), ConsumerConfig::default());

        let errors = Arc::clone(&self.errors);
        let demuxer = self.demuxer.spawn(items, move |e| errors.lock().push(e));
        let errors = Arc::clone(&self.errors);
        let consumer = consumer.spawn(stream::iter(blocks), move |e| errors.lock().push(e));

        let stats = consumer
            .join()
            .await
            .map_err(|e| WeftError::InvariantViolation(e.to_string()))?;
        demuxer
            .join()
            .await
            .map_err(|e| WeftError::InvariantViolation(e.to_string()))?;
        Ok(stats)
    }

    /// Errors reported by the consumer and the demuxer so far
    pub fn errors(&self) -> Vec<WeftError> {
        self.errors.lock().clone()
    }
}
