//! Pipeline consumer - demultiplexes feed blocks
//!
//! Runs on its own task until the block source is exhausted. Each block is
//! either a credential (handed to the credential processor) or an
//! application payload (attributed to the member that admitted the feed and
//! forwarded to the item channel). A block that fails is reported to the
//! error handler and consumption moves on to the next one.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace, warn};

use weft_core::{
    ApplicationMessage, ApplicationMeta, FeedBlock, FeedMeta, MembershipMessage, Timeframe,
    WeftError, WeftResult,
};
use weft_credentials::CredentialProcessor;

/// Pipeline consumer configuration
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Capacity of the application message channel
    pub item_buffer: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig { item_buffer: 1000 }
    }
}

/// Counters for one consumer run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub blocks: u64,
    pub membership: u64,
    pub application: u64,
    /// Application payloads without a target item
    pub unrouted: u64,
    /// Blocks carrying neither payload
    pub empty: u64,
    pub errors: u64,
}

enum Disposition {
    Membership,
    Application,
    Unrouted,
    Empty,
}

pub struct PipelineConsumer {
    processor: Arc<CredentialProcessor>,
    items: mpsc::Sender<ApplicationMessage>,
}

impl PipelineConsumer {
    pub fn new(processor: Arc<CredentialProcessor>, items: mpsc::Sender<ApplicationMessage>) -> Self {
        PipelineConsumer { processor, items }
    }

    /// Create a consumer together with the receiving end of its item channel
    pub fn with_config(
        processor: Arc<CredentialProcessor>,
        config: ConsumerConfig,
    ) -> (Self, mpsc::Receiver<ApplicationMessage>) {
        let (tx, rx) = mpsc::channel(config.item_buffer);
        (Self::new(processor, tx), rx)
    }

    /// Consume `source` on a background task.
    ///
    /// The task ends when the source does. Only blocks from admitted feeds
    /// may carry application payloads; anything else is reported to
    /// `on_error` as an invariant violation.
    pub fn spawn<S, E>(self, source: S, mut on_error: E) -> ConsumerHandle
    where
        S: Stream<Item = FeedBlock> + Send + 'static,
        E: FnMut(WeftError) + Send + 'static,
    {
        let progress = Arc::new(RwLock::new(Timeframe::new()));
        let task_progress = Arc::clone(&progress);

        let task = tokio::spawn(async move {
            let mut source = Box::pin(source);
            let mut stats = ConsumerStats::default();
            debug!(party = %self.processor.party_key(), "pipeline consumer started");

            while let Some(block) = source.next().await {
                stats.blocks += 1;
                let (feed_key, seq) = (block.key, block.seq);
                track_progress(&task_progress, feed_key, seq);

                match self.process_block(block).await {
                    Ok(Disposition::Membership) => stats.membership += 1,
                    Ok(Disposition::Application) => stats.application += 1,
                    Ok(Disposition::Unrouted) => stats.unrouted += 1,
                    Ok(Disposition::Empty) => stats.empty += 1,
                    Err(e) => {
                        stats.errors += 1;
                        warn!(feed = %feed_key, seq, error = %e, "failed to process block");
                        on_error(e);
                    }
                }
            }

            debug!(?stats, "pipeline consumer finished");
            stats
        });

        ConsumerHandle { task, progress }
    }

    async fn process_block(&self, block: FeedBlock) -> WeftResult<Disposition> {
        let FeedBlock { key, seq, data } = block;

        if let Some(membership) = data.membership {
            if data.application.is_some() {
                warn!(feed = %key, seq, "block carries both payloads; application payload dropped");
            }
            self.processor.process_message(MembershipMessage {
                meta: FeedMeta { feed_key: key, seq },
                credential: membership.credential,
            });
            return Ok(Disposition::Membership);
        }

        let Some(envelope) = data.application else {
            warn!(feed = %key, seq, "block has no payload");
            return Ok(Disposition::Empty);
        };

        let member_key = self.processor.feed_owning_member(&key).ok_or_else(|| {
            WeftError::InvariantViolation(format!("admitted feed {key} has no owning member"))
        })?;

        if envelope.item_id.is_none() {
            trace!(feed = %key, seq, "application payload without item");
            return Ok(Disposition::Unrouted);
        }

        let message = ApplicationMessage {
            meta: ApplicationMeta {
                seq,
                feed_key: key,
                member_key,
                timeframe: envelope.timeframe.clone(),
            },
            data: envelope,
        };
        self.items
            .send(message)
            .await
            .map_err(|_| WeftError::ChannelClosed)?;
        Ok(Disposition::Application)
    }
}

fn track_progress(progress: &RwLock<Timeframe>, feed_key: weft_core::FeedKey, seq: u64) {
    let mut progress = progress.write();
    if let Some(previous) = progress.get(&feed_key) {
        if seq < previous {
            warn!(feed = %feed_key, seq, previous, "feed sequence went backwards");
        }
    }
    progress.advance(feed_key, seq);
}

/// Handle to a running consumer
pub struct ConsumerHandle {
    task: JoinHandle<ConsumerStats>,
    progress: Arc<RwLock<Timeframe>>,
}

impl ConsumerHandle {
    /// Highest sequence number consumed per feed
    pub fn timeframe(&self) -> Timeframe {
        self.progress.read().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the source to be exhausted
    pub async fn join(self) -> Result<ConsumerStats, JoinError> {
        self.task.await
    }
}
