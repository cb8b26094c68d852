//! Historical plugin: publishes cross-conversation correlations for
//! topics, trackers and entities.

use std::sync::Arc;

use async_trait::async_trait;

use super::{publish_all, InsightCallback};
use crate::correlation::HistoricalCorrelator;
use crate::error::ParleyResult;
use crate::lifecycle::ConversationRegistry;
use crate::traits::MessagePublisher;
use crate::types::{EntityBatch, MessageBatch, TopicBatch, TrackerBatch};

pub struct HistoricalPlugin {
    registry: Arc<ConversationRegistry>,
    correlator: HistoricalCorrelator,
    publisher: Arc<dyn MessagePublisher>,
}

impl HistoricalPlugin {
    pub fn new(
        correlator: HistoricalCorrelator,
        publisher: Arc<dyn MessagePublisher>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            registry: Arc::new(ConversationRegistry::new(cache_capacity)),
            correlator,
            publisher,
        }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }
}

#[async_trait]
impl InsightCallback for HistoricalPlugin {
    fn name(&self) -> &'static str {
        "historical"
    }

    async fn conversation_initialized(&self, conversation_id: &str) -> ParleyResult<()> {
        self.registry.init(conversation_id);
        Ok(())
    }

    async fn message_result(&self, conversation_id: &str, batch: &MessageBatch) -> ParleyResult<()> {
        self.registry.get(conversation_id)?.push_messages(batch);
        Ok(())
    }

    async fn topic_result(&self, conversation_id: &str, batch: &TopicBatch) -> ParleyResult<()> {
        let conversation = self.registry.get(conversation_id)?;
        let messages = self.correlator.correlate_topics(&conversation, batch).await?;
        publish_all(self.publisher.as_ref(), self.name(), conversation_id, &messages).await;
        Ok(())
    }

    async fn tracker_result(&self, conversation_id: &str, batch: &TrackerBatch) -> ParleyResult<()> {
        let conversation = self.registry.get(conversation_id)?;
        let messages = self.correlator.correlate_trackers(&conversation, batch).await?;
        publish_all(self.publisher.as_ref(), self.name(), conversation_id, &messages).await;
        Ok(())
    }

    async fn entity_result(&self, conversation_id: &str, batch: &EntityBatch) -> ParleyResult<()> {
        let conversation = self.registry.get(conversation_id)?;
        let messages = self.correlator.correlate_entities(&conversation, batch).await?;
        publish_all(self.publisher.as_ref(), self.name(), conversation_id, &messages).await;
        Ok(())
    }

    async fn conversation_teardown(&self, conversation_id: &str) -> ParleyResult<()> {
        self.registry.remove(conversation_id).map(|_| ())
    }
}
