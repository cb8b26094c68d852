//! Statistical plugin: publishes trailing-window counts for topics,
//! trackers and entities.

use std::sync::Arc;

use async_trait::async_trait;

use super::{publish_all, InsightCallback};
use crate::error::ParleyResult;
use crate::lifecycle::ConversationRegistry;
use crate::statistics::StatisticalAggregator;
use crate::traits::MessagePublisher;
use crate::types::{EntityBatch, MessageBatch, TopicBatch, TrackerBatch};

pub struct StatisticalPlugin {
    registry: Arc<ConversationRegistry>,
    aggregator: StatisticalAggregator,
    publisher: Arc<dyn MessagePublisher>,
}

impl StatisticalPlugin {
    pub fn new(
        aggregator: StatisticalAggregator,
        publisher: Arc<dyn MessagePublisher>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            registry: Arc::new(ConversationRegistry::new(cache_capacity)),
            aggregator,
            publisher,
        }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }
}

#[async_trait]
impl InsightCallback for StatisticalPlugin {
    fn name(&self) -> &'static str {
        "statistical"
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
        let messages = self.aggregator.topic_stats(&conversation, batch).await?;
        publish_all(self.publisher.as_ref(), self.name(), conversation_id, &messages).await;
        Ok(())
    }

    async fn tracker_result(&self, conversation_id: &str, batch: &TrackerBatch) -> ParleyResult<()> {
        let conversation = self.registry.get(conversation_id)?;
        let messages = self.aggregator.tracker_stats(&conversation, batch).await?;
        publish_all(self.publisher.as_ref(), self.name(), conversation_id, &messages).await;
        Ok(())
    }

    async fn entity_result(&self, conversation_id: &str, batch: &EntityBatch) -> ParleyResult<()> {
        let conversation = self.registry.get(conversation_id)?;
        let messages = self.aggregator.entity_stats(&conversation, batch).await?;
        publish_all(self.publisher.as_ref(), self.name(), conversation_id, &messages).await;
        Ok(())
    }

    async fn conversation_teardown(&self, conversation_id: &str) -> ParleyResult<()> {
        self.registry.remove(conversation_id).map(|_| ())
    }
}
