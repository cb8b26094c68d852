//! Trigger plugin: pattern matching during the conversation, one
//! notification at teardown.

use std::sync::Arc;

use async_trait::async_trait;

use super::InsightCallback;
use crate::config::PluginConfig;
use crate::error::ParleyResult;
use crate::lifecycle::ConversationRegistry;
use crate::notify::{NotificationDispatcher, NotificationSink, TeardownOutcome};
use crate::triggers::{TriggerAggregator, TriggerPatterns};
use crate::types::{
    ActionItemBatch, EntityBatch, FollowUpBatch, MessageBatch, QuestionBatch, TopicBatch,
    TrackerBatch,
};

pub struct TriggerPlugin {
    aggregator: TriggerAggregator,
    dispatcher: NotificationDispatcher,
}

impl TriggerPlugin {
    pub fn new(
        patterns: TriggerPatterns,
        sink: Option<Arc<dyn NotificationSink>>,
        cache_capacity: usize,
    ) -> Self {
        let registry = Arc::new(ConversationRegistry::new(cache_capacity));
        Self {
            aggregator: TriggerAggregator::new(patterns, registry.clone()),
            dispatcher: NotificationDispatcher::new(registry, sink),
        }
    }

    pub fn from_config(config: &PluginConfig, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self::new(
            TriggerPatterns::compile(&config.triggers),
            sink,
            config.cache_capacity,
        )
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        self.aggregator.registry()
    }

    /// Tear down and report what happened.
    pub async fn teardown(&self, conversation_id: &str) -> ParleyResult<TeardownOutcome> {
        self.dispatcher.teardown(conversation_id).await
    }
}

#[async_trait]
impl InsightCallback for TriggerPlugin {
    fn name(&self) -> &'static str {
        "trigger"
    }

    async fn conversation_initialized(&self, conversation_id: &str) -> ParleyResult<()> {
        self.registry().init(conversation_id);
        Ok(())
    }

    async fn message_result(&self, conversation_id: &str, batch: &MessageBatch) -> ParleyResult<()> {
        self.aggregator.record_messages(conversation_id, batch)
    }

    async fn question_result(&self, conversation_id: &str, batch: &QuestionBatch) -> ParleyResult<()> {
        self.aggregator.record_questions(conversation_id, batch).map(|_| ())
    }

    async fn follow_up_result(&self, conversation_id: &str, batch: &FollowUpBatch) -> ParleyResult<()> {
        self.aggregator.record_follow_ups(conversation_id, batch).map(|_| ())
    }

    async fn action_item_result(
        &self,
        conversation_id: &str,
        batch: &ActionItemBatch,
    ) -> ParleyResult<()> {
        self.aggregator
            .record_action_items(conversation_id, batch)
            .map(|_| ())
    }

    async fn topic_result(&self, conversation_id: &str, batch: &TopicBatch) -> ParleyResult<()> {
        self.aggregator.record_topics(conversation_id, batch).map(|_| ())
    }

    async fn tracker_result(&self, conversation_id: &str, batch: &TrackerBatch) -> ParleyResult<()> {
        self.aggregator.record_trackers(conversation_id, batch).map(|_| ())
    }

    async fn entity_result(&self, conversation_id: &str, batch: &EntityBatch) -> ParleyResult<()> {
        self.aggregator.record_entities(conversation_id, batch).map(|_| ())
    }

    async fn conversation_teardown(&self, conversation_id: &str) -> ParleyResult<()> {
        self.teardown(conversation_id).await.map(|_| ())
    }
}
