//! Plugin callback interface.
//!
//! Every plugin implements [`InsightCallback`], one method per inbound
//! event. Methods a plugin does not care about keep their no-op default.
//! [`dispatch`] routes a decoded [`ConversationEvent`] to the right method.

mod historical;
mod statistical;
mod trigger;

pub use historical::HistoricalPlugin;
pub use statistical::StatisticalPlugin;
pub use trigger::TriggerPlugin;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{ParleyError, ParleyResult};
use crate::traits::MessagePublisher;
use crate::types::{
    ActionItemBatch, ConversationEvent, EntityBatch, FollowUpBatch, InsightPayload, MessageBatch,
    QuestionBatch, TopicBatch, TrackerBatch,
};

/// Callback set invoked for conversation events.
#[async_trait]
pub trait InsightCallback: Send + Sync {
    /// Plugin name for logs and the health report.
    fn name(&self) -> &'static str;

    async fn conversation_initialized(&self, _conversation_id: &str) -> ParleyResult<()> {
        Ok(())
    }

    async fn message_result(&self, _conversation_id: &str, _batch: &MessageBatch) -> ParleyResult<()> {
        Ok(())
    }

    async fn question_result(
        &self,
        _conversation_id: &str,
        _batch: &QuestionBatch,
    ) -> ParleyResult<()> {
        Ok(())
    }

    async fn follow_up_result(
        &self,
        _conversation_id: &str,
        _batch: &FollowUpBatch,
    ) -> ParleyResult<()> {
        Ok(())
    }

    async fn action_item_result(
        &self,
        _conversation_id: &str,
        _batch: &ActionItemBatch,
    ) -> ParleyResult<()> {
        Ok(())
    }

    async fn topic_result(&self, _conversation_id: &str, _batch: &TopicBatch) -> ParleyResult<()> {
        Ok(())
    }

    async fn tracker_result(&self, _conversation_id: &str, _batch: &TrackerBatch) -> ParleyResult<()> {
        Ok(())
    }

    async fn entity_result(&self, _conversation_id: &str, _batch: &EntityBatch) -> ParleyResult<()> {
        Ok(())
    }

    async fn conversation_teardown(&self, _conversation_id: &str) -> ParleyResult<()> {
        Ok(())
    }

    /// An event type with no handler. Reported, never fatal to the process.
    async fn unhandled_message(&self, conversation_id: &str, message_type: &str) -> ParleyResult<()> {
        error!(plugin = self.name(), conversation_id = %conversation_id, message_type = %message_type, "Unhandled message");
        Err(ParleyError::unhandled(message_type))
    }
}

/// Route an event to the matching callback.
pub async fn dispatch(callback: &dyn InsightCallback, event: &ConversationEvent) -> ParleyResult<()> {
    let id = event.conversation_id.as_str();
    match &event.payload {
        InsightPayload::ConversationInit => callback.conversation_initialized(id).await,
        InsightPayload::Messages(batch) => callback.message_result(id, batch).await,
        InsightPayload::Questions(batch) => callback.question_result(id, batch).await,
        InsightPayload::FollowUps(batch) => callback.follow_up_result(id, batch).await,
        InsightPayload::ActionItems(batch) => callback.action_item_result(id, batch).await,
        InsightPayload::Topics(batch) => callback.topic_result(id, batch).await,
        InsightPayload::Trackers(batch) => callback.tracker_result(id, batch).await,
        InsightPayload::Entities(batch) => callback.entity_result(id, batch).await,
        InsightPayload::ConversationTeardown => callback.conversation_teardown(id).await,
        InsightPayload::Unknown => callback.unhandled_message(id, "unknown").await,
    }
}

/// Decode a JSON event and dispatch it.
///
/// Unknown `type` tags reach `unhandled_message` with the tag as sent.
pub async fn dispatch_raw(callback: &dyn InsightCallback, data: &[u8]) -> ParleyResult<()> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    let event: ConversationEvent = serde_json::from_value(value.clone())?;

    if event.payload == InsightPayload::Unknown {
        let message_type = value
            .pointer("/payload/type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        return callback
            .unhandled_message(&event.conversation_id, message_type)
            .await;
    }
    dispatch(callback, &event).await
}

/// Serialize and publish outbound messages. Failures are logged, never
/// retried.
pub(crate) async fn publish_all<T: Serialize>(
    publisher: &dyn MessagePublisher,
    plugin: &'static str,
    conversation_id: &str,
    messages: &[T],
) -> usize {
    let mut published = 0;
    for message in messages {
        let data = match serde_json::to_vec(message) {
            Ok(data) => data,
            Err(e) => {
                warn!(plugin, conversation_id = %conversation_id, error = %e, "Failed to serialize outbound message");
                continue;
            }
        };
        match publisher.publish_message(conversation_id, data).await {
            Ok(()) => published += 1,
            Err(e) => {
                warn!(plugin, conversation_id = %conversation_id, error = %e, "PublishMessage failed");
            }
        }
    }
    if published > 0 {
        debug!(plugin, conversation_id = %conversation_id, published, "Published outbound messages");
    }
    published
}
