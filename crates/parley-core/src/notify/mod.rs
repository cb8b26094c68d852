//! Teardown notifications.
//!
//! When a conversation ends, everything it accumulated is removed from the
//! registry. If any trigger fired, the aggregated result and the trigger
//! list are delivered once to the configured sink. Delivery may retry
//! transient failures, but the conversation state is gone either way.

mod email;
mod webhook;

pub use email::EmailSink;
pub use webhook::{WebhookSink, DELIVERY_HEADER, SECRET_HEADER};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SinkConfig;
use crate::error::ParleyResult;
use crate::lifecycle::{AggregatedResult, ConversationRegistry, ConversationSnapshot};

/// Record delivered at teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub result: AggregatedResult,
    pub triggers: Vec<String>,
}

impl From<ConversationSnapshot> for Notification {
    fn from(snapshot: ConversationSnapshot) -> Self {
        Self {
            result: snapshot.result,
            triggers: snapshot.triggers,
        }
    }
}

/// Destination for teardown notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification. Retries, if any, happen inside.
    async fn deliver(&self, conversation_id: &str, notification: &Notification) -> ParleyResult<()>;

    /// Short sink name for logs.
    fn name(&self) -> &'static str;
}

/// Build the sink described by the configuration.
pub fn build_sink(config: &SinkConfig, secret: SecretString) -> ParleyResult<Arc<dyn NotificationSink>> {
    Ok(match config {
        SinkConfig::Webhook(webhook) => Arc::new(WebhookSink::new(webhook.clone(), secret)?),
        SinkConfig::Email(email) => Arc::new(EmailSink::new(email.clone(), secret)?),
    })
}

/// What happened at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// No trigger fired; nothing was sent.
    NoTriggers,
    /// Triggers fired and the sink accepted the notification.
    Delivered { triggers: usize },
    /// Triggers fired but no sink is configured.
    NoSink { triggers: usize },
}

/// Tears conversations down and sends their notifications.
pub struct NotificationDispatcher {
    registry: Arc<ConversationRegistry>,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConversationRegistry>, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    /// End a conversation.
    ///
    /// Fails with `ConversationNotFound` for an unknown id. The conversation
    /// is removed before delivery, so a delivery error still leaves it torn
    /// down.
    pub async fn teardown(&self, conversation_id: &str) -> ParleyResult<TeardownOutcome> {
        let snapshot = self.registry.remove(conversation_id)?;

        for trigger in &snapshot.triggers {
            debug!(conversation_id = %conversation_id, trigger = %trigger, "Trigger matched");
        }

        if snapshot.triggers.is_empty() {
            debug!(conversation_id = %conversation_id, "No triggers, nothing to notify");
            return Ok(TeardownOutcome::NoTriggers);
        }

        let triggers = snapshot.triggers.len();
        let Some(sink) = &self.sink else {
            warn!(conversation_id = %conversation_id, triggers, "Triggers fired but no sink is configured");
            return Ok(TeardownOutcome::NoSink { triggers });
        };

        let notification = Notification::from(snapshot);
        match sink.deliver(conversation_id, &notification).await {
            Ok(()) => {
                info!(conversation_id = %conversation_id, sink = sink.name(), triggers, "Notification delivered");
                Ok(TeardownOutcome::Delivered { triggers })
            }
            Err(e) => {
                error!(conversation_id = %conversation_id, sink = sink.name(), error = %e, "Notification delivery failed, triggers discarded");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;

    fn registry_with(triggers: &[&str]) -> Arc<ConversationRegistry> {
        let registry = Arc::new(ConversationRegistry::default());
        let conversation = registry.init("c1");
        conversation.record_triggers(triggers.iter().map(|t| t.to_string()).collect());
        registry
    }

    #[tokio::test]
    async fn test_no_triggers_sends_nothing() {
        let mut sink = MockNotificationSink::new();
        sink.expect_deliver().never();

        let registry = registry_with(&[]);
        let dispatcher = NotificationDispatcher::new(registry.clone(), Some(Arc::new(sink)));
        assert_eq!(dispatcher.teardown("c1").await.unwrap(), TeardownOutcome::NoTriggers);
        assert!(!registry.contains("c1"));
    }

    #[tokio::test]
    async fn test_triggers_are_delivered_once() {
        let mut sink = MockNotificationSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_deliver()
            .withf(|id, n| id.to_string() == "c1" && n.triggers == vec!["Question - refund?".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher =
            NotificationDispatcher::new(registry_with(&["Question - refund?"]), Some(Arc::new(sink)));
        assert_eq!(
            dispatcher.teardown("c1").await.unwrap(),
            TeardownOutcome::Delivered { triggers: 1 }
        );
        assert!(matches!(
            dispatcher.teardown("c1").await,
            Err(ParleyError::ConversationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_delivery_still_discards_state() {
        let mut sink = MockNotificationSink::new();
        sink.expect_name().return_const("mock");
        sink.expect_deliver()
            .times(1)
            .returning(|_, _| Err(ParleyError::delivery_rejected(400, "bad secret")));

        let registry = registry_with(&["Topic - pricing"]);
        let dispatcher = NotificationDispatcher::new(registry.clone(), Some(Arc::new(sink)));
        let err = dispatcher.teardown("c1").await.unwrap_err();
        assert!(matches!(err, ParleyError::Delivery { status: Some(400), .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_without_sink() {
        let dispatcher = NotificationDispatcher::new(registry_with(&["Entity - Gold"]), None);
        assert_eq!(
            dispatcher.teardown("c1").await.unwrap(),
            TeardownOutcome::NoSink { triggers: 1 }
        );
    }

    #[test]
    fn test_notification_flattens_result() {
        let notification = Notification {
            result: AggregatedResult::new("c1"),
            triggers: vec!["Question - why".into()],
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"conversationId": "c1", "triggers": ["Question - why"]})
        );
    }
}
