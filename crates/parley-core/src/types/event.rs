//! Conversation-scoped inbound events.

use serde::{Deserialize, Serialize};

use super::category::InsightCategory;
use super::insight::{
    ActionItemBatch, EntityBatch, FollowUpBatch, MessageBatch, QuestionBatch, TopicBatch,
    TrackerBatch,
};

/// Payload of an inbound event, tagged by `type`.
///
/// Unknown tags deserialize to [`InsightPayload::Unknown`] so the router can
/// report them instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsightPayload {
    ConversationInit,
    ConversationTeardown,
    Messages(MessageBatch),
    Questions(QuestionBatch),
    FollowUps(FollowUpBatch),
    ActionItems(ActionItemBatch),
    Topics(TopicBatch),
    Trackers(TrackerBatch),
    Entities(EntityBatch),
    #[serde(other)]
    Unknown,
}

impl InsightPayload {
    /// Category of the payload, if it carries insight data.
    pub fn category(&self) -> Option<InsightCategory> {
        match self {
            Self::Messages(_) => Some(InsightCategory::Message),
            Self::Questions(_) => Some(InsightCategory::Question),
            Self::FollowUps(_) => Some(InsightCategory::FollowUp),
            Self::ActionItems(_) => Some(InsightCategory::ActionItem),
            Self::Topics(_) => Some(InsightCategory::Topic),
            Self::Trackers(_) => Some(InsightCategory::Tracker),
            Self::Entities(_) => Some(InsightCategory::Entity),
            Self::ConversationInit | Self::ConversationTeardown | Self::Unknown => None,
        }
    }
}

/// An inbound event scoped to one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    pub conversation_id: String,
    pub payload: InsightPayload,
}

impl ConversationEvent {
    pub fn new(conversation_id: impl Into<String>, payload: InsightPayload) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagging() {
        let payload: InsightPayload =
            serde_json::from_str(r#"{"type":"questions","questions":[{"text":"can I get a refund?"}]}"#)
                .unwrap();
        assert_eq!(payload.category(), Some(InsightCategory::Question));

        let init: InsightPayload = serde_json::from_str(r#"{"type":"conversation_init"}"#).unwrap();
        assert_eq!(init, InsightPayload::ConversationInit);
    }

    #[test]
    fn test_unknown_tag_decodes_to_unknown() {
        let payload: InsightPayload =
            serde_json::from_str(r#"{"type":"recognition_result","isFinal":true}"#).unwrap();
        assert_eq!(payload, InsightPayload::Unknown);
        assert_eq!(payload.category(), None);
    }

    #[test]
    fn test_event_envelope() {
        let json = r#"{"conversationId":"c-1","payload":{"type":"topics","topics":[{"phrases":"pricing"}]}}"#;
        let event: ConversationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.conversation_id, "c-1");
        match event.payload {
            InsightPayload::Topics(batch) => assert_eq!(batch.topics[0].phrases, "pricing"),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
