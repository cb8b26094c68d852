//! Inbound insight payloads.
//!
//! These mirror the JSON produced by the upstream analysis engine. Insight
//! events reference transcript messages by id; some references also carry
//! the referenced text inline.

use serde::{Deserialize, Serialize};

/// Speaker of a transcript message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speaker {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

/// A spoken transcript message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpokenMessage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub from: Speaker,
}

impl SpokenMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>, from: Speaker) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            from,
        }
    }
}

/// Reference from an insight to a transcript message or another insight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    /// Inline text, when the producer included it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessageRef {
    /// A bare reference that must be resolved through the message cache.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: None,
        }
    }

    /// A reference carrying its text inline.
    pub fn with_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: Some(text.into()),
        }
    }
}

/// A batch of transcript messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatch {
    #[serde(default)]
    pub messages: Vec<SpokenMessage>,
}

/// Text insight shared by questions, follow-ups and action items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInsight {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub message_refs: Vec<MessageRef>,
}

impl TextInsight {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            message_refs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBatch {
    #[serde(default)]
    pub questions: Vec<TextInsight>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpBatch {
    #[serde(default)]
    pub follow_ups: Vec<TextInsight>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemBatch {
    #[serde(default)]
    pub action_items: Vec<TextInsight>,
}

/// A detected topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "text")]
    pub phrases: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub message_references: Vec<MessageRef>,
}

impl Topic {
    pub fn new(phrases: impl Into<String>, message_references: Vec<MessageRef>) -> Self {
        Self {
            phrases: phrases.into(),
            message_references,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicBatch {
    #[serde(default)]
    pub topics: Vec<Topic>,
}

/// One occurrence of a tracker in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerMatch {
    pub value: String,
    #[serde(default)]
    pub message_refs: Vec<MessageRef>,
    #[serde(default)]
    pub insight_refs: Vec<MessageRef>,
}

/// A configured tracker and its matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub matches: Vec<TrackerMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerBatch {
    #[serde(default)]
    pub trackers: Vec<Tracker>,
}

/// One detected value of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMatch {
    pub detected_value: String,
    #[serde(default)]
    pub message_refs: Vec<MessageRef>,
}

/// A detected entity with its classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default)]
    pub category: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub matches: Vec<EntityMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBatch {
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_batch_from_engine_json() {
        let json = r#"{
            "trackers": [{
                "name": "Refund",
                "matches": [{
                    "value": "I want my money back",
                    "messageRefs": [{"id": "m1", "text": "I want my money back now"}],
                    "insightRefs": [{"id": "i1"}]
                }]
            }]
        }"#;

        let batch: TrackerBatch = serde_json::from_str(json).unwrap();
        let tracker = &batch.trackers[0];
        assert_eq!(tracker.name, "Refund");
        assert_eq!(tracker.matches[0].message_refs[0].text.as_deref(), Some("I want my money back now"));
        assert_eq!(tracker.matches[0].insight_refs[0].text, None);
    }

    #[test]
    fn test_entity_type_field_is_renamed() {
        let json = r#"{"entities":[{"category":"Custom","type":"Product","subType":"Plan","matches":[{"detectedValue":"Gold"}]}]}"#;
        let batch: EntityBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.entities[0].entity_type, "Product");
        assert_eq!(batch.entities[0].sub_type, "Plan");
        assert_eq!(batch.entities[0].matches[0].detected_value, "Gold");
    }

    #[test]
    fn test_topic_accepts_text_alias() {
        let topic: Topic = serde_json::from_str(r#"{"text":"billing","messageReferences":[{"id":"m1"}]}"#).unwrap();
        assert_eq!(topic.phrases, "billing");
        assert_eq!(topic.message_references, vec![MessageRef::bare("m1")]);
    }
}
