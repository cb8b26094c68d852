//! Trigger aggregation.
//!
//! For every insight event the aggregator stores the payload as the
//! category's latest snapshot and tests each text field against that
//! category's patterns. Every match appends one `"<Category> - <text>"`
//! descriptor; matches are not deduplicated.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::ParleyResult;
use crate::lifecycle::{AggregatedResult, Conversation, ConversationRegistry};
use crate::types::{
    ActionItemBatch, EntityBatch, FollowUpBatch, InsightCategory, InsightPayload, MessageBatch,
    QuestionBatch, TopicBatch, TrackerBatch,
};

use super::patterns::TriggerPatterns;

/// Matches insight text against trigger patterns and accumulates results.
pub struct TriggerAggregator {
    patterns: TriggerPatterns,
    registry: Arc<ConversationRegistry>,
}

impl TriggerAggregator {
    pub fn new(patterns: TriggerPatterns, registry: Arc<ConversationRegistry>) -> Self {
        Self { patterns, registry }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    pub fn patterns(&self) -> &TriggerPatterns {
        &self.patterns
    }

    /// Descriptors produced by testing one text field. `label` is what ends
    /// up after the category name.
    fn match_field(&self, category: InsightCategory, subject: &str, label: &str) -> Vec<String> {
        let mut descriptors = Vec::new();
        for pattern in self.patterns.for_category(category) {
            if pattern.is_match(subject) {
                debug!(category = %category, pattern = %pattern.as_str(), text = %label, "Trigger matched");
                descriptors.push(format!("{} - {}", category, label));
            } else {
                trace!(category = %category, pattern = %pattern.as_str(), text = %subject, "No match");
            }
        }
        descriptors
    }

    fn match_texts<'a>(
        &self,
        category: InsightCategory,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        texts
            .into_iter()
            .flat_map(|text| self.match_field(category, text, text))
            .collect()
    }

    fn conversation(&self, conversation_id: &str) -> ParleyResult<Arc<Conversation>> {
        self.registry.get(conversation_id)
    }

    /// Cache spoken messages and store the batch as the message snapshot.
    pub fn record_messages(&self, conversation_id: &str, batch: &MessageBatch) -> ParleyResult<()> {
        let conversation = self.conversation(conversation_id)?;
        conversation.push_messages(batch);
        conversation.with_state(|state| state.result.message_result = Some(batch.clone()));
        Ok(())
    }

    pub fn record_questions(
        &self,
        conversation_id: &str,
        batch: &QuestionBatch,
    ) -> ParleyResult<Vec<String>> {
        let conversation = self.conversation(conversation_id)?;
        let descriptors = self.match_texts(
            InsightCategory::Question,
            batch.questions.iter().map(|q| q.text.as_str()),
        );
        Ok(commit(&conversation, descriptors, |result| {
            result.question_result = Some(batch.clone())
        }))
    }

    pub fn record_follow_ups(
        &self,
        conversation_id: &str,
        batch: &FollowUpBatch,
    ) -> ParleyResult<Vec<String>> {
        let conversation = self.conversation(conversation_id)?;
        let descriptors = self.match_texts(
            InsightCategory::FollowUp,
            batch.follow_ups.iter().map(|f| f.text.as_str()),
        );
        Ok(commit(&conversation, descriptors, |result| {
            result.follow_up_result = Some(batch.clone())
        }))
    }

    pub fn record_action_items(
        &self,
        conversation_id: &str,
        batch: &ActionItemBatch,
    ) -> ParleyResult<Vec<String>> {
        let conversation = self.conversation(conversation_id)?;
        let descriptors = self.match_texts(
            InsightCategory::ActionItem,
            batch.action_items.iter().map(|a| a.text.as_str()),
        );
        Ok(commit(&conversation, descriptors, |result| {
            result.action_item_result = Some(batch.clone())
        }))
    }

    pub fn record_topics(
        &self,
        conversation_id: &str,
        batch: &TopicBatch,
    ) -> ParleyResult<Vec<String>> {
        let conversation = self.conversation(conversation_id)?;
        let descriptors = self.match_texts(
            InsightCategory::Topic,
            batch.topics.iter().map(|t| t.phrases.as_str()),
        );
        Ok(commit(&conversation, descriptors, |result| {
            result.topic_result = Some(batch.clone())
        }))
    }

    /// Trackers are matched on their name; one descriptor per tracker match
    /// per pattern, labelled `name/value`.
    pub fn record_trackers(
        &self,
        conversation_id: &str,
        batch: &TrackerBatch,
    ) -> ParleyResult<Vec<String>> {
        let conversation = self.conversation(conversation_id)?;
        let mut descriptors = Vec::new();
        for tracker in &batch.trackers {
            for tracker_match in &tracker.matches {
                let label = format!("{}/{}", tracker.name, tracker_match.value);
                descriptors.extend(self.match_field(InsightCategory::Tracker, &tracker.name, &label));
            }
        }
        Ok(commit(&conversation, descriptors, |result| {
            result.tracker_result = Some(batch.clone())
        }))
    }

    /// Entities are matched on each detected value.
    pub fn record_entities(
        &self,
        conversation_id: &str,
        batch: &EntityBatch,
    ) -> ParleyResult<Vec<String>> {
        let conversation = self.conversation(conversation_id)?;
        let descriptors = self.match_texts(
            InsightCategory::Entity,
            batch
                .entities
                .iter()
                .flat_map(|e| e.matches.iter().map(|m| m.detected_value.as_str())),
        );
        Ok(commit(&conversation, descriptors, |result| {
            result.entity_result = Some(batch.clone())
        }))
    }

    /// Route an insight payload to its category.
    ///
    /// Lifecycle and unknown payloads record nothing and return no
    /// descriptors.
    pub fn record(&self, conversation_id: &str, payload: &InsightPayload) -> ParleyResult<Vec<String>> {
        match payload {
            InsightPayload::Messages(batch) => {
                self.record_messages(conversation_id, batch)?;
                Ok(Vec::new())
            }
            InsightPayload::Questions(batch) => self.record_questions(conversation_id, batch),
            InsightPayload::FollowUps(batch) => self.record_follow_ups(conversation_id, batch),
            InsightPayload::ActionItems(batch) => self.record_action_items(conversation_id, batch),
            InsightPayload::Topics(batch) => self.record_topics(conversation_id, batch),
            InsightPayload::Trackers(batch) => self.record_trackers(conversation_id, batch),
            InsightPayload::Entities(batch) => self.record_entities(conversation_id, batch),
            InsightPayload::ConversationInit
            | InsightPayload::ConversationTeardown
            | InsightPayload::Unknown => Ok(Vec::new()),
        }
    }
}

/// Replace the category snapshot and append descriptors under one lock.
fn commit(
    conversation: &Conversation,
    descriptors: Vec<String>,
    store: impl FnOnce(&mut AggregatedResult),
) -> Vec<String> {
    conversation.with_state(|state| {
        store(&mut state.result);
        state.triggers.extend(descriptors.iter().cloned());
    });
    descriptors
}
