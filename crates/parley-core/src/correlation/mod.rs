//! Historical correlation.
//!
//! For each topic, tracker or entity match the correlator looks up prior
//! matches of the same identity in other conversations. When at least one
//! exists it builds a single [`HistoricalMessage`]: `current` holds the live
//! match once, `previous` holds one entry per prior hit, most recent first.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{MessageCache, ResolvedMessage};
use crate::error::ParleyResult;
use crate::lifecycle::Conversation;
use crate::traits::{
    with_deadline, GraphStoreConfig, IdentityKey, InsightGraphStore, MatchSource, PriorMatch,
    PriorMatchQuery, DEFAULT_HISTORY_LIMIT, DEFAULT_QUERY_TIMEOUT_MS,
};
use crate::types::{
    CorrelatedInsight, EntityBatch, HistoricalMessage, MessageRef, TopicBatch, TrackerBatch,
};

/// Looks up prior matches and shapes correlation messages.
#[derive(Clone)]
pub struct HistoricalCorrelator {
    store: Arc<dyn InsightGraphStore>,
    query_timeout: Duration,
    history_limit: usize,
}

impl HistoricalCorrelator {
    pub fn new(store: Arc<dyn InsightGraphStore>) -> Self {
        Self {
            store,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn from_config(store: Arc<dyn InsightGraphStore>, config: &GraphStoreConfig) -> Self {
        Self::new(store)
            .with_query_timeout(config.query_timeout())
            .with_history_limit(config.history_limit)
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Maximum prior matches per lookup (minimum 1).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Prior matches across the given sources, most recent first, capped at
    /// the history limit.
    pub async fn prior_matches(
        &self,
        conversation_id: &str,
        identity: &IdentityKey,
        sources: &[MatchSource],
    ) -> ParleyResult<Vec<PriorMatch>> {
        let mut matches = Vec::new();
        for source in sources {
            let query = PriorMatchQuery {
                conversation_id: conversation_id.to_string(),
                identity: identity.clone(),
                source: *source,
                limit: self.history_limit,
            };
            let rows =
                with_deadline("prior_matches", self.query_timeout, self.store.prior_matches(&query))
                    .await?;
            matches.extend(rows);
        }

        if sources.len() > 1 {
            // Rows without a timestamp sort last.
            matches.sort_by(|a, b| b.created.cmp(&a.created));
        }
        matches.truncate(self.history_limit);
        Ok(matches)
    }

    /// Build the correlation message for one identity, or `None` when it was
    /// never seen in another conversation.
    pub async fn correlate(
        &self,
        conversation: &Conversation,
        identity: &IdentityKey,
        sources: &[MatchSource],
        current: CorrelatedInsight,
    ) -> ParleyResult<Option<HistoricalMessage>> {
        let prior = self
            .prior_matches(conversation.id(), identity, sources)
            .await?;
        if prior.is_empty() {
            debug!(conversation_id = %conversation.id(), correlation = %identity.correlation(), "No prior matches");
            return Ok(None);
        }

        let mut message = HistoricalMessage::new(identity.category(), identity.correlation());
        message.historical.current.push(current);
        for hit in prior {
            debug!(
                conversation_id = %conversation.id(),
                correlation = %identity.correlation(),
                author = %hit.author.name,
                value = %hit.match_value,
                "Prior match"
            );
            message
                .historical
                .previous
                .push(previous_insight(conversation.cache(), hit));
        }
        Ok(Some(message))
    }

    /// One message per topic seen elsewhere.
    pub async fn correlate_topics(
        &self,
        conversation: &Conversation,
        batch: &TopicBatch,
    ) -> ParleyResult<Vec<HistoricalMessage>> {
        let mut messages = Vec::new();
        for topic in &batch.topics {
            let identity = IdentityKey::topic(&topic.phrases);
            let current = CorrelatedInsight::new(
                identity.correlation(),
                conversation.cache().resolve_all(&topic.message_references),
            );
            if let Some(message) = self
                .correlate(conversation, &identity, &[MatchSource::Message], current)
                .await?
            {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// One message per tracker seen elsewhere, looking at both message and
    /// insight references.
    pub async fn correlate_trackers(
        &self,
        conversation: &Conversation,
        batch: &TrackerBatch,
    ) -> ParleyResult<Vec<HistoricalMessage>> {
        let mut messages = Vec::new();
        for tracker in &batch.trackers {
            let identity = IdentityKey::tracker(&tracker.name);
            let current = match tracker.matches.first() {
                Some(first) => {
                    let refs: Vec<MessageRef> = first
                        .message_refs
                        .iter()
                        .chain(first.insight_refs.iter())
                        .cloned()
                        .collect();
                    CorrelatedInsight::new(
                        first.value.to_lowercase(),
                        conversation.cache().resolve_all(&refs),
                    )
                }
                None => CorrelatedInsight::new(identity.correlation(), Vec::new()),
            };
            if let Some(message) = self
                .correlate(
                    conversation,
                    &identity,
                    &[MatchSource::Message, MatchSource::Insight],
                    current,
                )
                .await?
            {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// One message per entity match seen elsewhere.
    pub async fn correlate_entities(
        &self,
        conversation: &Conversation,
        batch: &EntityBatch,
    ) -> ParleyResult<Vec<HistoricalMessage>> {
        let mut messages = Vec::new();
        for entity in &batch.entities {
            for entity_match in &entity.matches {
                let identity = IdentityKey::entity(
                    &entity.category,
                    &entity.entity_type,
                    &entity.sub_type,
                    &entity_match.detected_value,
                );
                let current = CorrelatedInsight::new(
                    entity_match.detected_value.to_lowercase(),
                    conversation.cache().resolve_all(&entity_match.message_refs),
                );
                if let Some(message) = self
                    .correlate(conversation, &identity, &[MatchSource::Message], current)
                    .await?
                {
                    messages.push(message);
                }
            }
        }
        Ok(messages)
    }
}

/// Stored text wins; a bare id goes through the message cache.
fn previous_insight(cache: &MessageCache, hit: PriorMatch) -> CorrelatedInsight {
    let message = match hit.text {
        Some(text) => ResolvedMessage {
            id: hit.message_id,
            text,
            author: hit.author,
        },
        None => {
            let mut resolved = cache.resolve(&MessageRef::bare(&hit.message_id));
            if !hit.author.id.is_empty() {
                resolved.author = hit.author;
            }
            resolved
        }
    };
    CorrelatedInsight::new(hit.match_value.to_lowercase(), vec![message])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MessageAuthor, MESSAGE_NOT_FOUND};
    use crate::error::{ErrorCode, ParleyError};
    use crate::lifecycle::ConversationRegistry;
    use crate::traits::MockInsightGraphStore;
    use crate::types::{Topic, Tracker, TrackerMatch};
    use chrono::{Duration as ChronoDuration, Utc};

    fn hit(value: &str, id: &str, text: Option<&str>, minutes_ago: i64) -> PriorMatch {
        PriorMatch {
            match_value: value.to_string(),
            message_id: id.to_string(),
            text: text.map(str::to_string),
            author: MessageAuthor {
                id: "u-9".into(),
                name: "Bob".into(),
                email: "bob@example.com".into(),
                user_id: String::new(),
            },
            created: Some(Utc::now() - ChronoDuration::minutes(minutes_ago)),
        }
    }

    fn conversation() -> Arc<Conversation> {
        let registry = ConversationRegistry::default();
        let conversation = registry.init("live");
        conversation.cache().push("m1", "let's talk pricing", "a1", "Alice", "");
        conversation
    }

    #[tokio::test]
    async fn test_no_prior_matches_emits_nothing() {
        let mut store = MockInsightGraphStore::new();
        store.expect_prior_matches().returning(|_| Ok(Vec::new()));

        let correlator = HistoricalCorrelator::new(Arc::new(store));
        let batch = TopicBatch {
            topics: vec![Topic::new("Pricing", vec![MessageRef::bare("m1")])],
        };
        let messages = correlator.correlate_topics(&conversation(), &batch).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_topic_correlation_shape() {
        let mut store = MockInsightGraphStore::new();
        store
            .expect_prior_matches()
            .withf(|q| {
                q.conversation_id == "live"
                    && q.identity == IdentityKey::topic("pricing")
                    && q.source == MatchSource::Message
                    && q.limit == 5
            })
            .times(1)
            .returning(|_| {
                Ok(vec![
                    hit("Pricing", "old-1", Some("what does pricing look like"), 10),
                    hit("pricing", "old-2", Some("pricing is too high"), 60),
                ])
            });

        let correlator = HistoricalCorrelator::new(Arc::new(store));
        let batch = TopicBatch {
            topics: vec![Topic::new("Pricing", vec![MessageRef::bare("m1")])],
        };
        let messages = correlator.correlate_topics(&conversation(), &batch).await.unwrap();

        assert_eq!(messages.len(), 1);
        let data = &messages[0].historical;
        assert_eq!(data.data_type, "historical_topic");
        assert_eq!(data.correlation, "pricing");
        assert_eq!(data.current.len(), 1);
        assert_eq!(data.current[0].messages[0].text, "let's talk pricing");
        assert_eq!(data.previous.len(), 2);
        assert_eq!(data.previous[0].correlation, "pricing");
        assert_eq!(data.previous[0].messages[0].author.name, "Bob");
    }

    #[tokio::test]
    async fn test_tracker_merges_sources_by_recency() {
        let mut store = MockInsightGraphStore::new();
        store.expect_prior_matches().times(2).returning(|q| {
            Ok(match q.source {
                MatchSource::Message => (0..4)
                    .map(|i| hit("refund", &format!("msg-{}", i), Some("t"), 10 + i * 20))
                    .collect(),
                MatchSource::Insight => (0..4)
                    .map(|i| hit("refund", &format!("ins-{}", i), Some("t"), 20 + i * 20))
                    .collect(),
            })
        });

        let correlator = HistoricalCorrelator::new(Arc::new(store));
        let batch = TrackerBatch {
            trackers: vec![Tracker {
                id: "t".into(),
                name: "Refund".into(),
                matches: vec![TrackerMatch {
                    value: "Money Back".into(),
                    message_refs: vec![MessageRef::with_text("live-9", "I want my money back")],
                    insight_refs: vec![],
                }],
            }],
        };

        let messages = correlator.correlate_trackers(&conversation(), &batch).await.unwrap();
        assert_eq!(messages.len(), 1);
        let data = &messages[0].historical;
        assert_eq!(data.data_type, "historical_tracker");
        assert_eq!(data.current[0].correlation, "money back");
        assert_eq!(data.current[0].messages[0].text, "I want my money back");

        let ids: Vec<&str> = data
            .previous
            .iter()
            .map(|p| p.messages[0].id.as_str())
            .collect();
        assert_eq!(ids, vec!["msg-0", "ins-0", "msg-1", "ins-1", "msg-2"]);
    }

    #[tokio::test]
    async fn test_bare_prior_reference_uses_cache_then_placeholder() {
        let mut store = MockInsightGraphStore::new();
        store
            .expect_prior_matches()
            .returning(|_| Ok(vec![hit("gold", "m1", None, 5), hit("gold", "gone", None, 6)]));

        let correlator = HistoricalCorrelator::new(Arc::new(store));
        let batch = EntityBatch {
            entities: vec![crate::types::Entity {
                category: "Custom".into(),
                entity_type: "Product".into(),
                sub_type: "Plan".into(),
                matches: vec![crate::types::EntityMatch {
                    detected_value: "Gold".into(),
                    message_refs: vec![],
                }],
            }],
        };

        let messages = correlator.correlate_entities(&conversation(), &batch).await.unwrap();
        let data = &messages[0].historical;
        assert_eq!(data.correlation, "custom/product/plan/gold");
        assert_eq!(data.previous[0].messages[0].text, "let's talk pricing");
        assert_eq!(data.previous[1].messages[0].text, MESSAGE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let mut store = MockInsightGraphStore::new();
        store
            .expect_prior_matches()
            .returning(|_| Err(ParleyError::graph_query("connection reset")));

        let correlator = HistoricalCorrelator::new(Arc::new(store));
        let batch = TopicBatch {
            topics: vec![Topic::new("pricing", vec![])],
        };
        let err = correlator.correlate_topics(&conversation(), &batch).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::GrpOperationFailed);
    }
}
