//! In-memory insight graph store.
//!
//! Keeps recorded matches in a vector. Lookups scan linearly, which is
//! fine for tests and small single-node deployments.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use parley_core::cache::MessageAuthor;
use parley_core::error::ParleyResult;
use parley_core::traits::{
    IdentityKey, InsightGraphStore, MatchSource, PriorMatch, PriorMatchQuery, WindowCountQuery,
};

/// A match recorded against an identity in some conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMatch {
    pub conversation_id: String,
    pub identity: IdentityKey,
    pub source: MatchSource,
    pub match_value: String,
    pub message_id: String,
    pub text: Option<String>,
    pub author: MessageAuthor,
    pub created: DateTime<Utc>,
}

impl RecordedMatch {
    pub fn new(
        conversation_id: impl Into<String>,
        identity: IdentityKey,
        match_value: impl Into<String>,
        message_id: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            identity,
            source: MatchSource::Message,
            match_value: match_value.into(),
            message_id: message_id.into(),
            text: None,
            author: MessageAuthor::default(),
            created,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_author(mut self, author: MessageAuthor) -> Self {
        self.author = author;
        self
    }

    pub fn with_source(mut self, source: MatchSource) -> Self {
        self.source = source;
        self
    }

    fn to_prior(&self) -> PriorMatch {
        PriorMatch {
            match_value: self.match_value.clone(),
            message_id: self.message_id.clone(),
            text: self.text.clone(),
            author: self.author.clone(),
            created: Some(self.created),
        }
    }
}

/// In-memory insight graph store.
#[derive(Clone, Default)]
pub struct InMemoryInsightGraph {
    matches: Arc<RwLock<Vec<RecordedMatch>>>,
}

impl InMemoryInsightGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a match.
    pub async fn record(&self, recorded: RecordedMatch) {
        self.matches.write().await.push(recorded);
    }

    /// Number of recorded matches.
    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl InsightGraphStore for InMemoryInsightGraph {
    async fn prior_matches(&self, query: &PriorMatchQuery) -> ParleyResult<Vec<PriorMatch>> {
        let matches = self.matches.read().await;
        let mut hits: Vec<&RecordedMatch> = matches
            .iter()
            .filter(|m| {
                m.identity == query.identity
                    && m.source == query.source
                    && m.conversation_id != query.conversation_id
            })
            .collect();

        hits.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(hits
            .into_iter()
            .take(query.limit)
            .map(RecordedMatch::to_prior)
            .collect())
    }

    async fn count_matches(&self, query: &WindowCountQuery) -> ParleyResult<u64> {
        let matches = self.matches.read().await;
        let count = matches
            .iter()
            .filter(|m| {
                m.identity == query.identity
                    && m.source == MatchSource::Message
                    && m.conversation_id != query.conversation_id
                    && m.created > query.since
            })
            .count();
        Ok(count as u64)
    }
}
