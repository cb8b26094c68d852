//! Insight graph store trait and related types.
//!
//! The store holds insights recorded from past conversations. Parley only
//! reads from it: prior matches of a topic/tracker/entity identity, and
//! counts of those matches inside a trailing window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::MessageAuthor;
use crate::error::{ParleyError, ParleyResult};
use crate::types::InsightCategory;

/// Default number of prior matches returned per query.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Default deadline for a single store call.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

/// Category-specific identity that past matches are looked up by.
///
/// All fields are lower-cased on construction so lookups are
/// case-insensitive regardless of how the upstream engine capitalised them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityKey {
    Topic {
        phrase: String,
    },
    Tracker {
        name: String,
    },
    Entity {
        category: String,
        entity_type: String,
        sub_type: String,
        value: String,
    },
}

impl IdentityKey {
    pub fn topic(phrase: &str) -> Self {
        Self::Topic {
            phrase: phrase.to_lowercase(),
        }
    }

    pub fn tracker(name: &str) -> Self {
        Self::Tracker {
            name: name.to_lowercase(),
        }
    }

    pub fn entity(category: &str, entity_type: &str, sub_type: &str, value: &str) -> Self {
        Self::Entity {
            category: category.to_lowercase(),
            entity_type: entity_type.to_lowercase(),
            sub_type: sub_type.to_lowercase(),
            value: value.to_lowercase(),
        }
    }

    pub fn category(&self) -> InsightCategory {
        match self {
            Self::Topic { .. } => InsightCategory::Topic,
            Self::Tracker { .. } => InsightCategory::Tracker,
            Self::Entity { .. } => InsightCategory::Entity,
        }
    }

    /// Correlation key carried by outbound messages.
    ///
    /// Entities use `category/type/subType/value`.
    pub fn correlation(&self) -> String {
        match self {
            Self::Topic { phrase } => phrase.clone(),
            Self::Tracker { name } => name.clone(),
            Self::Entity {
                category,
                entity_type,
                sub_type,
                value,
            } => format!("{}/{}/{}/{}", category, entity_type, sub_type, value),
        }
    }
}

/// Which reference a prior match was recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// A transcript message.
    #[default]
    Message,
    /// Another insight (trackers only).
    Insight,
}

/// Lookup of prior matches in other conversations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorMatchQuery {
    /// Conversation to exclude.
    pub conversation_id: String,
    pub identity: IdentityKey,
    pub source: MatchSource,
    /// Maximum number of rows, most recent first.
    pub limit: usize,
}

/// A past occurrence of an identity, as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorMatch {
    /// Value recorded on the match relationship.
    pub match_value: String,
    /// Id of the referenced message or insight.
    pub message_id: String,
    /// Stored text. `None` when the store only kept the reference id.
    pub text: Option<String>,
    pub author: MessageAuthor,
    pub created: Option<DateTime<Utc>>,
}

/// Count of matches in other conversations created after `since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCountQuery {
    pub conversation_id: String,
    pub identity: IdentityKey,
    pub since: DateTime<Utc>,
}

/// Read-only access to recorded conversation insights.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightGraphStore: Send + Sync {
    /// Prior matches of an identity in other conversations, most recent
    /// first, at most `query.limit` rows.
    async fn prior_matches(&self, query: &PriorMatchQuery) -> ParleyResult<Vec<PriorMatch>>;

    /// Number of matches of an identity in other conversations since
    /// `query.since`.
    async fn count_matches(&self, query: &WindowCountQuery) -> ParleyResult<u64>;
}

/// Run a store call under a deadline. Expiry is a `GraphQuery` error with
/// code `NetTimeout`.
pub async fn with_deadline<T, F>(
    operation: &str,
    timeout: std::time::Duration,
    call: F,
) -> ParleyResult<T>
where
    F: std::future::Future<Output = ParleyResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = %operation, timeout_ms = timeout.as_millis() as u64, "Graph store call timed out");
            Err(ParleyError::graph_timeout(operation, timeout))
        }
    }
}

/// Graph store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphStoreConfig {
    /// Provider type.
    pub provider: GraphStoreProvider,
    /// Connection URL.
    pub url: String,
    /// Username for authentication. The password is read from
    /// `GRAPH_STORE_PASSWORD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Relationship property holding the conversation id.
    pub conversation_index: String,
    /// Deadline for each store call.
    pub query_timeout_ms: u64,
    /// Maximum prior matches per lookup.
    pub history_limit: usize,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            provider: GraphStoreProvider::Memory,
            url: "bolt://localhost:7687".to_string(),
            username: None,
            database: None,
            conversation_index: "conversationId".to_string(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl GraphStoreConfig {
    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.query_timeout_ms)
    }
}

/// Graph store provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphStoreProvider {
    #[default]
    Memory,
    Neo4j,
    Memgraph,
}
