//! parley-core - Core library for parley.
//!
//! Parley consumes streaming conversation insights (topics, trackers,
//! entities, questions, follow-ups, action items and raw messages) keyed by
//! conversation id. It keeps a bounded window of recent messages per
//! conversation, matches insight text against configured trigger patterns
//! and notifies a webhook or email sink at teardown, and correlates live
//! insights with a graph of past conversations.
//!
//! # Example
//!
//! ```ignore
//! use parley_core::{dispatch, ConversationEvent, PluginConfig, TriggerPlugin};
//!
//! let config = PluginConfig::from_env()?;
//! let plugin = TriggerPlugin::from_config(&config, None);
//!
//! let event: ConversationEvent = serde_json::from_slice(&body)?;
//! dispatch(&plugin, &event).await?;
//! ```

pub mod cache;
pub mod config;
pub mod correlation;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod plugin;
pub mod publish;
pub mod statistics;
pub mod traits;
pub mod triggers;
pub mod types;

// Re-export commonly used types
pub use cache::{CachedMessage, MessageAuthor, MessageCache, ResolvedMessage, MESSAGE_NOT_FOUND};
pub use config::{PluginConfig, SinkConfig, TriggerConfig};
pub use correlation::HistoricalCorrelator;
pub use error::{ErrorCode, ParleyError, ParleyResult};
pub use lifecycle::{AggregatedResult, Conversation, ConversationRegistry};
pub use notify::{build_sink, Notification, NotificationDispatcher, NotificationSink, TeardownOutcome};
pub use plugin::{
    dispatch, dispatch_raw, HistoricalPlugin, InsightCallback, StatisticalPlugin, TriggerPlugin,
};
pub use publish::{BroadcastPublisher, PublishedMessage};
pub use statistics::{StatWindow, StatisticalAggregator};
pub use traits::{
    GraphStoreConfig, GraphStoreProvider, IdentityKey, InsightGraphStore, MatchSource,
    MessagePublisher, PriorMatch,
};
pub use triggers::{TriggerAggregator, TriggerPatterns};
pub use types::{ConversationEvent, InsightCategory, InsightPayload};
