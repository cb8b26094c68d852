//! Conversation lifecycle.
//!
//! A [`ConversationRegistry`] owns, per conversation id, the message cache,
//! the aggregated result and the trigger list. All three live in a single
//! [`Conversation`] entry, so they are created on init and removed on
//! teardown together. Operations against an id that is not registered fail
//! with `ConversationNotFound`; nothing is created implicitly.
//!
//! The registry map is only locked for insert/lookup/remove. Mutation of a
//! conversation's state happens under that conversation's own locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{MessageCache, DEFAULT_CACHE_CAPACITY};
use crate::error::{ParleyError, ParleyResult};
use crate::types::{
    ActionItemBatch, EntityBatch, FollowUpBatch, MessageBatch, QuestionBatch, TopicBatch,
    TrackerBatch,
};

/// Latest snapshot per insight category for one conversation.
///
/// Each category holds at most one snapshot; a newer event replaces the
/// previous one rather than merging with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_result: Option<MessageBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_result: Option<QuestionBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_result: Option<FollowUpBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_item_result: Option<ActionItemBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_result: Option<TopicBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_result: Option<TrackerBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_result: Option<EntityBatch>,
}

impl AggregatedResult {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }
}

/// Mutable per-conversation state guarded by the conversation lock.
#[derive(Debug, Default)]
pub struct ConversationState {
    pub result: AggregatedResult,
    pub triggers: Vec<String>,
}

/// Everything a conversation accumulated, taken at teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub result: AggregatedResult,
    pub triggers: Vec<String>,
}

/// One active conversation.
pub struct Conversation {
    id: String,
    cache: MessageCache,
    state: Mutex<ConversationState>,
}

impl Conversation {
    fn new(id: impl Into<String>, cache_capacity: usize) -> Self {
        let id = id.into();
        Self {
            cache: MessageCache::new(cache_capacity),
            state: Mutex::new(ConversationState {
                result: AggregatedResult::new(id.clone()),
                triggers: Vec::new(),
            }),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Cache every spoken message in the batch, in order.
    pub fn push_messages(&self, batch: &MessageBatch) {
        for message in &batch.messages {
            self.cache.push(
                &message.id,
                &message.text,
                &message.from.id,
                &message.from.name,
                &message.from.user_id,
            );
        }
    }

    /// Run `f` with exclusive access to this conversation's state.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut ConversationState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Append trigger descriptors in order.
    pub fn record_triggers(&self, descriptors: Vec<String>) {
        if descriptors.is_empty() {
            return;
        }
        self.with_state(|state| state.triggers.extend(descriptors));
    }

    /// Current trigger list.
    pub fn triggers(&self) -> Vec<String> {
        self.with_state(|state| state.triggers.clone())
    }

    /// Current aggregated result.
    pub fn result(&self) -> AggregatedResult {
        self.with_state(|state| state.result.clone())
    }

    fn take_snapshot(&self) -> ConversationSnapshot {
        self.with_state(|state| ConversationSnapshot {
            result: std::mem::take(&mut state.result),
            triggers: std::mem::take(&mut state.triggers),
        })
    }
}

/// Registry of active conversations.
pub struct ConversationRegistry {
    conversations: RwLock<HashMap<String, Arc<Conversation>>>,
    cache_capacity: usize,
}

impl ConversationRegistry {
    /// Create a registry whose conversations cache `cache_capacity` messages.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            cache_capacity,
        }
    }

    /// Register a conversation.
    ///
    /// Initializing an id that is already active keeps the existing state.
    pub fn init(&self, conversation_id: &str) -> Arc<Conversation> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = conversations.get(conversation_id) {
            warn!(conversation_id = %conversation_id, "Conversation already initialized, keeping state");
            return existing.clone();
        }

        debug!(conversation_id = %conversation_id, "Initialized conversation");
        let conversation = Arc::new(Conversation::new(conversation_id, self.cache_capacity));
        conversations.insert(conversation_id.to_string(), conversation.clone());
        conversation
    }

    /// Look up an active conversation.
    pub fn get(&self, conversation_id: &str) -> ParleyResult<Arc<Conversation>> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ParleyError::conversation_not_found(conversation_id))
    }

    /// Remove a conversation and return everything it accumulated.
    pub fn remove(&self, conversation_id: &str) -> ParleyResult<ConversationSnapshot> {
        let conversation = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id)
            .ok_or_else(|| ParleyError::conversation_not_found(conversation_id))?;

        debug!(conversation_id = %conversation_id, "Removed conversation");
        Ok(conversation.take_snapshot())
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(conversation_id)
    }

    /// Number of active conversations.
    pub fn len(&self) -> usize {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
