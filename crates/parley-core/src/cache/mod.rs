//! Bounded per-conversation message cache.
//!
//! Insight events reference transcript messages by id only. The cache keeps
//! a fixed window of the most recent messages so those references can be
//! turned back into text.
//!
//! Pushing an id that is still in the window overwrites its text and author
//! in place; the entry keeps its original position and is evicted when its
//! first insertion falls out of the window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::types::MessageRef;

/// Default number of messages retained per conversation.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Placeholder text for references that cannot be resolved.
pub const MESSAGE_NOT_FOUND: &str = "**MESSAGE NOT FOUND**";

/// A message retained by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    pub author_user_id: String,
}

/// Author attached to a resolved message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAuthor {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
}

/// A message reference resolved to human-readable text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMessage {
    pub id: String,
    pub text: String,
    pub author: MessageAuthor,
}

impl ResolvedMessage {
    /// The placeholder emitted for an unresolvable reference.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: MESSAGE_NOT_FOUND.to_string(),
            author: MessageAuthor::default(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.text != MESSAGE_NOT_FOUND
    }
}

impl From<CachedMessage> for ResolvedMessage {
    fn from(msg: CachedMessage) -> Self {
        Self {
            id: msg.id,
            text: msg.text,
            author: MessageAuthor {
                id: msg.author_id,
                name: msg.author_name,
                email: String::new(),
                user_id: msg.author_user_id,
            },
        }
    }
}

struct Window {
    order: VecDeque<String>,
    index: HashMap<String, CachedMessage>,
}

/// Fixed-capacity ordered window of messages with an id index.
///
/// Each cache owns its own lock; there is one cache per conversation.
pub struct MessageCache {
    capacity: usize,
    window: Mutex<Window>,
}

impl MessageCache {
    /// Create a cache retaining at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Mutex::new(Window {
                order: VecDeque::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        // Every mutation leaves order and index consistent.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a message at the newest position, evicting the oldest entry
    /// when the window is full.
    pub fn push(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        author_user_id: impl Into<String>,
    ) {
        let message = CachedMessage {
            id: id.into(),
            text: text.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            author_user_id: author_user_id.into(),
        };

        let mut window = self.lock();
        if let Some(existing) = window.index.get_mut(&message.id) {
            *existing = message;
            return;
        }

        window.order.push_back(message.id.clone());
        window.index.insert(message.id.clone(), message);

        while window.order.len() > self.capacity {
            if let Some(evicted) = window.order.pop_front() {
                window.index.remove(&evicted);
                tracing::trace!(message_id = %evicted, "Evicted message from cache");
            }
        }
    }

    /// Look up a message by id. Evicted or unknown ids return `None`.
    pub fn find(&self, id: &str) -> Option<CachedMessage> {
        self.lock().index.get(id).cloned()
    }

    /// Resolve a reference: inline text first, then the cache, then the
    /// not-found placeholder.
    pub fn resolve(&self, reference: &MessageRef) -> ResolvedMessage {
        if let Some(text) = &reference.text {
            let mut resolved = self
                .find(&reference.id)
                .map(ResolvedMessage::from)
                .unwrap_or_default();
            resolved.id = reference.id.clone();
            resolved.text = text.clone();
            return resolved;
        }

        match self.find(&reference.id) {
            Some(msg) => msg.into(),
            None => {
                tracing::debug!(message_id = %reference.id, "Message id not found in cache");
                ResolvedMessage::not_found(&reference.id)
            }
        }
    }

    /// Resolve every reference in order.
    pub fn resolve_all(&self, references: &[MessageRef]) -> Vec<ResolvedMessage> {
        references.iter().map(|r| self.resolve(r)).collect()
    }

    /// Number of messages currently retained.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(cache: &MessageCache, id: &str, text: &str) {
        cache.push(id, text, "author-1", "Alice", "alice@example.com");
    }

    #[test]
    fn test_find_after_push() {
        let cache = MessageCache::new(4);
        cache.push("m1", "hello there", "a1", "Alice", "u1");

        let found = cache.find("m1").unwrap();
        assert_eq!(found.text, "hello there");
        assert_eq!(found.author_id, "a1");
        assert_eq!(found.author_name, "Alice");
        assert_eq!(found.author_user_id, "u1");
    }

    #[test]
    fn test_eviction_keeps_capacity() {
        let cache = MessageCache::new(3);
        for i in 0..10 {
            push(&cache, &format!("m{}", i), "text");
            assert!(cache.len() <= 3);
        }

        assert_eq!(cache.len(), 3);
        for evicted in 0..7 {
            assert!(cache.find(&format!("m{}", evicted)).is_none());
        }
        for kept in 7..10 {
            assert!(cache.find(&format!("m{}", kept)).is_some());
        }
    }

    #[test]
    fn test_duplicate_push_overwrites_in_place() {
        let cache = MessageCache::new(2);
        push(&cache, "m1", "first");
        push(&cache, "m2", "second");
        push(&cache, "m1", "first, corrected");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.find("m1").unwrap().text, "first, corrected");

        // m1 kept its original (oldest) position and is evicted next.
        push(&cache, "m3", "third");
        assert!(cache.find("m1").is_none());
        assert!(cache.find("m2").is_some());
        assert!(cache.find("m3").is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = MessageCache::new(0);
        push(&cache, "m1", "only");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_prefers_inline_text() {
        let cache = MessageCache::new(4);
        cache.push("m1", "cached text", "a1", "Alice", "u1");

        let resolved = cache.resolve(&MessageRef::with_text("m1", "inline text"));
        assert_eq!(resolved.text, "inline text");
        assert_eq!(resolved.author.name, "Alice");

        let resolved = cache.resolve(&MessageRef::bare("m1"));
        assert_eq!(resolved.text, "cached text");
    }

    #[test]
    fn test_resolve_missing_uses_placeholder() {
        let cache = MessageCache::new(4);
        let resolved = cache.resolve(&MessageRef::bare("gone"));
        assert_eq!(resolved.id, "gone");
        assert_eq!(resolved.text, MESSAGE_NOT_FOUND);
        assert!(!resolved.is_found());
    }
}
