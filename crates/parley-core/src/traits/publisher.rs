//! Outbound message publisher trait.

use async_trait::async_trait;

use crate::error::ParleyResult;

/// Fire-and-forget channel for outbound conversation messages.
///
/// Callers log a failed publish and move on; nothing is retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish serialized bytes on behalf of a conversation.
    async fn publish_message(&self, conversation_id: &str, data: Vec<u8>) -> ParleyResult<()>;
}
