//! In-process broadcast publisher
//!
//! Delivers outbound messages to every subscriber over a tokio broadcast
//! channel. Slow subscribers miss messages rather than blocking plugins.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ParleyResult;
use crate::traits::MessagePublisher;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// A message handed to the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub conversation_id: String,
    pub data: Vec<u8>,
}

impl PublishedMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> ParleyResult<serde_json::Value> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// Broadcast publisher
///
/// If no subscribers are listening, messages are simply dropped.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PublishedMessage>,
}

impl BroadcastPublisher {
    /// Create a new publisher with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new publisher with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to messages published after this call.
    pub fn subscribe(&self) -> PublishSubscriber {
        PublishSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for BroadcastPublisher {
    async fn publish_message(&self, conversation_id: &str, data: Vec<u8>) -> ParleyResult<()> {
        let message = PublishedMessage {
            conversation_id: conversation_id.to_string(),
            data,
        };
        // No receivers is not an error.
        if self.sender.send(message).is_err() {
            tracing::trace!(conversation_id = %conversation_id, "Published with no subscribers");
        }
        Ok(())
    }
}

/// Subscriber to a [`BroadcastPublisher`]
pub struct PublishSubscriber {
    receiver: broadcast::Receiver<PublishedMessage>,
}

impl PublishSubscriber {
    /// Receive the next message
    ///
    /// Returns None once the publisher is dropped.
    pub async fn recv(&mut self) -> Option<PublishedMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Publish subscriber lagged by {} messages", n);
                    continue;
                }
            }
        }
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&mut self) -> Option<PublishedMessage> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<PublishedMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let publisher = BroadcastPublisher::new();
        let mut sub1 = publisher.subscribe();
        let mut sub2 = publisher.subscribe();

        publisher
            .publish_message("conv-1", br#"{"type":"user_defined"}"#.to_vec())
            .await
            .unwrap();

        let r1 = sub1.recv().await.unwrap();
        let r2 = sub2.recv().await.unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1.conversation_id, "conv-1");
        assert_eq!(r1.json().unwrap()["type"], "user_defined");
    }

    #[tokio::test]
    async fn test_no_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new();
        assert_eq!(publisher.subscriber_count(), 0);
        assert!(publisher.publish_message("conv-1", vec![1, 2, 3]).await.is_ok());
    }

    #[tokio::test]
    async fn test_drain_collects_buffered() {
        let publisher = BroadcastPublisher::new();
        let mut sub = publisher.subscribe();
        for i in 0..3 {
            publisher
                .publish_message(&format!("c{}", i), Vec::new())
                .await
                .unwrap();
        }
        let drained = sub.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[2].conversation_id, "c2");
        assert!(sub.try_recv().is_none());
    }
}
