//! Message envelope and the queue seam the external broker client plugs into.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("queue is full")]
    QueueFull,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("connection: {0}")]
    Connection(String),
    #[error("handler: {0}")]
    Handler(String),
}

/// Envelope for one broker message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Message {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// The broker pass-through: publish to a topic, pull the next message from a
/// topic. Delivery guarantees, batching, and partitioning belong to the
/// implementation behind this trait, not to callers.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), BrokerError>;
    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, BrokerError>;
}

/// In-process topic-keyed queue. Stands in for an external broker in
/// development and tests; production deployments swap a real client behind
/// the MessageQueue trait.
pub struct InMemoryMessageQueue {
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
    max_size: usize,
}

impl InMemoryMessageQueue {
    pub fn new(max_size: usize) -> Self {
        InMemoryMessageQueue {
            queues: Mutex::new(HashMap::new()),
            max_size,
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), BrokerError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let queue = queues.entry(message.topic.clone()).or_default();
        if queue.len() >= self.max_size {
            return Err(BrokerError::QueueFull);
        }
        queue.push_back(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, BrokerError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(queues.get_mut(topic).and_then(VecDeque::pop_front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_then_subscribe_delivers_once() {
        let queue = InMemoryMessageQueue::new(16);
        let message = Message::new("invoice.created", json!({"id": "inv-1"}));
        queue.publish(message).await.unwrap();

        let received = queue.subscribe("invoice.created").await.unwrap().unwrap();
        assert_eq!(received.topic, "invoice.created");
        assert_eq!(received.payload["id"], json!("inv-1"));

        assert!(queue.subscribe("invoice.created").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let queue = InMemoryMessageQueue::new(16);
        queue
            .publish(Message::new("invoice.created", json!({})))
            .await
            .unwrap();
        assert!(queue.subscribe("payment.created").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn a_full_topic_rejects_publish() {
        let queue = InMemoryMessageQueue::new(1);
        queue.publish(Message::new("t", json!(1))).await.unwrap();
        assert!(matches!(
            queue.publish(Message::new("t", json!(2))).await,
            Err(BrokerError::QueueFull)
        ));
    }
}
