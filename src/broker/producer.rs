//! Producer side of the broker bridge: entity lifecycle events.

use crate::broker::queue::{BrokerError, Message, MessageQueue};
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Created => "created",
            EventAction::Updated => "updated",
            EventAction::Deleted => "deleted",
        }
    }
}

/// Thin pass-through over the queue. Topics are `{entity}.{action}`.
#[derive(Clone)]
pub struct Producer {
    queue: Arc<dyn MessageQueue>,
}

impl Producer {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Producer { queue }
    }

    pub async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BrokerError> {
        self.queue.publish(Message::new(topic, payload)).await
    }

    /// Publish an entity lifecycle event; failures are reported to the
    /// caller, which logs rather than failing the originating request.
    pub async fn entity_event(
        &self,
        entity: &str,
        action: EventAction,
        payload: serde_json::Value,
    ) -> Result<(), BrokerError> {
        let topic = format!("{}.{}", entity, action.as_str());
        self.publish(&topic, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::queue::InMemoryMessageQueue;
    use serde_json::json;

    #[tokio::test]
    async fn entity_events_use_dotted_topics() {
        let queue = Arc::new(InMemoryMessageQueue::new(16));
        let producer = Producer::new(queue.clone());
        producer
            .entity_event("invoice", EventAction::Created, json!({"id": "inv-1"}))
            .await
            .unwrap();
        let message = queue.subscribe("invoice.created").await.unwrap().unwrap();
        assert_eq!(message.payload["id"], json!("inv-1"));
    }
}
