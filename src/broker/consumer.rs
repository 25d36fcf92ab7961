//! Consumer side of the broker bridge: a background task that polls topics
//! and dispatches each message to a stateless handler with a fresh
//! per-message context.

use crate::broker::queue::{BrokerError, Message, MessageQueue};
use crate::model::Model;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler may need for one message. Built fresh per message so
/// handlers stay stateless.
pub struct MessageContext {
    pub pool: PgPool,
    pub model: Model,
    pub message: Message,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: MessageContext) -> Result<(), BrokerError>;
}

/// Topic -> handler dispatch table.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    pub fn register(mut self, topic: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(topic.into(), handler);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Poll registered topics forever, dispatching one message at a time per
/// topic. Handler errors are logged and never stop the loop.
pub async fn run_consumer(
    queue: Arc<dyn MessageQueue>,
    registry: HandlerRegistry,
    pool: PgPool,
    model: Model,
) {
    if registry.is_empty() {
        tracing::info!("consumer started with no handlers; exiting");
        return;
    }
    tracing::info!(topics = registry.handlers.len(), "consumer started");
    loop {
        let mut idle = true;
        for (topic, handler) in &registry.handlers {
            match queue.subscribe(topic).await {
                Ok(Some(message)) => {
                    idle = false;
                    let ctx = MessageContext {
                        pool: pool.clone(),
                        model,
                        message,
                    };
                    if let Err(e) = handler.handle(ctx).await {
                        tracing::error!(topic = %topic, error = %e, "message handler failed");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "subscribe failed");
                }
            }
        }
        if idle {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Default handler: logs the message. Keeps the dispatch path exercised until
/// real handlers are registered.
pub struct LogHandler;

#[async_trait]
impl MessageHandler for LogHandler {
    async fn handle(&self, ctx: MessageContext) -> Result<(), BrokerError> {
        tracing::info!(
            topic = %ctx.message.topic,
            id = %ctx.message.id,
            "message received"
        );
        Ok(())
    }
}
