//! Broker bridge: producer/consumer pass-through over a topic-addressed queue.

pub mod consumer;
pub mod producer;
pub mod queue;

pub use consumer::{run_consumer, HandlerRegistry, LogHandler, MessageContext, MessageHandler};
pub use producer::{EventAction, Producer};
pub use queue::{BrokerError, InMemoryMessageQueue, Message, MessageQueue};
