//! # Messaging
//!
//! At-least-once queue plumbing for filing events: the [`MessageBroker`]
//! abstraction, its in-memory and pgmq adapters, and the decoder that turns a
//! raw queue message into a [`FilingEvent`].

pub mod broker;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod pgmq_client;

pub use broker::MessageBroker;
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryBroker;
pub use message::{FilingEvent, QueueMessage};
pub use pgmq_client::PgmqBroker;
