//! Topic-routed event channel for booking events.
//!
//! Producers publish [`EventEnvelope`]s to a named topic exchange. Queues are
//! bound to an exchange with [`BindingPattern`]s and every queue whose pattern
//! matches the envelope's routing key receives its own copy. Each subscribed
//! queue is drained by a single background listener that runs its handler
//! sequentially.
//!
//! Events produced by a state change are not published directly: they are
//! written to an [`Outbox`] in the same store call as the change and the
//! [`OutboxRelay`] moves them onto the channel.
//!
//! [`InMemoryEventChannel`] keeps queues in process memory.
//! [`PostgresEventChannel`] keeps them in the database, so unacknowledged
//! deliveries survive a restart.

pub mod channel;
pub mod error;
pub mod event;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod routing;

pub use channel::{
    AckMode, Delivery, EventChannel, HandlerError, MessageHandler, QueueOptions, Subscription,
};
pub use error::{ChannelError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, JSON_CONTENT_TYPE};
pub use memory::{DeadLetter, InMemoryEventChannel};
pub use outbox::{
    InMemoryOutbox, Outbox, OutboxRecord, OutboxRelay, RelayConfig, RelayHandle, RelayReport,
};
pub use postgres::{PostgresChannelConfig, PostgresEventChannel};
pub use routing::BindingPattern;

/// Topic exchange carrying every booking lifecycle event.
pub const BOOKING_EXCHANGE: &str = "booking_events";
