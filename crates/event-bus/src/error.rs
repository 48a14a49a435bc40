use thiserror::Error;

/// Errors that can occur when interacting with the event channel or outbox.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Publishing or binding referenced an exchange that was never declared.
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// Binding or subscribing referenced a queue that was never declared.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// A binding pattern could not be parsed.
    #[error("Invalid binding pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// An envelope was built without a required field.
    #[error("Incomplete event envelope: missing {0}")]
    IncompleteEnvelope(&'static str),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The channel has been shut down.
    #[error("Event channel is closed")]
    Closed,

    /// The PostgreSQL channel's storage failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The outbox backing store failed.
    #[error("Outbox error: {0}")]
    Outbox(String),
}

/// Result type for event channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
