use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{EventEnvelope, Result};

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// When a delivery counts as acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Acknowledged on receipt, before the handler runs. A failed handler
    /// loses the message.
    Auto,
    /// Acknowledged only after the handler succeeds. Failures are redelivered
    /// until `max_redeliveries` is exhausted, then dead-lettered.
    #[default]
    Manual,
}

/// Options applied when declaring a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Whether queued messages survive a restart. The PostgreSQL channel
    /// empties a non-durable queue the first time a process declares it; the
    /// in-memory channel keeps nothing across restarts either way.
    pub durable: bool,
    pub ack_mode: AckMode,
    /// How many times a failed delivery is retried in manual mode.
    pub max_redeliveries: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            durable: true,
            ack_mode: AckMode::Manual,
            max_redeliveries: 5,
        }
    }
}

impl QueueOptions {
    /// Durable queue with at-most-once delivery.
    pub fn auto_ack() -> Self {
        Self {
            ack_mode: AckMode::Auto,
            max_redeliveries: 0,
            ..Self::default()
        }
    }

    /// Durable queue acknowledged after successful handling.
    pub fn manual_ack(max_redeliveries: u32) -> Self {
        Self {
            ack_mode: AckMode::Manual,
            max_redeliveries,
            ..Self::default()
        }
    }
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Manual => "manual",
        }
    }
}

impl std::str::FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(AckMode::Auto),
            "manual" => Ok(AckMode::Manual),
            other => Err(format!("unknown ack mode: {other}")),
        }
    }
}

/// A message handed to a [`MessageHandler`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: EventEnvelope,
    /// Queue the message was consumed from.
    pub queue: String,
    /// Monotonic per-channel tag identifying this delivery attempt.
    pub delivery_tag: u64,
    /// True when a previous attempt at this message failed.
    pub redelivered: bool,
    /// 1 for the first delivery, incremented on each redelivery.
    pub attempt: u32,
}

/// Consumer of deliveries from a single queue.
///
/// Handlers must tolerate seeing the same event more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handler name, used in logs and metrics.
    fn name(&self) -> &str;

    /// Processes one delivery.
    async fn handle(&self, delivery: &Delivery) -> std::result::Result<(), HandlerError>;
}

/// A topic-based publish/subscribe channel.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Declares a topic exchange. Declaring an existing exchange is a no-op.
    async fn declare_exchange(&self, name: &str) -> Result<()>;

    /// Declares a queue. Declaring an existing queue keeps its original options.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()>;

    /// Routes messages whose key matches `pattern` on `exchange` into `queue`.
    async fn bind_queue(&self, queue: &str, pattern: &str, exchange: &str) -> Result<()>;

    /// Publishes an envelope using its event type as routing key.
    ///
    /// Returns the number of queues the message was routed to. A message that
    /// matches no binding is dropped and 0 is returned.
    async fn publish(&self, exchange: &str, envelope: &EventEnvelope) -> Result<usize>;

    /// Starts a background listener that feeds `queue` to `handler`.
    async fn subscribe(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;
}

/// Handle to a running queue listener.
///
/// Call [`Subscription::shutdown`] to stop the listener after its in-flight
/// message. Dropping the handle also stops it once the queue is idle.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wraps a listener task and the sender used to stop it.
    pub fn new(queue: impl Into<String>, shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self {
            queue: queue.into(),
            shutdown,
            task,
        }
    }

    /// Queue this subscription consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns true once the listener task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the listener to stop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(queue = %self.queue, error = %e, "listener task ended abnormally");
        }
    }
}

/// Runs the handler on its own task so a panic is reported as a failure
/// instead of killing the listener.
pub(crate) async fn invoke_handler(
    handler: Arc<dyn MessageHandler>,
    delivery: Delivery,
) -> std::result::Result<(), String> {
    let task = tokio::spawn(async move {
        handler
            .handle(&delivery)
            .await
            .map_err(|e| e.to_string())
    });

    match task.await {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err("handler panicked".to_string()),
        Err(join) => Err(join.to_string()),
    }
}
