use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock, watch};

use crate::channel::invoke_handler;
use crate::{
    AckMode, BindingPattern, ChannelError, Delivery, EventChannel, EventEnvelope, MessageHandler,
    QueueOptions, Result, Subscription,
};

/// A message that exhausted its redeliveries.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: EventEnvelope,
    pub queue: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug)]
struct Message {
    envelope: EventEnvelope,
    attempt: u32,
}

struct QueueState {
    name: String,
    options: QueueOptions,
    messages: Mutex<VecDeque<Message>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    ready: Notify,
}

impl QueueState {
    fn new(name: &str, options: QueueOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            messages: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
            ready: Notify::new(),
        }
    }

    async fn push(&self, message: Message) {
        self.messages.lock().await.push_back(message);
        self.ready.notify_one();
    }

    /// Puts a failed message back at the head so it keeps its place.
    async fn requeue(&self, message: Message) {
        self.messages.lock().await.push_front(message);
        self.ready.notify_one();
    }

    async fn pop(&self) -> Option<Message> {
        self.messages.lock().await.pop_front()
    }
}

struct Binding {
    exchange: String,
    queue: String,
    pattern: BindingPattern,
}

#[derive(Default)]
struct Inner {
    exchanges: RwLock<HashSet<String>>,
    queues: RwLock<HashMap<String, Arc<QueueState>>>,
    bindings: RwLock<Vec<Binding>>,
    next_tag: AtomicU64,
}

/// In-process topic broker.
///
/// Queues buffer messages until a subscriber drains them, so events published
/// before a listener starts are not lost. Cloning yields a handle to the same
/// broker.
#[derive(Clone, Default)]
pub struct InMemoryEventChannel {
    inner: Arc<Inner>,
}

impl InMemoryEventChannel {
    /// Creates a new broker with no exchanges or queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting in a queue.
    pub async fn queue_depth(&self, queue: &str) -> Result<usize> {
        let state = self.queue(queue).await?;
        let depth = state.messages.lock().await.len();
        Ok(depth)
    }

    /// Messages that exhausted their redeliveries on a queue.
    pub async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        let state = self.queue(queue).await?;
        let letters = state.dead_letters.lock().await.clone();
        Ok(letters)
    }

    async fn queue(&self, name: &str) -> Result<Arc<QueueState>> {
        self.inner
            .queues
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ChannelError::QueueNotFound(name.to_string()))
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        let inserted = self.inner.exchanges.write().await.insert(name.to_string());
        if inserted {
            tracing::debug!(exchange = name, "declared exchange");
        }
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        let mut queues = self.inner.queues.write().await;
        if !queues.contains_key(name) {
            queues.insert(name.to_string(), Arc::new(QueueState::new(name, options)));
            tracing::debug!(queue = name, ?options, "declared queue");
        }
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, pattern: &str, exchange: &str) -> Result<()> {
        if !self.inner.exchanges.read().await.contains(exchange) {
            return Err(ChannelError::ExchangeNotFound(exchange.to_string()));
        }
        self.queue(queue).await?;
        let pattern = BindingPattern::parse(pattern)?;

        let mut bindings = self.inner.bindings.write().await;
        let exists = bindings
            .iter()
            .any(|b| b.exchange == exchange && b.queue == queue && b.pattern == pattern);
        if !exists {
            tracing::debug!(queue, exchange, pattern = %pattern, "bound queue");
            bindings.push(Binding {
                exchange: exchange.to_string(),
                queue: queue.to_string(),
                pattern,
            });
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, envelope: &EventEnvelope) -> Result<usize> {
        if !self.inner.exchanges.read().await.contains(exchange) {
            return Err(ChannelError::ExchangeNotFound(exchange.to_string()));
        }

        let routing_key = envelope.routing_key();
        // A queue bound by several matching patterns still gets one copy.
        let targets: BTreeSet<String> = self
            .inner
            .bindings
            .read()
            .await
            .iter()
            .filter(|b| b.exchange == exchange && b.pattern.matches(routing_key))
            .map(|b| b.queue.clone())
            .collect();

        let queues = self.inner.queues.read().await;
        let mut routed = 0;
        for name in &targets {
            if let Some(queue) = queues.get(name) {
                queue
                    .push(Message {
                        envelope: envelope.clone(),
                        attempt: 1,
                    })
                    .await;
                routed += 1;
            }
        }

        metrics::counter!("event_bus_published_total").increment(1);
        tracing::debug!(
            exchange,
            routing_key,
            event_id = %envelope.event_id,
            routed,
            "published event"
        );
        Ok(routed)
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let state = self.queue(queue).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(queue, handler = handler.name(), "starting queue listener");
        let task = tokio::spawn(run_listener(
            state,
            handler,
            self.inner.clone(),
            shutdown_rx,
        ));

        Ok(Subscription::new(queue, shutdown_tx, task))
    }
}

async fn run_listener(
    queue: Arc<QueueState>,
    handler: Arc<dyn MessageHandler>,
    inner: Arc<Inner>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.pop().await {
            Some(message) => dispatch(&queue, &handler, &inner, message).await,
            None => {
                tokio::select! {
                    _ = queue.ready.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    }

    tracing::info!(queue = %queue.name, handler = handler.name(), "queue listener stopped");
}

async fn dispatch(
    queue: &QueueState,
    handler: &Arc<dyn MessageHandler>,
    inner: &Inner,
    message: Message,
) {
    let delivery = Delivery {
        envelope: message.envelope.clone(),
        queue: queue.name.clone(),
        delivery_tag: inner.next_tag.fetch_add(1, Ordering::Relaxed) + 1,
        redelivered: message.attempt > 1,
        attempt: message.attempt,
    };

    let outcome = invoke_handler(handler.clone(), delivery).await;

    let error = match outcome {
        Ok(()) => {
            tracing::debug!(
                queue = %queue.name,
                handler = handler.name(),
                event_id = %message.envelope.event_id,
                attempt = message.attempt,
                "delivery acknowledged"
            );
            return;
        }
        Err(error) => error,
    };

    match queue.options.ack_mode {
        AckMode::Auto => {
            tracing::error!(
                queue = %queue.name,
                handler = handler.name(),
                event_id = %message.envelope.event_id,
                error = %error,
                "handler failed, message already acknowledged"
            );
        }
        AckMode::Manual if message.attempt > queue.options.max_redeliveries => {
            tracing::error!(
                queue = %queue.name,
                handler = handler.name(),
                event_id = %message.envelope.event_id,
                attempts = message.attempt,
                error = %error,
                "redeliveries exhausted, dead-lettering message"
            );
            metrics::counter!("event_bus_dead_lettered_total").increment(1);
            queue.dead_letters.lock().await.push(DeadLetter {
                envelope: message.envelope,
                queue: queue.name.clone(),
                attempts: message.attempt,
                last_error: error,
            });
        }
        AckMode::Manual => {
            tracing::warn!(
                queue = %queue.name,
                handler = handler.name(),
                event_id = %message.envelope.event_id,
                attempt = message.attempt,
                error = %error,
                "handler failed, requeueing message"
            );
            metrics::counter!("event_bus_redeliveries_total").increment(1);
            queue
                .requeue(Message {
                    envelope: message.envelope,
                    attempt: message.attempt + 1,
                })
                .await;
        }
    }
}
