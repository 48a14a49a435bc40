//! PostgreSQL-backed topic broker.
//!
//! Exchanges, queues and bindings are rows, and every routed copy of an event
//! is a row in `event_messages` until its consumer acknowledges it. A process
//! that dies mid-delivery leaves the row behind with an expired lease, so the
//! next listener on the queue picks it up again.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::{Mutex, watch};

use crate::channel::invoke_handler;
use crate::{
    AckMode, BindingPattern, ChannelError, DeadLetter, Delivery, EventChannel, EventEnvelope,
    MessageHandler, QueueOptions, Result, Subscription,
};

/// Listener tuning for [`PostgresEventChannel`].
#[derive(Debug, Clone, Copy)]
pub struct PostgresChannelConfig {
    /// How long an idle listener waits before polling its queue again.
    pub poll_interval: Duration,
    /// How long a claimed message stays invisible to other listeners.
    pub lease: Duration,
}

impl Default for PostgresChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            lease: Duration::from_secs(30),
        }
    }
}

/// A claimed message row.
struct Claimed {
    id: i64,
    envelope: EventEnvelope,
    attempt: u32,
}

/// Topic broker persisted in PostgreSQL.
///
/// Cloning yields a handle to the same broker.
#[derive(Clone)]
pub struct PostgresEventChannel {
    pool: PgPool,
    config: PostgresChannelConfig,
    /// Queues this process has declared.
    declared: Arc<Mutex<HashSet<String>>>,
    next_tag: Arc<AtomicU64>,
}

impl PostgresEventChannel {
    /// Creates a channel over the given pool. The `event_*` tables come from
    /// the workspace migrations.
    pub fn new(pool: PgPool, config: PostgresChannelConfig) -> Self {
        Self {
            pool,
            config,
            declared: Arc::new(Mutex::new(HashSet::new())),
            next_tag: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of messages waiting in a queue, in flight ones included.
    pub async fn queue_depth(&self, queue: &str) -> Result<usize> {
        self.queue_options(queue).await?;
        let depth: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_messages WHERE queue = $1 AND NOT dead")
                .bind(queue)
                .fetch_one(&self.pool)
                .await?;
        Ok(usize::try_from(depth).unwrap_or_default())
    }

    /// Messages that exhausted their redeliveries on a queue, oldest first.
    pub async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        self.queue_options(queue).await?;
        let rows = sqlx::query(
            "SELECT envelope, attempt, last_error FROM event_messages
             WHERE queue = $1 AND dead ORDER BY id",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DeadLetter> {
                Ok(DeadLetter {
                    envelope: serde_json::from_value(row.try_get("envelope")?)?,
                    queue: queue.to_string(),
                    attempts: attempt_from(&row)?,
                    last_error: row
                        .try_get::<Option<String>, _>("last_error")?
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn queue_options(&self, name: &str) -> Result<QueueOptions> {
        let row = sqlx::query(
            "SELECT durable, ack_mode, max_redeliveries FROM event_queues WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ChannelError::QueueNotFound(name.to_string()))?;

        let ack_mode: String = row.try_get("ack_mode")?;
        let max_redeliveries: i32 = row.try_get("max_redeliveries")?;
        Ok(QueueOptions {
            durable: row.try_get("durable")?,
            ack_mode: ack_mode.parse().map_err(|e: String| {
                ChannelError::Database(sqlx::Error::Decode(e.into()))
            })?,
            max_redeliveries: u32::try_from(max_redeliveries).unwrap_or_default(),
        })
    }

    async fn exchange_exists(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM event_exchanges WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Takes the oldest visible message of a queue.
    ///
    /// Auto-ack queues delete the row as they take it; manual-ack queues lease
    /// it until it is acknowledged or released.
    async fn claim(&self, queue: &str, mode: AckMode) -> Result<Option<Claimed>> {
        const NEXT: &str = r#"
            SELECT id FROM event_messages
            WHERE queue = $1 AND NOT dead
              AND (locked_until IS NULL OR locked_until < NOW())
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        "#;

        let sql = match mode {
            AckMode::Auto => format!(
                "DELETE FROM event_messages WHERE id = ({NEXT})
                 RETURNING id, envelope, attempt + 1 AS attempt"
            ),
            AckMode::Manual => format!(
                "UPDATE event_messages
                 SET attempt = attempt + 1, locked_until = NOW() + make_interval(secs => $2)
                 WHERE id = ({NEXT})
                 RETURNING id, envelope, attempt"
            ),
        };

        let mut query = sqlx::query(&sql).bind(queue);
        if mode == AckMode::Manual {
            query = query.bind(self.config.lease.as_secs_f64());
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Claimed {
                id: row.try_get("id")?,
                envelope: serde_json::from_value(row.try_get("envelope")?)?,
                attempt: attempt_from(&row)?,
            })),
            None => Ok(None),
        }
    }

    async fn ack(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM event_messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Makes a failed message visible again, or parks it as dead.
    async fn release(&self, id: i64, error: &str, dead: bool) -> Result<()> {
        sqlx::query(
            "UPDATE event_messages SET locked_until = NULL, last_error = $2, dead = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(dead)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dispatch(
        &self,
        queue: &str,
        options: QueueOptions,
        handler: &Arc<dyn MessageHandler>,
        message: Claimed,
    ) -> Result<()> {
        let event_id = message.envelope.event_id;
        let delivery = Delivery {
            envelope: message.envelope,
            queue: queue.to_string(),
            delivery_tag: self.next_tag.fetch_add(1, Ordering::Relaxed) + 1,
            redelivered: message.attempt > 1,
            attempt: message.attempt,
        };

        let error = match invoke_handler(handler.clone(), delivery).await {
            Ok(()) => {
                if options.ack_mode == AckMode::Manual {
                    self.ack(message.id).await?;
                }
                tracing::debug!(
                    queue,
                    handler = handler.name(),
                    %event_id,
                    attempt = message.attempt,
                    "delivery acknowledged"
                );
                return Ok(());
            }
            Err(error) => error,
        };

        match options.ack_mode {
            AckMode::Auto => {
                tracing::error!(
                    queue,
                    handler = handler.name(),
                    %event_id,
                    error = %error,
                    "handler failed, message already acknowledged"
                );
            }
            AckMode::Manual if message.attempt > options.max_redeliveries => {
                tracing::error!(
                    queue,
                    handler = handler.name(),
                    %event_id,
                    attempts = message.attempt,
                    error = %error,
                    "redeliveries exhausted, dead-lettering message"
                );
                metrics::counter!("event_bus_dead_lettered_total").increment(1);
                self.release(message.id, &error, true).await?;
            }
            AckMode::Manual => {
                tracing::warn!(
                    queue,
                    handler = handler.name(),
                    %event_id,
                    attempt = message.attempt,
                    error = %error,
                    "handler failed, requeueing message"
                );
                metrics::counter!("event_bus_redeliveries_total").increment(1);
                self.release(message.id, &error, false).await?;
            }
        }
        Ok(())
    }
}

fn attempt_from(row: &PgRow) -> Result<u32> {
    let attempt: i32 = row.try_get("attempt")?;
    Ok(u32::try_from(attempt).unwrap_or_default())
}

#[async_trait]
impl EventChannel for PostgresEventChannel {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        let inserted =
            sqlx::query("INSERT INTO event_exchanges (name) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(name)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if inserted > 0 {
            tracing::debug!(exchange = name, "declared exchange");
        }
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        sqlx::query(
            "INSERT INTO event_queues (name, durable, ack_mode, max_redeliveries)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(options.durable)
        .bind(options.ack_mode.as_str())
        .bind(i32::try_from(options.max_redeliveries).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;

        let first_in_process = self.declared.lock().await.insert(name.to_string());
        if first_in_process {
            let stored = self.queue_options(name).await?;
            if !stored.durable {
                let purged = sqlx::query("DELETE FROM event_messages WHERE queue = $1")
                    .bind(name)
                    .execute(&self.pool)
                    .await?
                    .rows_affected();
                tracing::info!(queue = name, purged, "emptied non-durable queue");
            }
            tracing::debug!(queue = name, options = ?stored, "declared queue");
        }
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, pattern: &str, exchange: &str) -> Result<()> {
        if !self.exchange_exists(exchange).await? {
            return Err(ChannelError::ExchangeNotFound(exchange.to_string()));
        }
        self.queue_options(queue).await?;
        let pattern = BindingPattern::parse(pattern)?;

        let inserted = sqlx::query(
            "INSERT INTO event_bindings (exchange, queue, pattern) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(exchange)
        .bind(queue)
        .bind(pattern.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        if inserted > 0 {
            tracing::debug!(queue, exchange, pattern = %pattern, "bound queue");
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, envelope: &EventEnvelope) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM event_exchanges WHERE name = $1)")
                .bind(exchange)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(ChannelError::ExchangeNotFound(exchange.to_string()));
        }

        let routing_key = envelope.routing_key();
        let bindings = sqlx::query("SELECT queue, pattern FROM event_bindings WHERE exchange = $1")
            .bind(exchange)
            .fetch_all(&mut *tx)
            .await?;

        // A queue bound by several matching patterns still gets one copy.
        let mut targets = BTreeSet::new();
        for row in bindings {
            let pattern: String = row.try_get("pattern")?;
            if BindingPattern::parse(&pattern)?.matches(routing_key) {
                targets.insert(row.try_get::<String, _>("queue")?);
            }
        }

        let payload = serde_json::to_value(envelope)?;
        for queue in &targets {
            // A republished event is queued once per queue.
            sqlx::query(
                "INSERT INTO event_messages (queue, event_id, envelope) VALUES ($1, $2, $3)
                 ON CONFLICT ON CONSTRAINT event_messages_once_per_queue DO NOTHING",
            )
            .bind(queue)
            .bind(envelope.event_id.as_uuid())
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let routed = targets.len();
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
        let options = self.queue_options(queue).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(queue, handler = handler.name(), "starting queue listener");
        let task = tokio::spawn(run_listener(
            self.clone(),
            queue.to_string(),
            options,
            handler,
            shutdown_rx,
        ));

        Ok(Subscription::new(queue, shutdown_tx, task))
    }
}

async fn run_listener(
    channel: PostgresEventChannel,
    queue: String,
    options: QueueOptions,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let idle = match channel.claim(&queue, options.ack_mode).await {
            Ok(Some(message)) => {
                if let Err(e) = channel.dispatch(&queue, options, &handler, message).await {
                    // The lease runs out and the message is delivered again.
                    tracing::error!(queue = %queue, error = %e, "failed to settle delivery");
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "failed to claim message");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = tokio::time::sleep(channel.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(queue = %queue, handler = handler.name(), "queue listener stopped");
}
