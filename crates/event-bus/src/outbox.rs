//! Transactional outbox and the relay that drains it.
//!
//! A store that persists a state change writes the resulting events as
//! [`OutboxRecord`]s in the same operation. The [`OutboxRelay`] later
//! publishes pending records to the [`EventChannel`] and marks them, so a
//! broker outage delays events but never loses or rolls back a committed
//! change.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::{EventChannel, EventEnvelope, EventId, Result};

/// An event waiting to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    /// Exchange the event is published to.
    pub exchange: String,
    pub envelope: EventEnvelope,
    /// Failed publish attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Creates a pending record for an envelope.
    pub fn new(exchange: impl Into<String>, envelope: EventEnvelope) -> Self {
        Self {
            exchange: exchange.into(),
            envelope,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    /// Id of the wrapped event; also identifies the record.
    pub fn event_id(&self) -> EventId {
        self.envelope.event_id
    }

    /// True once the relay has published this record.
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// True when the record is still owed to the channel.
    pub fn is_pending(&self, max_attempts: u32) -> bool {
        !self.is_published() && self.attempts < max_attempts
    }
}

/// Storage side of the outbox.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Returns up to `limit` unpublished records that have failed fewer than
    /// `max_attempts` times, oldest first.
    async fn fetch_pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<OutboxRecord>>;

    /// Marks records as published.
    async fn mark_published(&self, event_ids: &[EventId]) -> Result<()>;

    /// Records a failed publish attempt.
    async fn mark_failed(&self, event_id: EventId, error: &str) -> Result<()>;
}

/// In-memory outbox.
///
/// Published records are dropped, so only pending and parked records are kept.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    records: Arc<RwLock<Vec<OutboxRecord>>>,
}

impl InMemoryOutbox {
    /// Creates a new empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends records.
    pub async fn append(&self, records: &[OutboxRecord]) {
        self.records.write().await.extend_from_slice(records);
    }

    /// Returns the records not yet published, including parked ones.
    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.records.read().await.clone()
    }

    /// Number of records not yet published.
    pub async fn unpublished_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn fetch_pending(&self, limit: usize, max_attempts: u32) -> Result<Vec<OutboxRecord>> {
        let records = self.records.read().await;
        let mut pending: Vec<_> = records
            .iter()
            .filter(|r| r.is_pending(max_attempts))
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_published(&self, event_ids: &[EventId]) -> Result<()> {
        let published: HashSet<EventId> = event_ids.iter().copied().collect();
        self.records
            .write()
            .await
            .retain(|r| !published.contains(&r.event_id()));
        Ok(())
    }

    async fn mark_failed(&self, event_id: EventId, error: &str) -> Result<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.iter_mut().find(|r| r.event_id() == event_id) {
            record.attempts += 1;
            record.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

/// Relay tuning.
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Records that failed this many times are no longer retried.
    pub max_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            batch_size: 100,
            max_attempts: 10,
        }
    }
}

/// Outcome of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
}

/// Moves pending outbox records onto the event channel.
pub struct OutboxRelay {
    outbox: Arc<dyn Outbox>,
    channel: Arc<dyn EventChannel>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn Outbox>, channel: Arc<dyn EventChannel>, config: RelayConfig) -> Self {
        Self {
            outbox,
            channel,
            config,
        }
    }

    /// Publishes one batch of pending records.
    #[tracing::instrument(skip(self))]
    pub async fn relay_once(&self) -> Result<RelayReport> {
        let pending = self
            .outbox
            .fetch_pending(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut report = RelayReport::default();
        let mut published = Vec::with_capacity(pending.len());

        for record in &pending {
            match self.channel.publish(&record.exchange, &record.envelope).await {
                Ok(_) => published.push(record.event_id()),
                Err(e) => {
                    tracing::warn!(
                        event_id = %record.event_id(),
                        routing_key = record.envelope.routing_key(),
                        attempts = record.attempts + 1,
                        error = %e,
                        "failed to publish outbox record"
                    );
                    self.outbox.mark_failed(record.event_id(), &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        if !published.is_empty() {
            self.outbox.mark_published(&published).await?;
            report.published = published.len();
            metrics::counter!("outbox_published_total").increment(published.len() as u64);
        }

        Ok(report)
    }

    /// Runs the relay on a fixed interval until the handle is shut down.
    ///
    /// A final pass runs on shutdown so events committed just before it are
    /// not left behind.
    pub fn spawn(self) -> RelayHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        // `time::interval` panics on a zero period.
        let interval = self.config.poll_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_pass().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            self.run_pass().await;
            tracing::info!("outbox relay stopped");
        });

        RelayHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run_pass(&self) {
        match self.relay_once().await {
            Ok(report) if report.published + report.failed > 0 => {
                tracing::debug!(
                    published = report.published,
                    failed = report.failed,
                    "outbox relay pass"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "outbox relay pass failed"),
        }
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Stops the relay after a final pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "outbox relay task ended abnormally");
        }
    }
}
