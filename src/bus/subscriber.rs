//! Long-lived subscription over one or more streams.

use super::codec::decode_entry;
use super::traits::{Cursor, StreamSource};
use crate::config::BusConfig;
use crate::model::Event;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Receives decoded events, one at a time, in per-stream publish order.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. An `Err` is logged by the subscriber; the cursor
    /// still advances past the entry.
    async fn on_event(&self, stream: &str, event: Event) -> anyhow::Result<()>;
}

/// Polling parameters for a subscription.
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    /// Longest a single poll waits for new entries
    pub block: Duration,
    /// Maximum entries fetched per stream per poll
    pub batch_size: usize,
    /// Fixed wait after a failed read
    pub retry_backoff: Duration,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

impl From<&BusConfig> for SubscriberOptions {
    fn from(config: &BusConfig) -> Self {
        Self {
            block: Duration::from_millis(config.block_ms),
            batch_size: config.batch_size,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Delivers bus entries to an `EventHandler` until cancelled.
///
/// Each stream has its own cursor starting at the stream's tail, so only
/// entries published after the subscription starts are delivered. A handler
/// call completes before the next entry is delivered.
pub struct StreamSubscriber {
    source: Arc<dyn StreamSource>,
    options: SubscriberOptions,
}

impl StreamSubscriber {
    pub fn new(source: Arc<dyn StreamSource>, options: SubscriberOptions) -> Self {
        Self { source, options }
    }

    /// Run the subscription loop until `shutdown` turns `true` or its sender
    /// is dropped.
    ///
    /// Read failures are retried after `retry_backoff` without moving any
    /// cursor. Cancellation is checked before every poll and interrupts the
    /// backoff wait; a handler call in progress is allowed to finish.
    pub async fn subscribe(
        &self,
        streams: &[&str],
        handler: &dyn EventHandler,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(?streams, "Subscribing to streams");
        let mut cursors = self.initial_cursors(streams).await;

        loop {
            if is_cancelled(&shutdown) {
                info!("Subscription cancelled");
                return;
            }

            let batches = match self
                .source
                .read(&cursors, self.options.batch_size, self.options.block)
                .await
            {
                Ok(batches) => batches,
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_ms = self.options.retry_backoff.as_millis() as u64,
                        "Failed to read from streams, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.retry_backoff) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            };

            for batch in batches {
                for entry in batch.entries {
                    let event = decode_entry(&entry, Utc::now());
                    debug!(
                        stream = %batch.stream,
                        event_id = %event.id,
                        event_type = %event.event_type,
                        "Delivering event"
                    );

                    if let Err(e) = handler.on_event(&batch.stream, event).await {
                        error!(
                            stream = %batch.stream,
                            entry_id = %entry.id,
                            error = %e,
                            "Failed to handle event"
                        );
                    }

                    advance(&mut cursors, &batch.stream, entry.id);
                }
            }
        }
    }

    /// Pin every stream to its current tail. A stream whose tail cannot be
    /// resolved falls back to the bus's "newest" marker.
    async fn initial_cursors(&self, streams: &[&str]) -> Vec<(String, Cursor)> {
        let mut cursors = Vec::with_capacity(streams.len());

        for stream in streams {
            let cursor = match self.source.tail_id(stream).await {
                Ok(id) => Cursor::After(id),
                Err(e) => {
                    warn!(%stream, error = %e, "Could not resolve stream tail, reading newest only");
                    Cursor::Tail
                }
            };
            cursors.push((stream.to_string(), cursor));
        }

        cursors
    }
}

fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

fn advance(cursors: &mut [(String, Cursor)], stream: &str, id: String) {
    if let Some((_, cursor)) = cursors.iter_mut().find(|(name, _)| name == stream) {
        *cursor = Cursor::After(id);
    }
}
