//! In-process stream source for tests and local runs.

use super::codec::encode_event;
use super::traits::{Cursor, StreamBatch, StreamEntry, StreamSource};
use crate::error::BusError;
use crate::model::Event;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct MemoryState {
    streams: HashMap<String, Vec<StreamEntry>>,
    next_seq: u64,
    failures_remaining: u32,
    reads: u64,
}

impl MemoryState {
    fn last_id(&self, stream: &str) -> String {
        self.streams
            .get(stream)
            .and_then(|entries| entries.last())
            .map(|entry| entry.id.clone())
            .unwrap_or_else(|| "0-0".to_string())
    }

    fn append(&mut self, stream: &str, fields: HashMap<String, String>) -> String {
        self.next_seq += 1;
        let id = format!("{}-0", self.next_seq);
        self.streams
            .entry(stream.to_string())
            .or_default()
            .push(StreamEntry {
                id: id.clone(),
                fields,
            });
        id
    }
}

/// Stream source that keeps every stream in memory.
///
/// Entry ids follow the `<seq>-0` shape of Redis ids with a single sequence
/// shared by all streams.
#[derive(Debug, Default)]
pub struct MemoryStreamSource {
    state: Mutex<MemoryState>,
    appended: Notify,
}

impl MemoryStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw fields, bypassing event encoding.
    pub fn push_raw(&self, stream: &str, fields: &[(&str, &str)]) -> String {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let id = self.state.lock().append(stream, fields);
        self.appended.notify_waiters();
        id
    }

    /// Make the next `count` reads fail as if the bus were unreachable.
    pub fn fail_next_reads(&self, count: u32) {
        self.state.lock().failures_remaining = count;
    }

    /// Number of `read` calls served so far, failed ones included.
    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }

    fn collect_after(
        &self,
        cursors: &[(String, String)],
        count: usize,
    ) -> Vec<StreamBatch> {
        let state = self.state.lock();

        cursors
            .iter()
            .filter_map(|(stream, after)| {
                let after = entry_key(after);
                let entries: Vec<StreamEntry> = state
                    .streams
                    .get(stream)?
                    .iter()
                    .filter(|entry| entry_key(&entry.id) > after)
                    .take(count)
                    .cloned()
                    .collect();

                (!entries.is_empty()).then(|| StreamBatch {
                    stream: stream.clone(),
                    entries,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StreamSource for MemoryStreamSource {
    async fn read(
        &self,
        cursors: &[(String, Cursor)],
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamBatch>, BusError> {
        // Tail cursors pin to the newest entry at the time of the call
        let resolved: Vec<(String, String)> = {
            let mut state = self.state.lock();
            state.reads += 1;
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                return Err(BusError::Unavailable("injected read failure".to_string()));
            }

            cursors
                .iter()
                .map(|(stream, cursor)| {
                    let after = match cursor {
                        Cursor::Tail => state.last_id(stream),
                        Cursor::After(id) => id.clone(),
                    };
                    (stream.clone(), after)
                })
                .collect()
        };

        let deadline = Instant::now() + block;
        loop {
            let appended = self.appended.notified();

            let batches = self.collect_after(&resolved, count);
            if !batches.is_empty() {
                return Ok(batches);
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn tail_id(&self, stream: &str) -> Result<String, BusError> {
        Ok(self.state.lock().last_id(stream))
    }

    async fn publish(&self, stream: &str, event: &Event) -> Result<String, BusError> {
        let fields = encode_event(event)?
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let id = self.state.lock().append(stream, fields);
        self.appended.notify_waiters();
        Ok(id)
    }
}

/// Order key for `<ms>-<seq>` ids; unparseable parts sort first.
fn entry_key(id: &str) -> (u64, u64) {
    let mut parts = id.splitn(2, '-');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cursor(stream: &str, cursor: Cursor) -> Vec<(String, Cursor)> {
        vec![(stream.to_string(), cursor)]
    }

    #[test]
    fn test_entry_key_ordering() {
        assert!(entry_key("10-0") > entry_key("9-5"));
        assert!(entry_key("9-5") > entry_key("9-4"));
        assert_eq!(entry_key("garbage"), (0, 0));
    }

    #[tokio::test]
    async fn test_read_after_cursor_respects_count() {
        let source = MemoryStreamSource::new();
        for i in 0..5 {
            let n = i.to_string();
            source.push_raw("fill_events", &[("type", "fill"), ("n", n.as_str())]);
        }

        let batches = source
            .read(
                &cursor("fill_events", Cursor::After("2-0".to_string())),
                2,
                Duration::from_millis(10),
            )
            .await
            .unwrap();

        assert_eq!(batches.len(), 1);
        let ids: Vec<&str> = batches[0].entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["3-0", "4-0"]);
    }

    #[tokio::test]
    async fn test_tail_cursor_skips_backlog() {
        let source = MemoryStreamSource::new();
        source.push_raw("fill_events", &[("type", "old")]);

        let batches = source
            .read(&cursor("fill_events", Cursor::Tail), 10, Duration::from_millis(20))
            .await
            .unwrap();

        assert!(batches.is_empty());
        assert_eq!(source.tail_id("fill_events").await.unwrap(), "1-0");
        assert_eq!(source.tail_id("missing").await.unwrap(), "0-0");
    }

    #[tokio::test]
    async fn test_blocked_read_wakes_on_publish() {
        let source = Arc::new(MemoryStreamSource::new());
        let reader = {
            let source = source.clone();
            tokio::spawn(async move {
                source
                    .read(&cursor("trade_events", Cursor::Tail), 10, Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        source
            .publish("trade_events", &Event::new("trade_executed", "predict"))
            .await
            .unwrap();

        let batches = reader.await.unwrap().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].entries[0].fields["type"], "trade_executed");
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let source = MemoryStreamSource::new();
        source.fail_next_reads(1);

        let first = source
            .read(&cursor("fill_events", Cursor::Tail), 10, Duration::from_millis(1))
            .await;
        let second = source
            .read(&cursor("fill_events", Cursor::Tail), 10, Duration::from_millis(1))
            .await;

        assert!(matches!(first, Err(BusError::Unavailable(_))));
        assert!(second.unwrap().is_empty());
        assert_eq!(source.read_count(), 2);
    }
}
