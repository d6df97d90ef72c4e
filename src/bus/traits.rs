//! Append-only stream source abstraction.
//!
//! The subscriber only needs three things from a bus: read entries after a
//! per-stream cursor with a bounded wait, resolve a stream's current tail, and
//! append new entries. Redis Streams is the production implementation; the
//! in-memory source backs tests and local runs.

use crate::error::BusError;
use crate::model::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Raw entry as stored on the bus: an id plus flat string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Entries read from one stream, in publish order.
#[derive(Debug, Clone)]
pub struct StreamBatch {
    pub stream: String,
    pub entries: Vec<StreamEntry>,
}

/// Per-stream read position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Only entries appended after the read is issued
    Tail,
    /// Entries strictly after the given id
    After(String),
}

impl Cursor {
    /// Wire form understood by `XREAD`.
    pub fn as_wire(&self) -> &str {
        match self {
            Cursor::Tail => "$",
            Cursor::After(id) => id,
        }
    }
}

/// A bus holding named, append-only streams of entries.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Read up to `count` entries per stream strictly after each cursor,
    /// waiting at most `block` when nothing is available. An empty result
    /// means the wait elapsed.
    async fn read(
        &self,
        cursors: &[(String, Cursor)],
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamBatch>, BusError>;

    /// Id of the newest entry in `stream`, or `0-0` when it is empty or absent.
    async fn tail_id(&self, stream: &str) -> Result<String, BusError>;

    /// Append an event to `stream`, returning the bus-assigned id.
    async fn publish(&self, stream: &str, event: &Event) -> Result<String, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_wire_form() {
        assert_eq!(Cursor::Tail.as_wire(), "$");
        assert_eq!(Cursor::After("17-3".to_string()).as_wire(), "17-3");
    }
}
