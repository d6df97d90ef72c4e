//! Events received from the bus.

use super::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event types that represent an executed trade on some account.
pub const FILL_EVENT_TYPES: [&str; 2] = ["fill", "trade_executed"];

/// An immutable fact published by an execution service.
///
/// `data` is not validated here; its schema depends on `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Bus-assigned entry id, monotonically increasing within a stream
    pub id: String,
    /// Free-form tag: `fill`, `trade_executed`, `cancel`, `account_*`, ...
    #[serde(rename = "type")]
    pub event_type: String,
    /// Origin venue tag
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Document,
}

impl Event {
    /// Create an event stamped with the current time and an empty payload.
    pub fn new(event_type: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            event_type: event_type.into(),
            platform: platform.into(),
            timestamp: Utc::now(),
            data: Document::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_data(mut self, data: Document) -> Self {
        self.data = data;
        self
    }

    /// Whether this event reports a fill that strategies may react to.
    pub fn is_fill(&self) -> bool {
        FILL_EVENT_TYPES.contains(&self.event_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_classification() {
        assert!(Event::new("fill", "predict").is_fill());
        assert!(Event::new("trade_executed", "predict").is_fill());
        assert!(!Event::new("trade_dry_run", "predict").is_fill());
        assert!(!Event::new("account_created", "predict").is_fill());
    }
}
