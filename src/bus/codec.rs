//! Conversion between bus entries and `Event`s.
//!
//! Decoding is tolerant: every missing or malformed field falls back to a
//! default so one bad field never drops the entry.

use super::traits::StreamEntry;
use crate::error::BusError;
use crate::model::{Document, Event};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

/// Decode a bus entry. The event id is always the bus-assigned entry id.
///
/// Defaults: `type`/`platform` → empty, `timestamp` → `received_at`,
/// `data` → empty document.
pub fn decode_entry(entry: &StreamEntry, received_at: DateTime<Utc>) -> Event {
    let text = |key: &str| entry.fields.get(key).cloned().unwrap_or_default();

    let timestamp = match entry.fields.get("timestamp") {
        Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
            debug!(entry_id = %entry.id, raw = %raw, "Unparseable timestamp, using receipt time");
            received_at
        }),
        None => received_at,
    };

    let data = match entry.fields.get("data") {
        Some(raw) => Document::from_json_str(raw).unwrap_or_else(|| {
            debug!(entry_id = %entry.id, "Payload is not a JSON object, using empty data");
            Document::new()
        }),
        None => Document::new(),
    };

    Event {
        id: entry.id.clone(),
        event_type: text("type"),
        platform: text("platform"),
        timestamp,
        data,
    }
}

/// Encode an event into the flat field list publishers write.
pub fn encode_event(event: &Event) -> Result<Vec<(&'static str, String)>, BusError> {
    let data = serde_json::to_string(&event.data)?;

    Ok(vec![
        ("id", event.id.clone()),
        ("type", event.event_type.clone()),
        ("platform", event.platform.clone()),
        ("timestamp", event.timestamp.to_rfc3339()),
        ("data", data),
    ])
}

/// RFC3339 first, then a naive ISO-8601 timestamp read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
