//! Event bus integration.
//!
//! ## Sources
//! - `RedisStreamSource`: Redis Streams via `XREAD`/`XADD`
//! - `MemoryStreamSource`: in-process streams for tests and local runs
//!
//! ## Subscription
//! `StreamSubscriber` keeps one cursor per stream, decodes entries into
//! `Event`s and hands them to an `EventHandler` strictly one at a time.

mod codec;
mod memory;
mod redis_source;
mod subscriber;
mod traits;

pub use codec::{decode_entry, encode_event};
pub use memory::MemoryStreamSource;
pub use redis_source::RedisStreamSource;
pub use subscriber::{EventHandler, StreamSubscriber, SubscriberOptions};
pub use traits::{Cursor, StreamBatch, StreamEntry, StreamSource};

/// Stream carrying fill notifications.
pub const FILL_EVENTS: &str = "fill_events";
/// Stream carrying trade lifecycle events (executed, dry-run, errors).
pub const TRADE_EVENTS: &str = "trade_events";
/// Stream carrying account lifecycle events.
pub const ACCOUNT_EVENTS: &str = "account_events";
