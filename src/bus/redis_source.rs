//! Redis Streams event bus.

use super::codec::encode_event;
use super::traits::{Cursor, StreamBatch, StreamEntry, StreamSource};
use crate::error::BusError;
use crate::model::Event;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, instrument};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra slack on top of the XREAD block so the client never times out first.
const RESPONSE_SLACK: Duration = Duration::from_secs(5);

/// Event bus backed by Redis Streams (`XREAD` / `XADD`).
#[derive(Clone)]
pub struct RedisStreamSource {
    conn: ConnectionManager,
}

impl RedisStreamSource {
    /// Connect and verify the server answers `PING`.
    ///
    /// `block` is the longest XREAD wait the caller will request.
    pub async fn connect(url: &str, block: Duration) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(block + RESPONSE_SLACK);

        let mut conn = ConnectionManager::new_with_config(client, config).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!(%url, "Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StreamSource for RedisStreamSource {
    #[instrument(skip(self, cursors), level = "trace")]
    async fn read(
        &self,
        cursors: &[(String, Cursor)],
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamBatch>, BusError> {
        let keys: Vec<&str> = cursors.iter().map(|(stream, _)| stream.as_str()).collect();
        let ids: Vec<&str> = cursors.iter().map(|(_, cursor)| cursor.as_wire()).collect();
        let options = StreamReadOptions::default()
            .count(count)
            .block(block.as_millis() as usize);

        let mut conn = self.conn.clone();
        // Nil reply means the block elapsed with no new entries
        let reply: Option<StreamReadReply> =
            conn.xread_options(&keys[..], &ids[..], &options).await?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let batches = reply
            .keys
            .into_iter()
            .map(|key| StreamBatch {
                stream: key.key,
                entries: key
                    .ids
                    .into_iter()
                    .map(|entry| StreamEntry {
                        id: entry.id,
                        fields: entry
                            .map
                            .iter()
                            .filter_map(|(field, value)| {
                                redis::from_redis_value::<String>(value)
                                    .ok()
                                    .map(|text| (field.clone(), text))
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(batches)
    }

    async fn tail_id(&self, stream: &str) -> Result<String, BusError> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn.xrevrange_count(stream, "+", "-", 1).await?;

        Ok(reply
            .ids
            .first()
            .map(|entry| entry.id.clone())
            .unwrap_or_else(|| "0-0".to_string()))
    }

    async fn publish(&self, stream: &str, event: &Event) -> Result<String, BusError> {
        let fields = encode_event(event)?;
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", &fields[..]).await?;

        debug!(%stream, event_type = %event.event_type, %id, "Published event");
        Ok(id)
    }
}
