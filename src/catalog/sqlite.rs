//! SQLite-backed strategy store.

use super::store::StrategyStore;
use crate::error::StoreError;
use crate::model::{Document, Strategy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info, warn};

const SELECT_COLUMNS: &str =
    "SELECT id, name, type, active, config, active_accounts, created_at, updated_at FROM strategies";

/// A `strategies` row before its JSON columns are decoded.
struct RawStrategy {
    id: String,
    name: String,
    strategy_type: String,
    active: bool,
    config: String,
    active_accounts: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawStrategy {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            strategy_type: row.get(2)?,
            active: row.get(3)?,
            config: row.get(4)?,
            active_accounts: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    /// Decode JSON columns. Only a malformed `config` rejects the row.
    fn decode(self) -> Result<Strategy, StoreError> {
        let config = Document::from_json_str(&self.config).ok_or_else(|| StoreError::Malformed {
            id: self.id.clone(),
            column: "config",
            reason: "expected a JSON object".to_string(),
        })?;

        let active_accounts = match self.active_accounts.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!(strategy_id = %self.id, error = %e, "Ignoring malformed active_accounts");
                Vec::new()
            }),
        };

        Ok(Strategy {
            id: self.id,
            name: self.name,
            strategy_type: self.strategy_type,
            active: self.active,
            config,
            active_accounts,
            created_at: parse_time(&self.created_at),
            updated_at: parse_time(&self.updated_at),
        })
    }
}

/// Strategy store reading the `strategies` table of a SQLite database.
pub struct SqliteStrategyStore {
    conn: Mutex<Connection>,
}

impl SqliteStrategyStore {
    /// Open the database at `path`, creating the table if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(|source| StoreError::Open {
            path: path.as_ref().display().to_string(),
            source,
        })?;

        let store = Self::from_connection(conn)?;
        info!("Strategy store opened at {:?}", path.as_ref());
        Ok(store)
    }

    /// Wrap an existing connection, creating the table if needed.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StrategyStore for SqliteStrategyStore {
    fn load_active(&self) -> Result<Vec<Strategy>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("{SELECT_COLUMNS} WHERE active = 1 ORDER BY rowid"))?;

        let strategies: Vec<Strategy> = stmt
            .query_map([], RawStrategy::from_row)?
            .filter_map(|row| match row {
                Ok(raw) => match raw.decode() {
                    Ok(strategy) => Some(strategy),
                    Err(e) => {
                        warn!(error = %e, "Skipping strategy with malformed configuration");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable strategy row");
                    None
                }
            })
            .collect();

        debug!(count = strategies.len(), "Loaded active strategies");
        Ok(strategies)
    }

    fn get_strategy(&self, id: &str) -> Result<Option<Strategy>, StoreError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                RawStrategy::from_row,
            )
            .optional()?;

        raw.map(RawStrategy::decode).transpose()
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS strategies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            config TEXT NOT NULL DEFAULT '{}',
            active_accounts TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_strategies_active ON strategies(active);
        "#,
    )?;
    Ok(())
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
