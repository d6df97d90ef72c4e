//! Strategy configuration records.

use super::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A strategy configuration owned by the configuration store.
///
/// `strategy_type` selects the registered evaluator; `config` holds the
/// parameters that evaluator understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub strategy_type: String,
    pub active: bool,
    #[serde(default)]
    pub config: Document,
    /// Advisory only, not consulted by the engine
    #[serde(default)]
    pub active_accounts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    /// Create an active strategy with the given config.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        strategy_type: impl Into<String>,
        config: Document,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            strategy_type: strategy_type.into(),
            active: true,
            config,
            active_accounts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
