//! Delta-neutral hedging.
//!
//! When a primary account gets filled, place the opposite side of the same
//! market on its paired hedge account so the pair's combined exposure stays
//! flat.
//!
//! Strategy config:
//! ```json
//! {
//!   "pairs": [{"primary": "<account id or name>", "hedge": "<account id>"}],
//!   "target_platform": "predict",
//!   "price_adjustment": 0.0
//! }
//! ```
//!
//! The evaluator keeps no state: every fill produces at most one hedge, even
//! if an earlier hedge for the same position is still open.

use super::registry::Evaluator;
use crate::error::{ConfigError, FieldError};
use crate::model::{Command, CommandKind, Document, Event, Side, Strategy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::{debug, info};

/// Platform hedges go to when the strategy does not name one.
pub const DEFAULT_TARGET_PLATFORM: &str = "predict";

/// Lowest price a hedge order is placed at.
pub const MIN_HEDGE_PRICE: Decimal = dec!(0.01);

/// Highest price a hedge order is placed at.
pub const MAX_HEDGE_PRICE: Decimal = dec!(0.99);

/// One primary → hedge account pairing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HedgePair {
    pub primary: String,
    pub hedge: String,
}

/// Parsed delta-neutral strategy parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaNeutralConfig {
    pub pairs: Vec<HedgePair>,
    pub target_platform: String,
    pub price_adjustment: Decimal,
}

impl DeltaNeutralConfig {
    /// Read the parameters out of a strategy's config document.
    pub fn from_document(config: &Document) -> Result<Self, ConfigError> {
        let raw_pairs = config.get("pairs").ok_or(ConfigError::Missing("pairs"))?;
        let pairs: Vec<HedgePair> =
            serde_json::from_value(raw_pairs.clone()).map_err(|e| ConfigError::Invalid {
                field: "pairs",
                reason: e.to_string(),
            })?;

        if let Some(pair) = pairs
            .iter()
            .find(|p| p.primary.is_empty() || p.hedge.is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "pairs",
                reason: format!(
                    "empty account in pair (primary: {:?}, hedge: {:?})",
                    pair.primary, pair.hedge
                ),
            });
        }

        let target_platform = match config.optional_str("target_platform") {
            Ok(Some(platform)) if !platform.is_empty() => platform.to_string(),
            Ok(_) => DEFAULT_TARGET_PLATFORM.to_string(),
            Err(e) => {
                return Err(ConfigError::Invalid {
                    field: "target_platform",
                    reason: e.to_string(),
                })
            }
        };

        let price_adjustment = config
            .optional_decimal("price_adjustment")
            .map_err(|e| ConfigError::Invalid {
                field: "price_adjustment",
                reason: e.to_string(),
            })?
            .unwrap_or(Decimal::ZERO);

        Ok(Self {
            pairs,
            target_platform,
            price_adjustment,
        })
    }

    /// Hedge account for a fill on `account_id` (or on the account called
    /// `account_name`).
    pub fn hedge_for(&self, account_id: &str, account_name: Option<&str>) -> Option<&HedgePair> {
        self.pairs
            .iter()
            .find(|pair| pair.primary == account_id || Some(pair.primary.as_str()) == account_name)
    }
}

/// The fields of a fill payload this strategy needs.
#[derive(Debug, Clone, PartialEq)]
struct Fill<'a> {
    account_id: &'a str,
    account_name: Option<&'a str>,
    market_id: &'a str,
    side: Side,
    price: Decimal,
    shares: Decimal,
}

impl<'a> Fill<'a> {
    fn from_payload(data: &'a Document) -> Result<Self, FieldError> {
        let account_id = non_empty(data, "account_id")?;
        let market_id = non_empty(data, "market_id")?;
        let side = Side::from_wire(data.str_field("side")?).ok_or_else(|| {
            FieldError::WrongType {
                key: "side".to_string(),
                expected: "`yes` or `no`",
            }
        })?;
        let price = data.decimal_field("price")?;
        let shares = data.decimal_field("shares")?;
        if shares <= Decimal::ZERO {
            return Err(FieldError::WrongType {
                key: "shares".to_string(),
                expected: "positive number",
            });
        }
        // The name is advisory; a bad one just disables name matching
        let account_name = data.optional_str("account_name").ok().flatten();

        Ok(Self {
            account_id,
            account_name,
            market_id,
            side,
            price,
            shares,
        })
    }
}

fn non_empty<'a>(data: &'a Document, key: &str) -> Result<&'a str, FieldError> {
    match data.str_field(key)? {
        "" => Err(FieldError::Missing(key.to_string())),
        value => Ok(value),
    }
}

/// `price + adjustment`, clamped to `[MIN_HEDGE_PRICE, MAX_HEDGE_PRICE]`.
///
/// `None` when the sum overflows `Decimal`.
pub fn hedge_price(price: Decimal, adjustment: Decimal) -> Option<Decimal> {
    price
        .checked_add(adjustment)
        .map(|p| p.clamp(MIN_HEDGE_PRICE, MAX_HEDGE_PRICE))
}

/// Evaluator placing one opposite-side order on the paired hedge account for
/// every fill on a primary account.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaNeutral;

impl Evaluator for DeltaNeutral {
    fn evaluate(&self, event: &Event, strategy: &Strategy) -> Result<Vec<Command>, ConfigError> {
        if !event.is_fill() {
            return Ok(Vec::new());
        }

        let fill = match Fill::from_payload(&event.data) {
            Ok(fill) => fill,
            Err(e) => {
                debug!(
                    strategy = %strategy.name,
                    event_id = %event.id,
                    reason = %e,
                    "Fill payload incomplete, skipping"
                );
                return Ok(Vec::new());
            }
        };

        let config = DeltaNeutralConfig::from_document(&strategy.config)?;

        let Some(pair) = config.hedge_for(fill.account_id, fill.account_name) else {
            debug!(
                strategy = %strategy.name,
                account = %fill.account_id,
                "Account not in any pair, skipping"
            );
            return Ok(Vec::new());
        };

        let Some(price) = hedge_price(fill.price, config.price_adjustment) else {
            debug!(
                strategy = %strategy.name,
                event_id = %event.id,
                price = %fill.price,
                adjustment = %config.price_adjustment,
                "Hedge price out of range, skipping"
            );
            return Ok(Vec::new());
        };
        let side = fill.side.opposite();
        let hedge_account = pair.hedge.clone();

        info!(
            strategy = %strategy.name,
            original_account = %fill.account_id,
            %hedge_account,
            original_side = %fill.side,
            hedge_side = %side,
            %price,
            shares = %fill.shares,
            "Creating hedge order"
        );

        let metadata = Document::new()
            .with("strategy", strategy.name.clone())
            .with("original_fill", event.id.clone())
            .with("original_account", fill.account_id)
            .with("original_side", fill.side.as_str());

        Ok(vec![Command {
            kind: CommandKind::PlaceOrder,
            platform: config.target_platform,
            account_id: hedge_account,
            market_id: fill.market_id.to_string(),
            side,
            price,
            shares: fill.shares,
            metadata,
        }])
    }
}
