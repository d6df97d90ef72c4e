//! Read contract for the strategy configuration store.

use crate::error::StoreError;
use crate::model::Strategy;

/// Read-only access to externally owned strategy configurations.
#[cfg_attr(test, mockall::automock)]
pub trait StrategyStore: Send + Sync {
    /// All strategies with `active = true`, in store order.
    ///
    /// Rows that fail to decode are skipped. No active strategies is an empty
    /// list, not an error.
    fn load_active(&self) -> Result<Vec<Strategy>, StoreError>;

    /// Look up one strategy by id regardless of its active flag.
    fn get_strategy(&self, id: &str) -> Result<Option<Strategy>, StoreError>;
}
