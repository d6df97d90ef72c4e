//! Strategy evaluation.
//!
//! Contains:
//! - The evaluator contract and the type-name registry
//! - Delta-neutral hedging, registered under `delta_neutral` and
//!   `delta_neutral_v1`

mod delta_neutral;
mod registry;

pub use delta_neutral::{
    hedge_price, DeltaNeutral, DeltaNeutralConfig, HedgePair, DEFAULT_TARGET_PLATFORM,
    MAX_HEDGE_PRICE, MIN_HEDGE_PRICE,
};
pub use registry::{Evaluator, StrategyRegistry};

use std::sync::Arc;

/// Type names the delta-neutral evaluator answers to.
pub const DELTA_NEUTRAL_TYPES: [&str; 2] = ["delta_neutral", "delta_neutral_v1"];

/// Register the built-in evaluators.
pub fn register_defaults(registry: &StrategyRegistry) {
    let delta_neutral: Arc<dyn Evaluator> = Arc::new(DeltaNeutral);
    for type_name in DELTA_NEUTRAL_TYPES {
        registry.register(type_name, Arc::clone(&delta_neutral));
    }
}
