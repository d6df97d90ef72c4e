//! Name-keyed registry of strategy evaluators.

use crate::error::ConfigError;
use crate::model::{Command, Event, Strategy};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Decision logic for one strategy type.
///
/// Implementations must be pure: the output depends only on `(event, strategy)`.
/// An empty result means "nothing to do"; `ConfigError` is reserved for a
/// strategy whose configuration cannot be used.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, event: &Event, strategy: &Strategy) -> Result<Vec<Command>, ConfigError>;
}

impl<F> Evaluator for F
where
    F: Fn(&Event, &Strategy) -> Result<Vec<Command>, ConfigError> + Send + Sync,
{
    fn evaluate(&self, event: &Event, strategy: &Strategy) -> Result<Vec<Command>, ConfigError> {
        self(event, strategy)
    }
}

/// Maps strategy type names to evaluators.
///
/// Several names may share one evaluator, which lets config schemas be
/// versioned (`delta_neutral`, `delta_neutral_v1`) without code changes.
#[derive(Default)]
pub struct StrategyRegistry {
    evaluators: RwLock<HashMap<String, Arc<dyn Evaluator>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `evaluator` under `type_name`, replacing any previous entry.
    pub fn register(&self, type_name: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
        let type_name = type_name.into();
        let replaced = self
            .evaluators
            .write()
            .insert(type_name.clone(), evaluator)
            .is_some();

        if replaced {
            warn!(strategy_type = %type_name, "Replaced registered strategy evaluator");
        } else {
            info!(strategy_type = %type_name, "Registered strategy evaluator");
        }
    }

    /// Evaluator for `type_name`, if one is registered.
    pub fn resolve(&self, type_name: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.read().get(type_name).cloned()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.evaluators.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.evaluators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.read().is_empty()
    }
}
