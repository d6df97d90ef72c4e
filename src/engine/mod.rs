//! Strategy engine: wires the catalog, registry, bus and dispatcher together.
//!
//! Lifecycle: `Created → Started → Running → Stopped`. `start` loads the
//! catalog, subscribes to the engine streams and blocks until shutdown. Every
//! delivered event is fully evaluated and dispatched before the next one is
//! read.

use crate::bus::{
    EventHandler, StreamSource, StreamSubscriber, SubscriberOptions, ACCOUNT_EVENTS, FILL_EVENTS,
    TRADE_EVENTS,
};
use crate::catalog::StrategyCatalog;
use crate::config::Config;
use crate::error::EngineError;
use crate::execution::{CommandExecutor, DispatchReport};
use crate::model::Event;
use crate::strategy::{Evaluator, StrategyRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Streams the engine subscribes to.
pub const ENGINE_STREAMS: [&str; 3] = [FILL_EVENTS, TRADE_EVENTS, ACCOUNT_EVENTS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Started,
    Running,
    Stopped,
}

/// Engine tuning, usually derived from `Config`.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub subscriber: SubscriberOptions,
    /// Periodic catalog reload; `None` keeps the startup snapshot for the
    /// whole run
    pub catalog_refresh: Option<Duration>,
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            subscriber: SubscriberOptions::from(&config.bus),
            catalog_refresh: config.catalog_refresh_interval(),
        }
    }
}

/// What happened to one event across all strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSummary {
    /// Strategies whose evaluator ran successfully
    pub evaluated: usize,
    pub inactive: usize,
    /// Strategies whose type has no registered evaluator
    pub unregistered: usize,
    /// Strategies whose evaluator returned a config error
    pub failed: usize,
    /// Commands handed to the executor
    pub commands: usize,
    pub dispatch: DispatchReport,
}

/// Event-driven strategy engine.
pub struct Engine {
    catalog: Arc<StrategyCatalog>,
    registry: StrategyRegistry,
    subscriber: StreamSubscriber,
    executor: Arc<dyn CommandExecutor>,
    catalog_refresh: Option<Duration>,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(
        catalog: Arc<StrategyCatalog>,
        source: Arc<dyn StreamSource>,
        executor: Arc<dyn CommandExecutor>,
        options: EngineOptions,
    ) -> Self {
        Self {
            catalog,
            registry: StrategyRegistry::new(),
            subscriber: StreamSubscriber::new(source, options.subscriber),
            executor,
            catalog_refresh: options.catalog_refresh,
            state: Mutex::new(EngineState::Created),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Register an evaluator for a strategy type.
    ///
    /// Meant to be called before `start`. Later calls still take effect for
    /// subsequent events but are reported.
    pub fn register_strategy(&self, type_name: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
        let type_name = type_name.into();
        let state = self.state();
        if state != EngineState::Created {
            warn!(strategy_type = %type_name, ?state, "Registering strategy after engine start");
        }
        self.registry.register(type_name, evaluator);
    }

    /// Load the catalog and process events until `shutdown` fires.
    ///
    /// A catalog load failure is fatal. Once subscribed, no event-level
    /// failure ends the run.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            if *state != EngineState::Created {
                return Err(EngineError::AlreadyStarted);
            }
            *state = EngineState::Started;
        }

        let snapshot = match self.catalog.reload() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to load strategy catalog");
                *self.state.lock() = EngineState::Stopped;
                return Err(e.into());
            }
        };

        info!(
            catalog_version = snapshot.version,
            loaded_at = %snapshot.loaded_at,
            strategies = snapshot.strategies.len(),
            evaluators = ?self.registry.type_names(),
            streams = ?ENGINE_STREAMS,
            "Strategy engine started"
        );

        let refresh = self
            .catalog_refresh
            .map(|interval| self.catalog.spawn_refresh(interval, shutdown.clone()));

        *self.state.lock() = EngineState::Running;
        self.subscriber.subscribe(&ENGINE_STREAMS, self, shutdown).await;

        if let Some(task) = refresh {
            task.abort();
        }
        *self.state.lock() = EngineState::Stopped;
        info!("Strategy engine stopped");

        Ok(())
    }

    /// Run every active strategy against `event` and dispatch the results.
    ///
    /// Strategies are visited in catalog order. A failing strategy is logged
    /// and never affects the others.
    pub async fn handle_event(&self, event: &Event) -> EventSummary {
        let snapshot = self.catalog.snapshot();
        let mut summary = EventSummary::default();

        for strategy in &snapshot.strategies {
            if !strategy.active {
                summary.inactive += 1;
                continue;
            }

            let Some(evaluator) = self.registry.resolve(&strategy.strategy_type) else {
                warn!(
                    strategy = %strategy.name,
                    strategy_type = %strategy.strategy_type,
                    "No evaluator registered for strategy type, skipping"
                );
                summary.unregistered += 1;
                continue;
            };

            let commands = match evaluator.evaluate(event, strategy) {
                Ok(commands) => commands,
                Err(e) => {
                    error!(
                        strategy = %strategy.name,
                        strategy_id = %strategy.id,
                        event_id = %event.id,
                        error = %e,
                        "Strategy evaluation failed"
                    );
                    summary.failed += 1;
                    continue;
                }
            };
            summary.evaluated += 1;

            if commands.is_empty() {
                continue;
            }

            info!(
                strategy = %strategy.name,
                event_id = %event.id,
                count = commands.len(),
                "Dispatching commands"
            );
            summary.commands += commands.len();
            summary.dispatch += self.executor.execute_commands(&commands).await;
        }

        summary
    }
}

#[async_trait]
impl EventHandler for Engine {
    async fn on_event(&self, stream: &str, event: Event) -> anyhow::Result<()> {
        debug!(
            stream,
            event_id = %event.id,
            event_type = %event.event_type,
            platform = %event.platform,
            "Received event"
        );

        let summary = self.handle_event(&event).await;
        if summary.commands > 0 || summary.failed > 0 {
            info!(
                stream,
                event_id = %event.id,
                commands = summary.commands,
                placed = summary.dispatch.placed,
                failed_orders = summary.dispatch.failed,
                failed_strategies = summary.failed,
                "Event processed"
            );
        }
        Ok(())
    }
}
