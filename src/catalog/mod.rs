//! Strategy catalog: the set of active strategies the engine evaluates.
//!
//! The catalog is a versioned, immutable snapshot taken from the
//! configuration store. By default it is loaded once at startup and never
//! changes for the life of the process; an opt-in refresh task can replace
//! the snapshot periodically.

mod sqlite;
mod store;

pub use sqlite::SqliteStrategyStore;
pub use store::StrategyStore;

#[cfg(test)]
pub use store::MockStrategyStore;

use crate::error::StoreError;
use crate::model::Strategy;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One immutable load of the active strategies.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    /// 0 before the first load, then incremented on every successful load
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub strategies: Vec<Strategy>,
}

/// Holds the current catalog snapshot and reloads it from the store.
pub struct StrategyCatalog {
    store: Arc<dyn StrategyStore>,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl StrategyCatalog {
    /// Create an empty catalog (version 0) over `store`.
    pub fn new(store: Arc<dyn StrategyStore>) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(CatalogSnapshot {
                version: 0,
                loaded_at: Utc::now(),
                strategies: Vec::new(),
            })),
        }
    }

    /// Load active strategies and make them the current snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<CatalogSnapshot>, StoreError> {
        let strategies = self.store.load_active()?;

        let mut current = self.current.write();
        let snapshot = Arc::new(CatalogSnapshot {
            version: current.version + 1,
            loaded_at: Utc::now(),
            strategies,
        });
        *current = snapshot.clone();

        info!(
            version = snapshot.version,
            count = snapshot.strategies.len(),
            "Loaded active strategies"
        );
        Ok(snapshot)
    }

    /// The current snapshot. Cheap; callers hold it for one event.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.read().clone()
    }

    /// Single strategy lookup straight from the store.
    pub fn get_strategy(&self, id: &str) -> Result<Option<Strategy>, StoreError> {
        self.store.get_strategy(id)
    }

    /// Reload the catalog every `interval` until `shutdown` fires.
    ///
    /// Store access runs on the blocking pool; a failed reload is logged and
    /// the previous snapshot is kept.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let catalog = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; the startup load already covered it
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            return;
                        }
                        continue;
                    }
                }

                let reloading = Arc::clone(&catalog);
                match tokio::task::spawn_blocking(move || reloading.reload()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        warn!(error = %e, "Catalog refresh failed, keeping previous snapshot")
                    }
                    Err(e) => warn!(error = %e, "Catalog refresh task panicked"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;

    fn strategy(id: &str) -> Strategy {
        Strategy::new(id, id, "delta_neutral", Document::new())
    }

    #[test]
    fn test_new_catalog_is_empty() {
        let catalog = StrategyCatalog::new(Arc::new(MockStrategyStore::new()));
        let snapshot = catalog.snapshot();

        assert_eq!(snapshot.version, 0);
        assert!(snapshot.strategies.is_empty());
    }

    #[test]
    fn test_reload_bumps_version_and_keeps_order() {
        let mut store = MockStrategyStore::new();
        store
            .expect_load_active()
            .times(1)
            .returning(|| Ok(vec![strategy("b"), strategy("a")]));

        let catalog = StrategyCatalog::new(Arc::new(store));
        let snapshot = catalog.reload().unwrap();

        assert_eq!(snapshot.version, 1);
        let ids: Vec<&str> = snapshot.strategies.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(catalog.snapshot().version, 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let mut store = MockStrategyStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_load_active()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![strategy("s1")]));
        store
            .expect_load_active()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(StoreError::Query(rusqlite::Error::InvalidQuery)));

        let catalog = StrategyCatalog::new(Arc::new(store));
        catalog.reload().unwrap();
        assert!(catalog.reload().is_err());

        let snapshot = catalog.snapshot();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.strategies[0].id, "s1");
    }

    #[test]
    fn test_held_snapshot_is_not_mutated_by_reload() {
        let mut store = MockStrategyStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_load_active()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![strategy("old")]));
        store
            .expect_load_active()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![strategy("new")]));

        let catalog = StrategyCatalog::new(Arc::new(store));
        catalog.reload().unwrap();
        let held = catalog.snapshot();
        catalog.reload().unwrap();

        assert_eq!(held.strategies[0].id, "old");
        assert_eq!(catalog.snapshot().strategies[0].id, "new");
    }

    #[test]
    fn test_get_strategy_reads_store_directly() {
        let mut store = MockStrategyStore::new();
        store
            .expect_get_strategy()
            .withf(|id| id == "s9")
            .times(1)
            .returning(|id| Ok(Some(strategy(id))));
        store.expect_load_active().never();

        let catalog = StrategyCatalog::new(Arc::new(store));
        let found = catalog.get_strategy("s9").unwrap().unwrap();

        assert_eq!(found.id, "s9");
        assert_eq!(catalog.snapshot().version, 0);
    }

    #[tokio::test]
    async fn test_refresh_task_swaps_snapshot_and_stops() {
        let mut store = MockStrategyStore::new();
        store
            .expect_load_active()
            .returning(|| Ok(vec![strategy("s1"), strategy("s2")]));

        let catalog = Arc::new(StrategyCatalog::new(Arc::new(store)));
        let (shutdown, rx) = watch::channel(false);
        let task = catalog.spawn_refresh(Duration::from_millis(10), rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while catalog.snapshot().version < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("refresh never ran");

        assert_eq!(catalog.snapshot().strategies.len(), 2);

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("refresh task ignored shutdown")
            .unwrap();
    }
}
