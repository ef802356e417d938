// Composition root — builds the three components and wires pressure
// eviction from the monitor into the fetch and preload leaves.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::fetch::FetchCoordinator;
use crate::engine::monitor::{Evictable, ResourceMonitor};
use crate::engine::preload::PreloadScheduler;
use crate::host::traits::{
    IdleScheduler, KeyValueStore, MemorySampler, PriorityClassifier, UnitLoader,
};

/// Owns one [`FetchCoordinator`], one [`PreloadScheduler`], and one
/// [`ResourceMonitor`], with the first two registered as the monitor's
/// eviction targets. This is process-wide, long-lived state with an
/// explicit [`shutdown`](Self::shutdown); dropping the manager shuts it
/// down as well.
pub struct ResourceManager<T> {
    fetch: Arc<FetchCoordinator<T>>,
    preload: Arc<PreloadScheduler>,
    monitor: ResourceMonitor,
}

impl<T: Clone + Send + Sync + 'static> ResourceManager<T> {
    /// Build a manager without optional capabilities: no memory sampler
    /// (the monitor degrades to cleanup-only ticks) and no persisted
    /// store.
    pub fn new(
        config: EngineConfig,
        loader: Arc<dyn UnitLoader>,
        classifier: Arc<dyn PriorityClassifier>,
    ) -> Self {
        Self::with_capabilities(config, loader, classifier, None, None, None)
    }

    /// Build a manager with whatever capabilities the host can provide.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_capabilities(
        config: EngineConfig,
        loader: Arc<dyn UnitLoader>,
        classifier: Arc<dyn PriorityClassifier>,
        sampler: Option<Arc<dyn MemorySampler>>,
        store: Option<Arc<dyn KeyValueStore>>,
        idle: Option<Arc<dyn IdleScheduler>>,
    ) -> Self {
        let fetch = Arc::new(FetchCoordinator::new(config.fetch));

        let preload = Arc::new(match idle {
            Some(idle) => PreloadScheduler::with_idle(config.preload, loader, classifier, idle),
            None => PreloadScheduler::new(config.preload, loader, classifier),
        });

        let targets: Vec<Arc<dyn Evictable>> = vec![
            Arc::clone(&fetch) as Arc<dyn Evictable>,
            Arc::clone(&preload) as Arc<dyn Evictable>,
        ];
        let has_sampler = sampler.is_some();
        let has_store = store.is_some();
        let monitor = ResourceMonitor::new(config.monitor, sampler, store, targets);

        info!(
            "resource manager started: sampler={} store={}",
            has_sampler, has_store
        );

        Self {
            fetch,
            preload,
            monitor,
        }
    }

}

impl<T> ResourceManager<T> {
    pub fn fetch(&self) -> &FetchCoordinator<T> {
        &self.fetch
    }

    pub fn preload(&self) -> &PreloadScheduler {
        &self.preload
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    /// Tear down all three components: timers stop, state clears, no
    /// further observer callbacks fire. Idempotent.
    pub fn shutdown(&self) {
        debug!("resource manager shutting down");
        self.monitor.destroy();
        self.preload.destroy();
        self.fetch.destroy();
    }
}

impl<T> Drop for ResourceManager<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
