// Resource pressure monitoring — periodic sampling, bounded history,
// observer fan-out, and threshold-driven eviction.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::host::traits::{KeyValueStore, MemorySample, MemorySampler};

/// Eviction entry point the monitor calls on a threshold breach. This is
/// the only sanctioned cross-subsystem mutation path; implementations
/// must be safe to call from the monitor's tick task without any lock of
/// the monitor held.
pub trait Evictable: Send + Sync {
    fn evict(&self);
}

type Observer = Arc<dyn Fn(&MemorySample) + Send + Sync>;

struct MonitorState {
    history: VecDeque<MemorySample>,
    observers: Vec<(u64, Observer)>,
    next_observer_id: u64,
}

struct MonitorCore {
    state: Mutex<MonitorState>,
    sampler: Option<Arc<dyn MemorySampler>>,
    store: Option<Arc<dyn KeyValueStore>>,
    targets: Vec<Arc<dyn Evictable>>,
    config: MonitorConfig,
    shutdown: CancellationToken,
}

/// Handle returned by [`ResourceMonitor::subscribe`], used only for
/// unregistration. Dropping it does not unsubscribe.
pub struct Subscription {
    id: u64,
    core: Weak<MonitorCore>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(core) = self.core.upgrade() {
            core.state.lock().observers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Samples process memory on a fixed interval, keeps a bounded history,
/// notifies subscribers, and evicts the fetch and preload state when the
/// configured threshold is breached.
///
/// Without a [`MemorySampler`] the monitor degrades to cleanup-only
/// ticks: the persisted store is still swept, nothing is sampled, and no
/// eviction fires.
pub struct ResourceMonitor {
    core: Arc<MonitorCore>,
}

impl ResourceMonitor {
    /// Create a monitor and start its tick loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: MonitorConfig,
        sampler: Option<Arc<dyn MemorySampler>>,
        store: Option<Arc<dyn KeyValueStore>>,
        targets: Vec<Arc<dyn Evictable>>,
    ) -> Self {
        let core = Arc::new(MonitorCore {
            state: Mutex::new(MonitorState {
                history: VecDeque::new(),
                observers: Vec::new(),
                next_observer_id: 0,
            }),
            sampler,
            store,
            targets,
            config,
            shutdown: CancellationToken::new(),
        });

        let tick_core = Arc::clone(&core);
        let interval = Duration::from_millis(core.config.cleanup_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tick_core.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => tick_core.tick(),
                }
            }
        });

        Self { core }
    }

    /// Register a callback invoked synchronously with every new sample.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MemorySample) + Send + Sync + 'static,
    {
        let mut state = self.core.state.lock();
        let id = state.next_observer_id;
        state.next_observer_id += 1;
        state.observers.push((id, Arc::new(callback)));
        Subscription {
            id,
            core: Arc::downgrade(&self.core),
        }
    }

    /// Take a fresh sample. `None` when no sampler is available or it fails.
    pub fn current_usage(&self) -> Option<MemorySample> {
        let sampler = self.core.sampler.as_ref()?;
        match sampler.sample() {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!("memory sampling unavailable: {}", e);
                None
            }
        }
    }

    /// Samples recorded within the trailing `minutes`, oldest first.
    pub fn trend(&self, minutes: u64) -> Vec<MemorySample> {
        let window = Duration::from_secs(minutes * 60);
        let now = Instant::now();
        self.core
            .state
            .lock()
            .history
            .iter()
            .filter(|s| now.duration_since(s.at) <= window)
            .cloned()
            .collect()
    }

    /// Stop the tick loop and clear observers and history. No observer
    /// callback fires after this returns.
    pub fn destroy(&self) {
        self.core.shutdown.cancel();
        let mut state = self.core.state.lock();
        state.observers.clear();
        state.history.clear();
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}

impl MonitorCore {
    fn tick(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        // Routine sweep of the persisted store, independent of sampling.
        if let Some(store) = &self.store {
            let max_age = Duration::from_millis(self.config.store_max_age_ms);
            match store.sweep(max_age) {
                Ok(0) => {}
                Ok(n) => debug!("store sweep dropped {} entries", n),
                Err(e) => warn!("store sweep failed: {}", e),
            }
        }

        // Degraded mode: no sampler, cleanup-only tick.
        let Some(sampler) = &self.sampler else { return };
        let sample = match sampler.sample() {
            Ok(s) => s,
            Err(e) => {
                debug!("memory sampling unavailable: {}", e);
                return;
            }
        };

        {
            let mut state = self.state.lock();
            state.history.push_back(sample.clone());
            while state.history.len() > self.config.max_history_samples {
                state.history.pop_front();
            }
        }

        self.notify(&sample);

        if sample.used_bytes > self.config.memory_threshold_bytes {
            warn!(
                "memory pressure: used={} threshold={}, running aggressive cleanup",
                sample.used_bytes, self.config.memory_threshold_bytes
            );
            self.aggressive_cleanup();
        }
    }

    /// Fan a sample out to subscribers. The observer list is snapshotted
    /// first so a callback can subscribe or unsubscribe without
    /// deadlocking, and a panicking callback cannot kill the tick loop.
    fn notify(&self, sample: &MemorySample) {
        let observers: Vec<(u64, Observer)> = self.state.lock().observers.clone();
        for (id, callback) in observers {
            if catch_unwind(AssertUnwindSafe(|| callback(sample))).is_err() {
                warn!("observer {} panicked during notification", id);
            }
        }
    }

    fn aggressive_cleanup(&self) {
        for target in &self.targets {
            target.evict();
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!("store clear failed: {}", e);
            }
        }
    }
}
