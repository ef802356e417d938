use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use crate::engine::preload::PriorityClass;

/// One point-in-time reading of process memory usage.
#[derive(Debug, Clone)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub limit_bytes: u64,
    pub at: Instant,
}

/// Loads one unit (route chunk, dataset, component bundle) in the background.
#[async_trait]
pub trait UnitLoader: Send + Sync {
    async fn load(&self, unit_id: &str) -> Result<()>;
}

/// Buckets a unit id into a priority class for the preload queue.
pub trait PriorityClassifier: Send + Sync {
    fn classify(&self, unit_id: &str) -> PriorityClass;
}

impl<F> PriorityClassifier for F
where
    F: Fn(&str) -> PriorityClass + Send + Sync,
{
    fn classify(&self, unit_id: &str) -> PriorityClass {
        self(unit_id)
    }
}

/// Reads current process memory usage. Optional capability: a host without
/// memory instrumentation simply doesn't provide one, and the monitor
/// degrades to cleanup-only ticks.
pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> Result<MemorySample>;
}

/// Best-effort persisted key/value store swept by the resource monitor.
///
/// Entries carry their insertion time; `sweep` drops everything older than
/// the cutoff, `clear` drops everything irrespective of age.
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn sweep(&self, max_age: std::time::Duration) -> Result<usize>;
    fn clear(&self) -> Result<()>;
}

/// Defers non-urgent work until the host reports idle capacity.
#[async_trait]
pub trait IdleScheduler: Send + Sync {
    async fn wait_idle(&self);
}
