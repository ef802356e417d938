use std::collections::HashMap;

use serde::Deserialize;

/// Cap on the navigation history used for prediction.
pub const MAX_NAVIGATION_HISTORY: usize = 10;

/// Cap on retained memory samples; oldest evicted first.
pub const MAX_HISTORY_SAMPLES: usize = 100;

/// Number of trailing navigation entries included in a stats snapshot.
pub const STATS_NAVIGATION_ENTRIES: usize = 5;

/// Configuration for the fetch coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Time-to-live for cached entries, in milliseconds.
    pub cache_ttl_ms: u64,
    /// Interval of the periodic expiry sweep, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5 * 60 * 1000,
            sweep_interval_ms: 60 * 1000,
        }
    }
}

/// Configuration for the preload scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct PreloadConfig {
    /// Window for collapsing repeated hover signals on one unit, in milliseconds.
    pub hover_debounce_ms: u64,
    /// Pause between drained jobs so background loading doesn't starve other work.
    pub inter_job_delay_ms: u64,
    /// Retries after the first failed load attempt.
    pub max_retries: u32,
    /// Base delay for exponential retry backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Fallback deferral before a non-user-triggered drain starts, in milliseconds.
    pub idle_fallback_delay_ms: u64,
    /// Cap on the navigation history ring.
    pub max_navigation_history: usize,
    /// Static adjacency table: unit id (exact or prefix) -> likely next units.
    pub adjacency: HashMap<String, Vec<String>>,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            hover_debounce_ms: 100,
            inter_job_delay_ms: 50,
            max_retries: 2,
            retry_base_delay_ms: 250,
            idle_fallback_delay_ms: 200,
            max_navigation_history: MAX_NAVIGATION_HISTORY,
            adjacency: HashMap::new(),
        }
    }
}

/// Configuration for the resource monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Tick interval, in milliseconds.
    pub cleanup_interval_ms: u64,
    /// Absolute used-memory threshold that triggers aggressive cleanup.
    pub memory_threshold_bytes: u64,
    /// Cap on retained memory samples.
    pub max_history_samples: usize,
    /// Rolling age limit for the persisted store's routine sweep, in milliseconds.
    pub store_max_age_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 60 * 1000,
            memory_threshold_bytes: 400 * 1024 * 1024,
            max_history_samples: MAX_HISTORY_SAMPLES,
            store_max_age_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Top-level configuration for the resource engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub preload: PreloadConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}
