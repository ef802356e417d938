//! Embedded resource manager for long-lived client processes.
//!
//! Three components, composed as leaves feeding a coordinator:
//!
//! - [`FetchCoordinator`]: TTL request cache with in-flight deduplication —
//!   concurrent identical fetches coalesce onto one producer call.
//! - [`PreloadScheduler`]: priority queue plus idle/hover/predictive
//!   triggers for background unit loading, with retry and backoff.
//! - [`ResourceMonitor`]: periodic memory sampling, bounded history,
//!   observer fan-out, and threshold-driven eviction of the other two.
//!
//! The host supplies the data producers, a [`host::UnitLoader`], a
//! [`host::PriorityClassifier`], and optional capabilities (memory
//! sampling, a persisted key/value store, an idle scheduler). Everything
//! else is owned here.

pub mod config;
pub mod engine;
pub mod error;
pub mod host;

pub use config::EngineConfig;
pub use engine::fetch::FetchCoordinator;
pub use engine::manager::ResourceManager;
pub use engine::monitor::{Evictable, ResourceMonitor, Subscription};
pub use engine::preload::{PreloadScheduler, PreloadStats, PriorityClass};
pub use error::FetchError;
pub use host::traits::MemorySample;
