// Host capability abstraction — pluggable loaders, samplers, and stores.

pub mod disk_store;
pub mod idle;
pub mod mem_store;
pub mod proc_sampler;
pub mod traits;

pub use traits::{
    IdleScheduler, KeyValueStore, MemorySample, MemorySampler, PriorityClassifier, UnitLoader,
};
