use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::traits::KeyValueStore;

struct StoredEntry {
    inserted_at: Instant,
    value: Vec<u8>,
}

/// In-process [`KeyValueStore`] — the default when the host has no
/// persisted storage. Insertion times drive the monitor's rolling sweep.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            StoredEntry {
                inserted_at: Instant::now(),
                value: value.to_vec(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).map(|e| e.value.clone()))
    }

    fn sweep(&self, max_age: Duration) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.inserted_at) <= max_age);
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
