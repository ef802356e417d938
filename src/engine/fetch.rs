// Request coalescing and TTL caching — one producer call per key, ever, at a time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::engine::monitor::Evictable;
use crate::error::FetchError;

type FetchResult<T> = Result<T, FetchError>;
type ResultReceiver<T> = watch::Receiver<Option<FetchResult<T>>>;

struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) <= self.ttl
    }
}

struct PendingFetch<T> {
    rx: ResultReceiver<T>,
    /// Guards removal: a producer that was in flight when `invalidate`
    /// ran must not remove a successor's pending entry.
    generation: u64,
}

struct FetchState<T> {
    cache: HashMap<String, CacheEntry<T>>,
    pending: HashMap<String, PendingFetch<T>>,
    next_generation: u64,
}

/// What `get` decided to do while the state lock was held.
enum GetAction<T> {
    Hit(T),
    Wait(ResultReceiver<T>),
    Run {
        tx: watch::Sender<Option<FetchResult<T>>>,
        rx: ResultReceiver<T>,
        generation: u64,
    },
}

/// Deduplicating TTL request cache.
///
/// Concurrent `get` calls for the same key coalesce onto a single producer
/// invocation; the one result (or error) fans out to every caller. Each
/// coordinator caches one value family `T`.
pub struct FetchCoordinator<T> {
    state: Arc<Mutex<FetchState<T>>>,
    ttl: Duration,
    shutdown: CancellationToken,
}

impl<T: Clone + Send + Sync + 'static> FetchCoordinator<T> {
    /// Create a coordinator and start its periodic expiry sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: FetchConfig) -> Self {
        let state = Arc::new(Mutex::new(FetchState {
            cache: HashMap::new(),
            pending: HashMap::new(),
            next_generation: 0,
        }));
        let shutdown = CancellationToken::new();

        let sweep_state = Arc::clone(&state);
        let sweep_token = shutdown.clone();
        let sweep_interval = Duration::from_millis(config.sweep_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sweep_token.cancelled() => break,
                    _ = tokio::time::sleep(sweep_interval) => {
                        let removed = Self::remove_expired(&sweep_state);
                        if removed > 0 {
                            debug!("expiry sweep removed {} cache entries", removed);
                        }
                    }
                }
            }
        });

        Self {
            state,
            ttl: Duration::from_millis(config.cache_ttl_ms),
            shutdown,
        }
    }

    /// Fetch the value for `key`.
    ///
    /// An in-flight request for the same key is joined instead of invoking
    /// `producer` again; a fresh cached entry short-circuits the producer
    /// entirely unless `force_refresh` is set. The producer runs on a
    /// spawned task, so a caller dropping its own future cannot strand the
    /// other coalesced callers.
    pub async fn get<F, Fut>(&self, key: &str, producer: F, force_refresh: bool) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let action = {
            let mut state = self.state.lock();

            if let Some(pending) = state.pending.get(key) {
                GetAction::Wait(pending.rx.clone())
            } else {
                let cached = if force_refresh {
                    None
                } else {
                    state
                        .cache
                        .get(key)
                        .filter(|entry| entry.is_fresh(Instant::now()))
                        .map(|entry| entry.value.clone())
                };
                match cached {
                    Some(value) => GetAction::Hit(value),
                    None => {
                        let generation = state.next_generation;
                        state.next_generation += 1;
                        let (tx, rx) = watch::channel(None);
                        state.pending.insert(
                            key.to_string(),
                            PendingFetch {
                                rx: rx.clone(),
                                generation,
                            },
                        );
                        GetAction::Run { tx, rx, generation }
                    }
                }
            }
        };

        match action {
            GetAction::Hit(value) => Ok(value),
            GetAction::Wait(rx) => Self::wait_shared(rx).await,
            GetAction::Run { tx, rx, generation } => {
                let fut = producer();
                let state = Arc::clone(&self.state);
                let ttl = self.ttl;
                let key = key.to_string();

                tokio::spawn(async move {
                    let result = fut.await.map_err(FetchError::producer);
                    {
                        let mut state = state.lock();
                        let owns_entry = state
                            .pending
                            .get(&key)
                            .map(|p| p.generation == generation)
                            .unwrap_or(false);
                        if owns_entry {
                            state.pending.remove(&key);
                        }
                        // Failures are not cached; the next get retries.
                        if let Ok(value) = &result {
                            state.cache.insert(
                                key.clone(),
                                CacheEntry {
                                    value: value.clone(),
                                    created_at: Instant::now(),
                                    ttl,
                                },
                            );
                        }
                    }
                    if let Err(ref e) = result {
                        debug!("fetch key={} failed: {}", key, e);
                    }
                    let _ = tx.send(Some(result));
                });

                Self::wait_shared(rx).await
            }
        }
    }

    async fn wait_shared(mut rx: ResultReceiver<T>) -> FetchResult<T> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without publishing — the producer task
                // panicked. Surface it as a failure rather than hanging.
                warn!("fetch task dropped without a result");
                return Err(FetchError::producer(anyhow!("producer task aborted")));
            }
        }
    }
}

impl<T> FetchCoordinator<T> {
    fn remove_expired(state: &Mutex<FetchState<T>>) -> usize {
        let now = Instant::now();
        let mut state = state.lock();
        let before = state.cache.len();
        state.cache.retain(|_, entry| entry.is_fresh(now));
        before - state.cache.len()
    }

    /// Remove cached entries and pending requests.
    ///
    /// With no pattern everything goes. With a pattern, only keys that
    /// contain it as a substring go. The empty pattern matches nothing.
    pub fn invalidate(&self, pattern: Option<&str>) {
        let mut state = self.state.lock();
        match pattern {
            None => {
                let n = state.cache.len();
                state.cache.clear();
                state.pending.clear();
                debug!("invalidate all: {} cache entries dropped", n);
            }
            Some("") => {
                debug!("invalidate: empty pattern matches nothing");
            }
            Some(p) => {
                state.cache.retain(|k, _| !k.contains(p));
                state.pending.retain(|k, _| !k.contains(p));
            }
        }
    }

    /// Drop entries older than their TTL. Pending requests are untouched.
    pub fn cleanup(&self) {
        let removed = Self::remove_expired(&self.state);
        if removed > 0 {
            debug!("cleanup removed {} expired entries", removed);
        }
    }

    /// Stop the sweep timer and clear all state.
    pub fn destroy(&self) {
        self.shutdown.cancel();
        let mut state = self.state.lock();
        state.cache.clear();
        state.pending.clear();
    }
}

impl<T: Clone + Send + Sync + 'static> Evictable for FetchCoordinator<T> {
    fn evict(&self) {
        self.invalidate(None);
    }
}

impl<T> Drop for FetchCoordinator<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
