// Background unit preloading — priority queue, single-flight drain, hover
// debounce, and navigation-based prediction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{PreloadConfig, STATS_NAVIGATION_ENTRIES};
use crate::engine::monitor::Evictable;
use crate::host::idle::DelayIdle;
use crate::host::traits::{IdleScheduler, PriorityClassifier, UnitLoader};

/// Discrete ordinal bucket ordering queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityClass {
    Critical,
    High,
    Medium,
    Low,
}

impl PriorityClass {
    /// Drain order: lower rank drains first.
    fn rank(self) -> u8 {
        match self {
            PriorityClass::Critical => 0,
            PriorityClass::High => 1,
            PriorityClass::Medium => 2,
            PriorityClass::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Pending,
    Loading,
    Loaded,
    Failed,
}

struct PreloadJob {
    unit_id: String,
    priority: PriorityClass,
    enqueued_at: Instant,
    status: JobStatus,
}

/// Read-only snapshot of scheduler state.
#[derive(Debug, Clone)]
pub struct PreloadStats {
    pub queue_len: usize,
    pub completed: usize,
    pub failed: u64,
    pub is_processing: bool,
    pub recent_navigation: Vec<String>,
}

struct SchedulerState {
    queue: VecDeque<PreloadJob>,
    completed: HashSet<String>,
    history: VecDeque<String>,
    hover_timers: HashMap<String, JoinHandle<()>>,
    /// Unit currently held by the drain loop, if any.
    loading: Option<String>,
    /// Single-flight guard: at most one drain loop at a time.
    is_processing: bool,
    failed_count: u64,
}

struct SchedulerCore {
    state: Mutex<SchedulerState>,
    loader: Arc<dyn UnitLoader>,
    classifier: Arc<dyn PriorityClassifier>,
    idle: Arc<dyn IdleScheduler>,
    config: PreloadConfig,
    shutdown: CancellationToken,
}

/// Schedules low-priority background loading of units.
///
/// Jobs drain strictly by priority class, FIFO within a class. A unit that
/// loaded once is never re-enqueued; a unit that failed its retry budget
/// stays eligible for a fresh enqueue.
pub struct PreloadScheduler {
    core: Arc<SchedulerCore>,
}

impl PreloadScheduler {
    /// Create a scheduler with the fallback short-delay idle scheduler.
    pub fn new(
        config: PreloadConfig,
        loader: Arc<dyn UnitLoader>,
        classifier: Arc<dyn PriorityClassifier>,
    ) -> Self {
        let idle = Arc::new(DelayIdle::new(Duration::from_millis(
            config.idle_fallback_delay_ms,
        )));
        Self::with_idle(config, loader, classifier, idle)
    }

    /// Create a scheduler deferring to a host-supplied idle signal.
    pub fn with_idle(
        config: PreloadConfig,
        loader: Arc<dyn UnitLoader>,
        classifier: Arc<dyn PriorityClassifier>,
        idle: Arc<dyn IdleScheduler>,
    ) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                state: Mutex::new(SchedulerState {
                    queue: VecDeque::new(),
                    completed: HashSet::new(),
                    history: VecDeque::new(),
                    hover_timers: HashMap::new(),
                    loading: None,
                    is_processing: false,
                    failed_count: 0,
                }),
                loader,
                classifier,
                idle,
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queue a unit for background loading.
    ///
    /// No-op when the unit already loaded, is queued, or is loading right
    /// now. `user_triggered` skips the idle deferral and kicks the drain
    /// immediately.
    pub fn enqueue(&self, unit_id: &str, user_triggered: bool) {
        self.core.enqueue(unit_id, user_triggered);
    }

    /// Signal hover intent over a unit. Rapid repeats within the debounce
    /// window collapse into a single deferred enqueue.
    pub fn on_hover_intent(&self, unit_id: &str) {
        self.core.hover(unit_id);
    }

    /// Record a navigation to `current_unit_id` and return likely next
    /// units from the configured adjacency table. Purely heuristic.
    pub fn predict(&self, current_unit_id: &str) -> Vec<String> {
        self.core.predict(current_unit_id)
    }

    pub fn stats(&self) -> PreloadStats {
        let state = self.core.state.lock();
        PreloadStats {
            queue_len: state.queue.len(),
            completed: state.completed.len(),
            failed: state.failed_count,
            is_processing: state.is_processing,
            recent_navigation: state
                .history
                .iter()
                .rev()
                .take(STATS_NAVIGATION_ENTRIES)
                .rev()
                .cloned()
                .collect(),
        }
    }

    /// Wipe the completed set, the queue, and the navigation history.
    /// Called by the resource monitor under memory pressure.
    pub fn clear_cache(&self) {
        let mut state = self.core.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        state.completed.clear();
        state.history.clear();
        debug!("preload state cleared ({} queued jobs dropped)", dropped);
    }

    /// Cancel drain and debounce tasks and clear all state.
    pub fn destroy(&self) {
        self.core.shutdown.cancel();
        let mut state = self.core.state.lock();
        for (_, handle) in state.hover_timers.drain() {
            handle.abort();
        }
        state.queue.clear();
        state.completed.clear();
        state.history.clear();
        state.loading = None;
        state.is_processing = false;
    }
}

impl Evictable for PreloadScheduler {
    fn evict(&self) {
        self.clear_cache();
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}

impl SchedulerCore {
    fn enqueue(self: &Arc<Self>, unit_id: &str, user_triggered: bool) {
        if self.shutdown.is_cancelled() {
            return;
        }

        // Classify outside the lock: the classifier is host code.
        let priority = self.classifier.classify(unit_id);

        {
            let mut state = self.state.lock();
            if state.completed.contains(unit_id) {
                debug!("enqueue skipped, unit {} already loaded", unit_id);
                return;
            }
            if state.loading.as_deref() == Some(unit_id)
                || state.queue.iter().any(|j| j.unit_id == unit_id)
            {
                return;
            }

            // Insert before the first entry of strictly lower priority;
            // equal-priority jobs keep FIFO order.
            let pos = state
                .queue
                .iter()
                .position(|j| j.priority.rank() > priority.rank())
                .unwrap_or(state.queue.len());
            state.queue.insert(
                pos,
                PreloadJob {
                    unit_id: unit_id.to_string(),
                    priority,
                    enqueued_at: Instant::now(),
                    status: JobStatus::Pending,
                },
            );
            debug!(
                "enqueued unit={} priority={:?} queue_len={}",
                unit_id,
                priority,
                state.queue.len()
            );
        }

        self.kick(user_triggered);
    }

    /// Start the drain loop unless one is already running.
    fn kick(self: &Arc<Self>, immediate: bool) {
        {
            let mut state = self.state.lock();
            if state.is_processing || state.queue.is_empty() {
                return;
            }
            state.is_processing = true;
        }

        let core = Arc::clone(self);
        tokio::spawn(async move {
            if !immediate {
                tokio::select! {
                    _ = core.shutdown.cancelled() => {
                        core.release_drain();
                        return;
                    }
                    _ = core.idle.wait_idle() => {}
                }
            }
            core.drain().await;
        });
    }

    async fn drain(self: Arc<Self>) {
        let inter_job_delay = Duration::from_millis(self.config.inter_job_delay_ms);

        loop {
            if self.shutdown.is_cancelled() {
                self.release_drain();
                return;
            }

            let job = {
                let mut state = self.state.lock();
                loop {
                    match state.queue.pop_front() {
                        // The queue rejects duplicates, but clear_cache
                        // followed by re-enqueue can leave a stale head.
                        Some(j) if state.completed.contains(&j.unit_id) => continue,
                        Some(j) => {
                            state.loading = Some(j.unit_id.clone());
                            break Some(j);
                        }
                        None => {
                            state.is_processing = false;
                            break None;
                        }
                    }
                }
            };
            let Some(mut job) = job else { return };

            job.status = JobStatus::Loading;
            debug!(
                "loading unit={} priority={:?} queued_for_ms={}",
                job.unit_id,
                job.priority,
                job.enqueued_at.elapsed().as_millis()
            );

            let result = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.release_drain();
                    return;
                }
                r = self.load_with_retry(&job.unit_id) => r,
            };

            {
                let mut state = self.state.lock();
                state.loading = None;
                match result {
                    Ok(()) => {
                        job.status = JobStatus::Loaded;
                        state.completed.insert(job.unit_id.clone());
                        debug!(
                            "unit={} {:?} total_completed={}",
                            job.unit_id,
                            job.status,
                            state.completed.len()
                        );
                    }
                    Err(e) => {
                        // The id stays out of the completed set so a later
                        // enqueue can try again.
                        job.status = JobStatus::Failed;
                        state.failed_count += 1;
                        warn!(
                            "unit={} {:?} after retry budget: {}",
                            job.unit_id, job.status, e
                        );
                    }
                }
            }

            // Brief yield between jobs so draining doesn't starve other work.
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.release_drain();
                    return;
                }
                _ = tokio::time::sleep(inter_job_delay) => {}
            }
        }
    }

    async fn load_with_retry(&self, unit_id: &str) -> anyhow::Result<()> {
        let base_delay = Duration::from_millis(self.config.retry_base_delay_ms);
        let mut attempt = 0u32;
        loop {
            match self.loader.load(unit_id).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        "unit {} load failed (attempt {}): {}; retrying in {:?}",
                        unit_id, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn release_drain(&self) {
        let mut state = self.state.lock();
        state.is_processing = false;
        state.loading = None;
    }

    fn hover(self: &Arc<Self>, unit_id: &str) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let debounce = Duration::from_millis(self.config.hover_debounce_ms);

        let mut state = self.state.lock();
        if let Some(previous) = state.hover_timers.remove(unit_id) {
            previous.abort();
        }

        let core = Arc::clone(self);
        let id = unit_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = core.shutdown.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    core.state.lock().hover_timers.remove(&id);
                    core.enqueue(&id, false);
                }
            }
        });
        state.hover_timers.insert(unit_id.to_string(), handle);
    }

    fn predict(self: &Arc<Self>, current: &str) -> Vec<String> {
        {
            let mut state = self.state.lock();
            state.history.push_back(current.to_string());
            while state.history.len() > self.config.max_navigation_history {
                state.history.pop_front();
            }
        }

        if let Some(next) = self.config.adjacency.get(current) {
            return next.clone();
        }
        self.config
            .adjacency
            .iter()
            .filter(|(key, _)| current.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, next)| next.clone())
            .unwrap_or_default()
    }
}
