use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use resource_engine::config::PreloadConfig;
use resource_engine::host::traits::{PriorityClassifier, UnitLoader};
use resource_engine::{PreloadScheduler, PriorityClass};

/// Loader that records load order, per-attempt timestamps, and tracks how
/// many loads run at once. Units listed in `failures` fail that many
/// attempts before succeeding; a count of `u32::MAX` fails forever.
struct RecordingLoader {
    loaded: Mutex<Vec<String>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    failures: Mutex<HashMap<String, u32>>,
    active: AtomicU32,
    max_active: AtomicU32,
    delay: Duration,
}

impl RecordingLoader {
    fn new(delay: Duration) -> Self {
        Self {
            loaded: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            active: AtomicU32::new(0),
            max_active: AtomicU32::new(0),
            delay,
        }
    }

    fn fail_times(&self, unit_id: &str, times: u32) {
        self.failures.lock().insert(unit_id.to_string(), times);
    }

    fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }

    fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl UnitLoader for RecordingLoader {
    async fn load(&self, unit_id: &str) -> Result<()> {
        self.attempts
            .lock()
            .push((unit_id.to_string(), Instant::now()));

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let should_fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(unit_id) {
                Some(0) | None => false,
                Some(n) if *n == u32::MAX => true,
                Some(n) => {
                    *n -= 1;
                    true
                }
            }
        };
        if should_fail {
            bail!("load of {} failed", unit_id);
        }

        self.loaded.lock().push(unit_id.to_string());
        Ok(())
    }
}

/// Classifier keyed by unit id prefix; everything else is Medium.
fn prefix_classifier() -> Arc<dyn PriorityClassifier> {
    Arc::new(|unit_id: &str| {
        if unit_id.starts_with("crit") {
            PriorityClass::Critical
        } else if unit_id.starts_with("high") {
            PriorityClass::High
        } else if unit_id.starts_with("low") {
            PriorityClass::Low
        } else {
            PriorityClass::Medium
        }
    })
}

fn test_config() -> PreloadConfig {
    PreloadConfig {
        hover_debounce_ms: 100,
        inter_job_delay_ms: 50,
        max_retries: 2,
        retry_base_delay_ms: 250,
        idle_fallback_delay_ms: 200,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_drain_respects_priority_then_fifo() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(10)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    // Deferred enqueues: all three land in the queue before the idle
    // fallback delay lets the drain start.
    scheduler.enqueue("crit-a", false);
    scheduler.enqueue("low-b", false);
    scheduler.enqueue("crit-c", false);

    tokio::time::sleep(Duration::from_secs(2)).await;

    // Strict priority order, FIFO among equals.
    assert_eq!(loader.loaded(), vec!["crit-a", "crit-c", "low-b"]);

    let stats = scheduler.stats();
    assert_eq!(stats.queue_len, 0);
    assert_eq!(stats.completed, 3);
    assert!(!stats.is_processing);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_priority_scenario() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(10)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    scheduler.enqueue("low-x", false);
    scheduler.enqueue("crit-y", false);
    scheduler.enqueue("mid-z", false);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(loader.loaded(), vec!["crit-y", "mid-z", "low-x"]);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_noop_once_completed() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(10)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    scheduler.enqueue("mid-a", true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scheduler.stats().completed, 1);

    scheduler.enqueue("mid-a", true);
    assert_eq!(scheduler.stats().queue_len, 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(loader.loaded(), vec!["mid-a"]);
}

#[tokio::test(start_paused = true)]
async fn test_single_drain_loop_at_a_time() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(100)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    // Several immediate triggers in a row must not start parallel drains.
    scheduler.enqueue("mid-a", true);
    scheduler.enqueue("mid-b", true);
    scheduler.enqueue("mid-c", true);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(loader.loaded().len(), 3);
    assert_eq!(loader.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_with_exponential_backoff_then_failed() {
    let loader = Arc::new(RecordingLoader::new(Duration::ZERO));
    loader.fail_times("mid-bad", u32::MAX);
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    scheduler.enqueue("mid-bad", true);
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Initial attempt plus max_retries retries.
    assert_eq!(loader.attempt_count(), 3);
    let attempts = loader.attempts.lock().clone();
    let gap1 = attempts[1].1.duration_since(attempts[0].1);
    let gap2 = attempts[2].1.duration_since(attempts[1].1);
    assert_eq!(gap1, Duration::from_millis(250));
    assert_eq!(gap2, Duration::from_millis(500));

    let stats = scheduler.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);

    // A failed unit stays eligible for a fresh enqueue.
    scheduler.enqueue("mid-bad", true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(loader.attempt_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_within_budget() {
    let loader = Arc::new(RecordingLoader::new(Duration::ZERO));
    loader.fail_times("mid-flaky", 2);
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    scheduler.enqueue("mid-flaky", true);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(loader.loaded(), vec!["mid-flaky"]);
    let stats = scheduler.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_hover_intent_debounces() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(10)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    // Rapid repeats collapse into one enqueue.
    scheduler.on_hover_intent("mid-a");
    scheduler.on_hover_intent("mid-a");
    scheduler.on_hover_intent("mid-a");
    scheduler.on_hover_intent("mid-b");

    tokio::time::sleep(Duration::from_secs(2)).await;

    let mut loaded = loader.loaded();
    loaded.sort();
    assert_eq!(loaded, vec!["mid-a", "mid-b"]);
}

#[tokio::test(start_paused = true)]
async fn test_predict_uses_adjacency_and_history() {
    let mut config = test_config();
    config.adjacency = HashMap::from([
        (
            "payroll".to_string(),
            vec!["payroll.reports".to_string(), "employees".to_string()],
        ),
        ("emp".to_string(), vec!["crm".to_string()]),
    ]);
    let loader = Arc::new(RecordingLoader::new(Duration::ZERO));
    let scheduler = PreloadScheduler::new(config, loader, prefix_classifier());

    // Exact key match.
    assert_eq!(
        scheduler.predict("payroll"),
        vec!["payroll.reports", "employees"]
    );
    // Prefix match.
    assert_eq!(scheduler.predict("employees.detail"), vec!["crm"]);
    // No match.
    assert!(scheduler.predict("dashboard").is_empty());

    let stats = scheduler.stats();
    assert_eq!(
        stats.recent_navigation,
        vec!["payroll", "employees.detail", "dashboard"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_wipes_queue_and_completed_set() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(10)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    scheduler.enqueue("mid-a", true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scheduler.stats().completed, 1);

    // Deferred jobs dropped before the idle delay lets them drain.
    scheduler.enqueue("mid-b", false);
    scheduler.clear_cache();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(loader.loaded(), vec!["mid-a"]);
    let stats = scheduler.stats();
    assert_eq!(stats.queue_len, 0);
    assert_eq!(stats.completed, 0);

    // The completed set was wiped, so a previously loaded unit may load again.
    scheduler.enqueue("mid-a", true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(loader.loaded(), vec!["mid-a", "mid-a"]);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_drain_between_jobs() {
    let loader = Arc::new(RecordingLoader::new(Duration::from_millis(100)));
    let scheduler = PreloadScheduler::new(test_config(), loader.clone(), prefix_classifier());

    scheduler.enqueue("mid-a", true);
    scheduler.enqueue("mid-b", true);
    scheduler.enqueue("mid-c", true);

    // First job finishes at ~100ms; destroy during the inter-job delay.
    tokio::time::sleep(Duration::from_millis(120)).await;
    scheduler.destroy();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(loader.loaded(), vec!["mid-a"]);
    let stats = scheduler.stats();
    assert_eq!(stats.queue_len, 0);
    assert!(!stats.is_processing);

    // Enqueues after destroy are ignored.
    scheduler.enqueue("mid-d", true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(loader.loaded(), vec!["mid-a"]);
}
