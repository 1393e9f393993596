//! Progress tracking and speed statistics
//!
//! Per-task speed estimation with exponential moving average smoothing and
//! ETA derivation, plus a registry that aggregates across active tasks.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tokio::sync::RwLock;

/// Weight given to the newest speed sample in the moving average
const EMA_ALPHA: f64 = 0.2;

/// Number of speed samples retained per task
const MAX_HISTORY: usize = 50;

/// A refined view of one task's transfer rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedSnapshot {
    /// Instantaneous speed from the latest byte delta (B/s)
    pub current_speed: f64,
    /// Mean speed over the whole download (B/s)
    pub average_speed: f64,
    /// Exponentially smoothed speed (B/s); use this for ETA display
    pub smoothed_speed: f64,
    /// Seconds remaining, from the smoothed speed
    pub eta_seconds: Option<u64>,
    /// Progress percentage (0.0 - 100.0), when the total is known
    pub progress_percent: f64,
}

/// Tracks one task's byte counts over time
#[derive(Debug)]
pub struct TaskProgressTracker {
    total_bytes: Option<u64>,
    start_time: Instant,
    last_measurement: Instant,
    last_bytes: u64,
    smoothed_speed: f64,
    history: VecDeque<f64>,
}

impl TaskProgressTracker {
    pub fn new(total_bytes: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            total_bytes,
            start_time: now,
            last_measurement: now,
            last_bytes: 0,
            smoothed_speed: 0.0,
            history: VecDeque::with_capacity(MAX_HISTORY),
        }
    }

    pub fn set_total(&mut self, total_bytes: Option<u64>) {
        if total_bytes.is_some() {
            self.total_bytes = total_bytes;
        }
    }

    /// Record a new downloaded-byte count and derive speeds
    pub fn update(&mut self, downloaded_bytes: u64) -> SpeedSnapshot {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_measurement).as_secs_f64();

        let current_speed = if elapsed > 0.0 {
            downloaded_bytes.saturating_sub(self.last_bytes) as f64 / elapsed
        } else {
            0.0
        };

        self.history.push_back(current_speed);
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        if current_speed > 0.0 {
            if self.smoothed_speed == 0.0 {
                self.smoothed_speed = current_speed;
            } else {
                self.smoothed_speed =
                    EMA_ALPHA * current_speed + (1.0 - EMA_ALPHA) * self.smoothed_speed;
            }
        }

        let total_elapsed = now.duration_since(self.start_time).as_secs_f64();
        let average_speed = if total_elapsed > 0.0 {
            downloaded_bytes as f64 / total_elapsed
        } else {
            0.0
        };

        let progress_percent = match self.total_bytes {
            Some(total) if total > 0 => {
                (downloaded_bytes as f64 / total as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        };

        let eta_seconds = match self.total_bytes {
            Some(total) if self.smoothed_speed > 0.0 && downloaded_bytes < total => {
                Some(((total - downloaded_bytes) as f64 / self.smoothed_speed) as u64)
            }
            _ => None,
        };

        self.last_measurement = now;
        self.last_bytes = downloaded_bytes;

        SpeedSnapshot {
            current_speed,
            average_speed,
            smoothed_speed: self.smoothed_speed,
            eta_seconds,
            progress_percent,
        }
    }

    pub fn smoothed_speed(&self) -> f64 {
        self.smoothed_speed
    }
}

/// Registry of per-task trackers keyed by task id
#[derive(Debug, Default)]
pub struct ProgressTracker {
    trackers: RwLock<HashMap<String, TaskProgressTracker>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, task_id: &str, total_bytes: Option<u64>) {
        let mut trackers = self.trackers.write().await;
        trackers.insert(task_id.to_string(), TaskProgressTracker::new(total_bytes));
    }

    /// Update a task's byte count, registering it on first sight
    pub async fn update(
        &self,
        task_id: &str,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    ) -> SpeedSnapshot {
        let mut trackers = self.trackers.write().await;
        let tracker = trackers
            .entry(task_id.to_string())
            .or_insert_with(|| TaskProgressTracker::new(total_bytes));
        tracker.set_total(total_bytes);
        tracker.update(downloaded_bytes)
    }

    /// Drop a finished task's tracker
    pub async fn finish(&self, task_id: &str) {
        let mut trackers = self.trackers.write().await;
        trackers.remove(task_id);
    }

    /// Mean smoothed speed across tasks that have moved bytes
    pub async fn average_speed(&self) -> f64 {
        let trackers = self.trackers.read().await;
        let speeds: Vec<f64> = trackers
            .values()
            .map(|t| t.smoothed_speed())
            .filter(|s| *s > 0.0)
            .collect();

        if speeds.is_empty() {
            0.0
        } else {
            speeds.iter().sum::<f64>() / speeds.len() as f64
        }
    }

    pub async fn tracked_count(&self) -> usize {
        self.trackers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_progress_percent_and_eta() {
        let mut tracker = TaskProgressTracker::new(Some(1000));
        // Backdate the measurement baseline so speed is well-defined
        tracker.last_measurement = Instant::now() - Duration::from_secs(1);
        tracker.start_time = Instant::now() - Duration::from_secs(1);

        let snapshot = tracker.update(500);
        assert!((snapshot.progress_percent - 50.0).abs() < 0.01);
        assert!(snapshot.current_speed > 0.0);
        assert!(snapshot.eta_seconds.is_some());
    }

    #[test]
    fn test_unknown_total_gives_no_eta() {
        let mut tracker = TaskProgressTracker::new(None);
        tracker.last_measurement = Instant::now() - Duration::from_millis(100);

        let snapshot = tracker.update(500);
        assert_eq!(snapshot.progress_percent, 0.0);
        assert!(snapshot.eta_seconds.is_none());
    }

    #[test]
    fn test_smoothing_dampens_spikes() {
        let mut tracker = TaskProgressTracker::new(Some(1_000_000));

        tracker.last_measurement = Instant::now() - Duration::from_secs(1);
        tracker.update(1000); // ~1000 B/s
        let baseline = tracker.smoothed_speed();

        tracker.last_measurement = Instant::now() - Duration::from_millis(10);
        let snapshot = tracker.update(2000); // ~100x spike

        // The smoothed value moves toward the spike but far less than the
        // instantaneous reading.
        assert!(snapshot.smoothed_speed > baseline);
        assert!(snapshot.smoothed_speed < snapshot.current_speed);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = TaskProgressTracker::new(Some(1_000_000));
        for i in 0..(MAX_HISTORY + 20) {
            tracker.update((i * 10) as u64);
        }
        assert!(tracker.history.len() <= MAX_HISTORY);
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = ProgressTracker::new();
        assert_eq!(registry.tracked_count().await, 0);

        registry.register("t1", Some(100)).await;
        registry.update("t1", 50, None).await;
        // Unregistered ids are created on the fly
        registry.update("t2", 10, Some(100)).await;
        assert_eq!(registry.tracked_count().await, 2);

        registry.finish("t1").await;
        assert_eq!(registry.tracked_count().await, 1);
    }

    #[tokio::test]
    async fn test_average_speed_ignores_idle_tasks() {
        let registry = ProgressTracker::new();
        registry.register("idle", Some(100)).await;
        assert_eq!(registry.average_speed().await, 0.0);
    }
}
