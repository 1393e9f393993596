//! Download manager: orchestrates concurrent video downloads
//!
//! Owns the task map and the pending queue, spawns downloads up to the
//! configured concurrency limit, refills slots as tasks finish, re-queues
//! failed tasks while retry budget remains, and emits events over an
//! unbounded channel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::config::DownloadConfig;
use crate::core::downloader::{DownloaderConfig, HttpDownloader};
use crate::core::error_handling::RetryPolicy;
use crate::core::integrity;
use crate::core::models::{
    AppResult, DownloadTask, ProgressUpdate, QueueStats, TaskStatus, VideoSource,
};
use crate::core::progress_tracker::ProgressTracker;

/// Events emitted by the download manager
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    TaskQueued {
        task_id: String,
        task: DownloadTask,
    },
    TaskStarted {
        task_id: String,
    },
    TaskProgress {
        task_id: String,
        progress: ProgressUpdate,
    },
    TaskCompleted {
        task_id: String,
        file_path: String,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    TaskPaused {
        task_id: String,
    },
    TaskResumed {
        task_id: String,
    },
    TaskCancelled {
        task_id: String,
    },
    StatsUpdated {
        stats: QueueStats,
    },
}

pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

/// Main download manager
#[derive(Clone)]
pub struct DownloadManager {
    config: DownloadConfig,

    downloader: Arc<HttpDownloader>,

    /// Every task ever added, keyed by id
    tasks: Arc<RwLock<HashMap<String, DownloadTask>>>,

    /// Ids waiting for a download slot, in FIFO order
    queue: Arc<Mutex<VecDeque<String>>>,

    /// In-flight downloads and their join handles
    active: Arc<RwLock<HashMap<String, tokio::task::JoinHandle<()>>>>,

    /// Ids cancelled while their download was in flight
    cancelled: Arc<RwLock<HashSet<String>>>,

    event_tx: EventSender,

    event_rx: Arc<std::sync::Mutex<Option<EventReceiver>>>,

    progress_rx: Arc<std::sync::Mutex<Option<mpsc::UnboundedReceiver<ProgressUpdate>>>>,

    tracker: Arc<ProgressTracker>,

    retry_policy: RetryPolicy,

    is_running: Arc<AtomicBool>,

    is_paused: Arc<AtomicBool>,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> AppResult<Self> {
        let downloader_config = DownloaderConfig {
            max_concurrent: config.concurrent_downloads.max(1),
            timeout: config.timeout_seconds,
            user_agent: config.user_agent.clone(),
            resume_enabled: config.resume_enabled,
        };

        let mut downloader = HttpDownloader::new(downloader_config)?;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        downloader.set_progress_channel(progress_tx);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let retry_policy = RetryPolicy {
            max_attempts: (config.retry_attempts as u32).max(1),
            ..Default::default()
        };

        Ok(Self {
            config,
            downloader: Arc::new(downloader),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            active: Arc::new(RwLock::new(HashMap::new())),
            cancelled: Arc::new(RwLock::new(HashSet::new())),
            event_tx,
            event_rx: Arc::new(std::sync::Mutex::new(Some(event_rx))),
            progress_rx: Arc::new(std::sync::Mutex::new(Some(progress_rx))),
            tracker: Arc::new(ProgressTracker::new()),
            retry_policy,
            is_running: Arc::new(AtomicBool::new(false)),
            is_paused: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Take the event receiver. Can be taken once; returns None afterwards.
    pub fn take_event_receiver(&self) -> Option<EventReceiver> {
        self.event_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Start the manager: applies the rate limit, spawns the progress
    /// pump, and begins filling download slots from the queue.
    pub async fn start(&self) -> AppResult<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Download manager is already running");
            return Ok(());
        }

        info!(
            "Starting download manager with concurrent limit: {}",
            self.config.concurrent_downloads
        );

        self.downloader
            .bandwidth_controller()
            .set_limit(self.config.rate_limit_bytes)
            .await;

        if let Some(mut progress_rx) = self.progress_rx.lock().ok().and_then(|mut g| g.take()) {
            let manager = self.clone();
            tokio::spawn(async move {
                while let Some(update) = progress_rx.recv().await {
                    manager.handle_progress(update).await;
                }
            });
        }

        self.fill_slots().await;
        Ok(())
    }

    /// Stop the manager: cancels all in-flight downloads and clears the
    /// queue, marking affected tasks Cancelled.
    pub async fn stop(&self) -> AppResult<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping download manager");

        let drained: Vec<(String, tokio::task::JoinHandle<()>)> = {
            let mut active = self.active.write().await;
            active.drain().collect()
        };
        for (task_id, handle) in drained {
            handle.abort();
            self.set_status(&task_id, TaskStatus::Cancelled, None).await;
            self.emit(DownloadEvent::TaskCancelled { task_id });
        }

        let queued: Vec<String> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        for task_id in queued {
            self.set_status(&task_id, TaskStatus::Cancelled, None).await;
            self.emit(DownloadEvent::TaskCancelled { task_id });
        }

        self.cancelled.write().await.clear();
        self.emit_stats().await;
        Ok(())
    }

    /// Queue a download for a detected video source
    pub async fn add(&self, source: VideoSource) -> AppResult<String> {
        let filename = self.build_filename(&source).await;
        let task = DownloadTask::new(
            source,
            self.config.output_directory.clone(),
            filename,
        );
        let task_id = task.id.clone();

        debug!("Queued download task: {} ({})", task.filename, task_id);

        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task_id.clone(), task.clone());
        }
        {
            let mut queue = self.queue.lock().await;
            queue.push_back(task_id.clone());
        }

        self.emit(DownloadEvent::TaskQueued {
            task_id: task_id.clone(),
            task,
        });

        if self.is_running() && !self.is_paused() {
            self.fill_slots().await;
        }

        Ok(task_id)
    }

    /// Queue downloads for a selection of video sources
    pub async fn add_all(&self, sources: Vec<VideoSource>) -> AppResult<Vec<String>> {
        let mut ids = Vec::with_capacity(sources.len());
        for source in sources {
            ids.push(self.add(source).await?);
        }
        Ok(ids)
    }

    /// Pause everything; in-flight transfers stop at their next chunk and
    /// re-enter the front of the queue as Paused.
    pub async fn pause(&self) {
        self.is_paused.store(true, Ordering::SeqCst);
        self.downloader.pause_all();
        info!("Downloads paused");
    }

    /// Resume paused tasks, capacity permitting
    pub async fn resume(&self) {
        self.is_paused.store(false, Ordering::SeqCst);
        self.downloader.resume_all();

        let paused_ids: Vec<String> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.status == TaskStatus::Paused)
                .map(|t| t.id.clone())
                .collect()
        };

        {
            let mut queue = self.queue.lock().await;
            for id in &paused_ids {
                if !queue.contains(id) {
                    queue.push_back(id.clone());
                }
            }
        }

        for task_id in paused_ids {
            self.emit(DownloadEvent::TaskResumed { task_id });
        }

        info!("Downloads resumed");
        if self.is_running() {
            self.fill_slots().await;
        }
    }

    /// Cancel one task, queued or in flight
    pub async fn cancel(&self, task_id: &str) -> AppResult<()> {
        let is_active = self.active.read().await.contains_key(task_id);

        if is_active {
            self.cancelled.write().await.insert(task_id.to_string());
            self.downloader.cancel(task_id).await;
            return Ok(());
        }

        {
            let mut queue = self.queue.lock().await;
            queue.retain(|id| id != task_id);
        }

        let known = {
            let tasks = self.tasks.read().await;
            tasks
                .get(task_id)
                .map(|t| !t.status.is_terminal())
                .unwrap_or(false)
        };

        if known {
            self.set_status(task_id, TaskStatus::Cancelled, None).await;
            self.emit(DownloadEvent::TaskCancelled {
                task_id: task_id.to_string(),
            });
            self.emit_stats().await;
        }

        Ok(())
    }

    /// Cancel a task and drop it from the task map
    pub async fn remove(&self, task_id: &str) -> AppResult<()> {
        self.cancel(task_id).await?;
        let mut tasks = self.tasks.write().await;
        tasks.remove(task_id);
        Ok(())
    }

    pub async fn get_task(&self, task_id: &str) -> Option<DownloadTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn all_tasks(&self) -> Vec<DownloadTask> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub async fn tasks_with_status(&self, status: TaskStatus) -> Vec<DownloadTask> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub async fn pending_tasks(&self) -> Vec<DownloadTask> {
        self.tasks_with_status(TaskStatus::Pending).await
    }

    pub async fn active_tasks(&self) -> Vec<DownloadTask> {
        self.tasks_with_status(TaskStatus::Downloading).await
    }

    pub async fn completed_tasks(&self) -> Vec<DownloadTask> {
        self.tasks_with_status(TaskStatus::Completed).await
    }

    pub async fn failed_tasks(&self) -> Vec<DownloadTask> {
        self.tasks_with_status(TaskStatus::Failed).await
    }

    /// Aggregate statistics over all known tasks
    pub async fn queue_stats(&self) -> QueueStats {
        let tasks = self.tasks.read().await;
        let total = tasks.len();

        let mut stats = QueueStats {
            total_tasks: total,
            average_speed: self.tracker.average_speed().await,
            ..Default::default()
        };

        let mut progress_sum = 0.0;
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending_tasks += 1,
                TaskStatus::Downloading => stats.active_tasks += 1,
                TaskStatus::Paused => stats.paused_tasks += 1,
                TaskStatus::Completed => stats.completed_tasks += 1,
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Cancelled => {}
            }
            stats.total_downloaded += task.stats.downloaded_bytes;
            progress_sum += task.stats.progress;
        }

        if total > 0 {
            stats.overall_progress = progress_sum / total as f64;
        }

        stats
    }

    /// Block until every known task is in a terminal state
    pub async fn wait_until_idle(&self) {
        loop {
            let all_terminal = {
                let tasks = self.tasks.read().await;
                tasks.values().all(|t| t.status.is_terminal())
            };
            if all_terminal {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    /// Start queued tasks until the concurrency limit is reached.
    ///
    /// The active-map write lock is held from the capacity check through
    /// the handle insert, so refills racing in from concurrent task
    /// completions cannot both claim the last slot.
    fn fill_slots(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.fill_slots_inner())
    }

    async fn fill_slots_inner(&self) {
        loop {
            if !self.is_running() || self.is_paused() {
                return;
            }

            let mut active = self.active.write().await;
            if active.len() >= self.config.concurrent_downloads.max(1) {
                return;
            }

            let next = {
                let mut queue = self.queue.lock().await;
                queue.pop_front()
            };
            let Some(task_id) = next else {
                return;
            };

            let startable = {
                let tasks = self.tasks.read().await;
                tasks
                    .get(&task_id)
                    .map(|t| !t.status.is_terminal())
                    .unwrap_or(false)
            };
            if !startable {
                continue;
            }

            self.set_status(&task_id, TaskStatus::Downloading, None).await;
            self.emit(DownloadEvent::TaskStarted {
                task_id: task_id.clone(),
            });

            let manager = self.clone();
            let id_for_spawn = task_id.clone();
            let handle = tokio::spawn(async move {
                manager.run_task(id_for_spawn).await;
            });
            active.insert(task_id, handle);
        }
    }

    /// Drive one task through a single download attempt and route the
    /// outcome: completion, cancellation, pause re-queue, or retry.
    async fn run_task(self, task_id: String) {
        let snapshot = {
            let tasks = self.tasks.read().await;
            tasks.get(&task_id).cloned()
        };
        let Some(snapshot) = snapshot else {
            self.active.write().await.remove(&task_id);
            return;
        };

        let result = self.downloader.download(snapshot).await;

        // Route the outcome before releasing the slot so the number of
        // tasks marked Downloading never exceeds the active map's bound.
        match result {
            Ok(done) => self.route_outcome(done).await,
            Err(e) => {
                warn!("Download task {} errored: {}", task_id, e);
                self.set_status(&task_id, TaskStatus::Failed, Some(e.to_string()))
                    .await;
                self.emit(DownloadEvent::TaskFailed {
                    task_id: task_id.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.active.write().await.remove(&task_id);
        self.emit_stats().await;
        self.fill_slots().await;
    }

    async fn route_outcome(&self, done: DownloadTask) {
        let task_id = done.id.clone();

        if done.status == TaskStatus::Completed {
            if let Err(message) = self.check_integrity(&done).await {
                self.set_status(&task_id, TaskStatus::Failed, Some(message.clone()))
                    .await;
                self.tracker.finish(&task_id).await;
                self.emit(DownloadEvent::TaskFailed {
                    task_id,
                    error: message,
                });
                return;
            }

            {
                let mut tasks = self.tasks.write().await;
                if let Some(task) = tasks.get_mut(&task_id) {
                    *task = done.clone();
                }
            }
            self.tracker.finish(&task_id).await;
            self.emit(DownloadEvent::TaskCompleted {
                task_id,
                file_path: done.full_path().to_string_lossy().to_string(),
            });
            return;
        }

        // Attempt failed: figure out why
        let was_cancelled = self.cancelled.write().await.remove(&task_id);
        if was_cancelled {
            self.set_status(&task_id, TaskStatus::Cancelled, done.error_message)
                .await;
            self.tracker.finish(&task_id).await;
            self.emit(DownloadEvent::TaskCancelled { task_id });
            return;
        }

        if self.is_paused() {
            self.set_status(&task_id, TaskStatus::Paused, None).await;
            {
                let mut queue = self.queue.lock().await;
                queue.push_front(task_id.clone());
            }
            self.emit(DownloadEvent::TaskPaused { task_id });
            return;
        }

        let error = done
            .error_message
            .unwrap_or_else(|| "download failed".to_string());

        let retry_count = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&task_id) {
                Some(task) if task.retry_count + 1 < self.config.retry_attempts.max(1) => {
                    task.retry_count += 1;
                    task.status = TaskStatus::Pending;
                    task.error_message = Some(error.clone());
                    task.updated_at = chrono::Utc::now();
                    Some(task.retry_count)
                }
                Some(task) => {
                    task.status = TaskStatus::Failed;
                    task.error_message = Some(error.clone());
                    task.updated_at = chrono::Utc::now();
                    None
                }
                None => return,
            }
        };

        match retry_count {
            Some(attempt) => {
                let delay = self.retry_policy.delay_for(attempt as u32);
                warn!(
                    "Task {} failed ({}), retry {} in {:.1}s",
                    task_id,
                    error,
                    attempt,
                    delay.as_secs_f64()
                );

                let manager = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !manager.is_running() {
                        // Requeue was abandoned by stop(); finalize the task
                        manager
                            .set_status(&task_id, TaskStatus::Cancelled, None)
                            .await;
                        return;
                    }
                    {
                        let mut queue = manager.queue.lock().await;
                        queue.push_back(task_id);
                    }
                    manager.fill_slots().await;
                });
            }
            None => {
                self.tracker.finish(&task_id).await;
                self.emit(DownloadEvent::TaskFailed { task_id, error });
            }
        }
    }

    /// Verify a completed file when the config asks for it and carries an
    /// expected digest for this URL. Returns the failure message on
    /// mismatch or hash error.
    async fn check_integrity(&self, done: &DownloadTask) -> Result<(), String> {
        if !self.config.verify_integrity {
            return Ok(());
        }
        let Some(expected) = self.config.expected_hashes.get(&done.source.url) else {
            return Ok(());
        };

        match integrity::verify_file(&done.full_path(), expected).await {
            Ok(result) if result.matches => {
                debug!("Integrity verified for {}", done.filename);
                Ok(())
            }
            Ok(result) => Err(format!(
                "integrity mismatch: expected {}, got {}",
                result.expected, result.actual
            )),
            Err(e) => Err(format!("integrity check failed: {}", e)),
        }
    }

    async fn handle_progress(&self, update: ProgressUpdate) {
        let snapshot = self
            .tracker
            .update(&update.task_id, update.downloaded_bytes, update.total_bytes)
            .await;

        {
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks.get_mut(&update.task_id) {
                task.stats.downloaded_bytes = update.downloaded_bytes;
                if update.total_bytes.is_some() {
                    task.stats.total_bytes = update.total_bytes;
                }
                task.stats.speed = snapshot.smoothed_speed;
                task.stats.eta = snapshot.eta_seconds.or(update.eta);
                task.stats.progress = snapshot.progress_percent / 100.0;
                task.stats.last_update = chrono::Utc::now();
                task.updated_at = task.stats.last_update;
            }
        }

        self.emit(DownloadEvent::TaskProgress {
            task_id: update.task_id.clone(),
            progress: ProgressUpdate {
                speed: snapshot.smoothed_speed,
                eta: snapshot.eta_seconds.or(update.eta),
                ..update
            },
        });
    }

    /// Derive a unique destination filename for a source: sanitized title
    /// plus detected extension, deduplicated against queued tasks and disk.
    async fn build_filename(&self, source: &VideoSource) -> String {
        let stem = sanitize_filename(&source.title);
        let extension = if source.file_type.starts_with('.') {
            source.file_type.clone()
        } else {
            ".mp4".to_string()
        };

        let taken: HashSet<String> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.output_path == self.config.output_directory)
                .map(|t| t.filename.clone())
                .collect()
        };

        let output_dir = Path::new(&self.config.output_directory);
        // With resume enabled an existing file is a partial to continue,
        // not a collision; without it, suffix instead of clobbering.
        let collides = |name: &String| {
            taken.contains(name)
                || (!self.config.resume_enabled && output_dir.join(name).exists())
        };

        let mut candidate = format!("{}{}", stem, extension);
        let mut counter = 1;
        while collides(&candidate) {
            candidate = format!("{} ({}){}", stem, counter, extension);
            counter += 1;
        }

        candidate
    }

    async fn set_status(&self, task_id: &str, status: TaskStatus, error: Option<String>) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(task_id) {
            task.status = status;
            if error.is_some() {
                task.error_message = error;
            }
            task.updated_at = chrono::Utc::now();
        }
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn emit_stats(&self) {
        let stats = self.queue_stats().await;
        self.emit(DownloadEvent::StatsUpdated { stats });
    }
}

/// Strip filesystem-hostile characters from a title and bound its length
pub fn sanitize_filename(title: &str) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let mut cleaned: String = title
        .chars()
        .map(|c| {
            if INVALID.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.len() > 200 {
        let mut cut = 200;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
    }

    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}
