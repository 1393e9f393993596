//! HTTP download engine
//!
//! Streams video resources to disk with bounded concurrency, cancellation,
//! a global pause switch, Range-based resume for partial files, and an
//! optional bandwidth cap.

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::models::{AppError, AppResult, DownloadTask, ProgressUpdate, TaskStatus};

/// Minimum interval between progress updates for a task
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Sliding one-second-window bandwidth limiter shared by all transfers
#[derive(Clone)]
pub struct BandwidthController {
    limit: Arc<RwLock<Option<u64>>>,
    state: Arc<Mutex<BandwidthState>>,
}

#[derive(Debug)]
struct BandwidthState {
    window_start: Instant,
    bytes_in_window: u64,
}

impl BandwidthState {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            bytes_in_window: 0,
        }
    }
}

impl BandwidthController {
    pub fn new() -> Self {
        Self {
            limit: Arc::new(RwLock::new(None)),
            state: Arc::new(Mutex::new(BandwidthState::new())),
        }
    }

    pub async fn set_limit(&self, bytes_per_second: Option<u64>) {
        *self.limit.write().await = bytes_per_second;
    }

    /// Account `bytes` against the current window and sleep off any excess
    pub async fn throttle(&self, bytes: u64) {
        let limit_value = *self.limit.read().await;
        if let Some(limit) = limit_value {
            if limit == 0 {
                return;
            }
            let mut state = self.state.lock().await;
            let elapsed = state.window_start.elapsed();
            if elapsed >= Duration::from_secs(1) {
                state.window_start = Instant::now();
                state.bytes_in_window = 0;
            }
            state.bytes_in_window += bytes;
            if state.bytes_in_window > limit {
                let excess = state.bytes_in_window - limit;
                let sleep_secs = excess as f64 / limit as f64;
                drop(state);
                sleep(Duration::from_secs_f64(sleep_secs)).await;
            }
        }
    }
}

impl Default for BandwidthController {
    fn default() -> Self {
        Self::new()
    }
}

/// Download engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Maximum concurrent downloads
    pub max_concurrent: usize,
    /// Request timeout in seconds (per read, not whole transfer)
    pub timeout: u64,
    /// User agent sent with every request
    pub user_agent: String,
    /// Whether partial files are resumed via Range requests
    pub resume_enabled: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            timeout: 30,
            user_agent: "BulkVideoDownloader/0.1".to_string(),
            resume_enabled: true,
        }
    }
}

/// HTTP download engine
#[derive(Clone)]
pub struct HttpDownloader {
    config: DownloaderConfig,
    client: Client,
    active_downloads: Arc<RwLock<HashMap<String, Arc<AtomicBool>>>>,
    semaphore: Arc<Semaphore>,
    progress_tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    is_paused: Arc<AtomicBool>,
    bandwidth: BandwidthController,
}

impl HttpDownloader {
    pub fn new(config: DownloaderConfig) -> AppResult<Self> {
        // Connect timeout only: a whole-request timeout would kill long
        // transfers of large files.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout))
            .user_agent(&config.user_agent)
            .build()?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        Ok(Self {
            config,
            client,
            active_downloads: Arc::new(RwLock::new(HashMap::new())),
            semaphore,
            progress_tx: None,
            is_paused: Arc::new(AtomicBool::new(false)),
            bandwidth: BandwidthController::new(),
        })
    }

    pub fn bandwidth_controller(&self) -> BandwidthController {
        self.bandwidth.clone()
    }

    /// Set the channel progress updates are sent on
    pub fn set_progress_channel(&mut self, tx: mpsc::UnboundedSender<ProgressUpdate>) {
        self.progress_tx = Some(tx);
    }

    /// Download a single task to its destination.
    ///
    /// Always returns `Ok` with the task in a final per-attempt state;
    /// transport failures mark the task Failed with an error message.
    /// Retry policy belongs to the caller.
    pub async fn download(&self, mut task: DownloadTask) -> AppResult<DownloadTask> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| AppError::Download(e.to_string()))?;

        let full_path = task.full_path();
        if full_path.exists() && !self.config.resume_enabled {
            info!("File already exists, skipping: {}", task.filename);
            task.status = TaskStatus::Completed;
            task.stats.progress = 1.0;
            task.updated_at = chrono::Utc::now();
            return Ok(task);
        }

        let cancel_flag = Arc::new(AtomicBool::new(false));
        {
            let mut downloads = self.active_downloads.write().await;
            downloads.insert(task.id.clone(), Arc::clone(&cancel_flag));
        }

        task.status = TaskStatus::Downloading;
        task.stats.start_time = chrono::Utc::now();
        task.updated_at = chrono::Utc::now();

        let result = self.download_with_resume(&mut task, cancel_flag).await;

        {
            let mut downloads = self.active_downloads.write().await;
            downloads.remove(&task.id);
        }

        match result {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.stats.progress = 1.0;
                task.updated_at = chrono::Utc::now();
                info!("Download completed: {}", task.filename);
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.error_message = Some(e.to_string());
                task.updated_at = chrono::Utc::now();
                warn!("Download failed: {} - {}", task.filename, e);
            }
        }

        Ok(task)
    }

    /// Streaming download with Range-based resume for partial files
    async fn download_with_resume(
        &self,
        task: &mut DownloadTask,
        cancel_flag: Arc<AtomicBool>,
    ) -> AppResult<()> {
        let full_path = task.full_path();

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existing_size = if full_path.exists() {
            tokio::fs::metadata(&full_path).await?.len()
        } else {
            0
        };

        let mut request = self.client.get(&task.source.url);
        if existing_size > 0 && self.config.resume_enabled {
            request = request.header("Range", format!("bytes={}-", existing_size));
            info!(
                "Resuming {} from byte {}",
                task.filename, existing_size
            );
        }

        let response = request.send().await?;

        let status = response.status();

        // A bytes=<len>- request for a file that is already whole earns a
        // 416 from conforming servers; the partial is actually complete.
        if existing_size > 0 && status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            task.stats.total_bytes = Some(existing_size);
            task.stats.downloaded_bytes = existing_size;
            info!(
                "Already complete: {} ({} bytes)",
                task.filename, existing_size
            );
            return Ok(());
        }

        if !status.is_success() && status.as_u16() != 206 {
            return Err(AppError::Download(format!(
                "HTTP {} fetching {}",
                status, task.source.url
            )));
        }

        // A 200 to a Range request means the server ignored the range and
        // is sending the whole body; start the file over.
        let resuming = existing_size > 0 && status.as_u16() == 206;

        let content_length = response.content_length();
        let total_size = match (resuming, content_length) {
            (true, Some(len)) => Some(existing_size + len),
            (false, Some(len)) => Some(len),
            (_, None) => task.stats.total_bytes,
        };

        task.stats.total_bytes = total_size;
        task.stats.downloaded_bytes = if resuming { existing_size } else { 0 };

        let mut file = if resuming {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&full_path)
                .await?
        } else {
            File::create(&full_path).await?
        };

        let mut stream = response.bytes_stream();
        let mut downloaded = task.stats.downloaded_bytes;
        let mut last_update = Instant::now();
        let start_time = Instant::now();

        while let Some(chunk) = stream.next().await {
            if cancel_flag.load(Ordering::Relaxed) {
                return Err(AppError::Download("download cancelled".to_string()));
            }
            if self.is_paused.load(Ordering::Relaxed) {
                return Err(AppError::Download("download paused".to_string()));
            }

            let chunk = chunk?;
            file.write_all(&chunk).await?;
            self.bandwidth.throttle(chunk.len() as u64).await;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_update) >= PROGRESS_INTERVAL {
                self.update_progress(task, downloaded, start_time);
                last_update = now;
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        self.update_progress(task, downloaded, start_time);

        debug!(
            "File download finished: {} ({} bytes)",
            task.filename, downloaded
        );
        Ok(())
    }

    /// Recompute task stats and publish a progress update
    fn update_progress(&self, task: &mut DownloadTask, downloaded: u64, start_time: Instant) {
        let elapsed = start_time.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            downloaded as f64 / elapsed
        } else {
            0.0
        };

        let progress = match task.stats.total_bytes {
            Some(total) if total > 0 => (downloaded as f64 / total as f64).min(1.0),
            _ => 0.0,
        };

        let eta = match task.stats.total_bytes {
            Some(total) if speed > 0.0 && total > downloaded => {
                Some(((total - downloaded) as f64 / speed) as u64)
            }
            _ => None,
        };

        task.stats.downloaded_bytes = downloaded;
        task.stats.speed = speed;
        task.stats.progress = progress;
        task.stats.eta = eta;
        task.stats.last_update = chrono::Utc::now();

        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(ProgressUpdate {
                task_id: task.id.clone(),
                downloaded_bytes: downloaded,
                total_bytes: task.stats.total_bytes,
                speed,
                eta,
            });
        }
    }

    /// Pause all downloads; in-flight transfers stop at the next chunk
    pub fn pause_all(&self) {
        self.is_paused.store(true, Ordering::Relaxed);
        info!("All downloads paused");
    }

    /// Clear the pause flag
    pub fn resume_all(&self) {
        self.is_paused.store(false, Ordering::Relaxed);
        info!("All downloads resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::Relaxed)
    }

    /// Cancel one in-flight download
    pub async fn cancel(&self, task_id: &str) {
        let downloads = self.active_downloads.read().await;
        if let Some(cancel_flag) = downloads.get(task_id) {
            cancel_flag.store(true, Ordering::Relaxed);
            info!("Download cancelled: {}", task_id);
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active_downloads.read().await.len()
    }

    /// Download a batch of tasks, bounded by the engine's semaphore
    pub async fn batch_download(&self, tasks: Vec<DownloadTask>) -> Vec<DownloadTask> {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let downloader = self.clone();
            handles.push(tokio::spawn(
                async move { downloader.download(task).await },
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(task)) => results.push(task),
                Ok(Err(e)) => warn!("Batch download task failed: {}", e),
                Err(e) => warn!("Batch download task panicked: {}", e),
            }
        }

        results
    }
}
