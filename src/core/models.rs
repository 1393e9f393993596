//! Core data models for the bulk video downloader

use serde::{Deserialize, Serialize};

use uuid::Uuid;

/// How a video candidate was detected on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    DirectLink,

    VideoTag,

    VideoSourceTag,

    SourceTag,

    ObjectTag,

    EmbedTag,

    Script,

    Stylesheet,

    Iframe,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectLink => "direct_link",
            Self::VideoTag => "video_tag",
            Self::VideoSourceTag => "video_source_tag",
            Self::SourceTag => "source_tag",
            Self::ObjectTag => "object_tag",
            Self::EmbedTag => "embed_tag",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Iframe => "iframe",
        }
    }
}

/// A video resource detected by the crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSource {
    pub url: String,

    pub title: String,

    /// File extension including the dot, or "embedded" / "unknown"
    pub file_type: String,

    pub size: Option<u64>,

    pub quality: Option<String>,

    /// Page the candidate was found on
    pub source_page: String,

    pub detected_by: DetectionMethod,
}

/// Task status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,

    Downloading,

    Paused,

    Completed,

    Failed,

    Cancelled,
}

impl TaskStatus {
    /// Terminal states never transition again. Failed is terminal once the
    /// retry budget is spent; a re-queued task goes back to Pending first.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Per-task transfer statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,

    /// Download progress (0.0 - 1.0)
    pub progress: f64,

    /// Current speed in bytes per second
    pub speed: f64,

    /// Estimated seconds remaining
    pub eta: Option<u64>,

    pub start_time: chrono::DateTime<chrono::Utc>,

    pub last_update: chrono::DateTime<chrono::Utc>,
}

impl Default for TaskStats {
    fn default() -> Self {
        let now = chrono::Utc::now();
        Self {
            downloaded_bytes: 0,
            total_bytes: None,
            progress: 0.0,
            speed: 0.0,
            eta: None,
            start_time: now,
            last_update: now,
        }
    }
}

/// A single download job: a selected video source plus its destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,

    pub source: VideoSource,

    pub output_path: String,

    pub filename: String,

    pub status: TaskStatus,

    pub stats: TaskStats,

    pub error_message: Option<String>,

    pub retry_count: usize,

    pub created_at: chrono::DateTime<chrono::Utc>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DownloadTask {
    pub fn new(source: VideoSource, output_path: String, filename: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            output_path,
            filename,
            status: TaskStatus::Pending,
            stats: TaskStats::default(),
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Full destination path for the downloaded file
    pub fn full_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.output_path).join(&self.filename)
    }
}

/// Progress update sent from the download engine to the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub task_id: String,

    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,

    pub speed: f64,

    pub eta: Option<u64>,
}

/// Aggregate statistics over the whole task queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_tasks: usize,

    pub pending_tasks: usize,

    pub active_tasks: usize,

    pub paused_tasks: usize,

    pub completed_tasks: usize,

    pub failed_tasks: usize,

    pub total_downloaded: u64,

    pub average_speed: f64,

    /// Mean of per-task progress (0.0 - 1.0)
    pub overall_progress: f64,
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Crawl error: {0}")]
    Crawl(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
