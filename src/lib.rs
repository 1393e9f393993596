//! Bulk video downloader library
//!
//! Crawls web pages for video resources and downloads selected candidates
//! concurrently, with resume, retry, bandwidth limiting, and optional
//! integrity verification.

pub mod core;

pub use crate::core::config::AppConfig;
pub use crate::core::crawler::VideoCrawler;
pub use crate::core::downloader::HttpDownloader;
pub use crate::core::manager::{DownloadEvent, DownloadManager};
pub use crate::core::models::{
    AppError, AppResult, DetectionMethod, DownloadTask, QueueStats, TaskStatus, VideoSource,
};
