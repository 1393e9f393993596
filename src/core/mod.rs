//! Core functionality modules

pub mod config;
pub mod crawler;
pub mod downloader;
pub mod error_handling;
pub mod integrity;
pub mod manager;
pub mod models;
pub mod progress_tracker;

#[cfg(test)]
mod integration_tests;

pub use config::AppConfig;
pub use crawler::VideoCrawler;
pub use downloader::HttpDownloader;
pub use manager::DownloadManager;
pub use models::{AppError, AppResult};
