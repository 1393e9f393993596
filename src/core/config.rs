//! Application configuration management

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub download: DownloadConfig,
    pub crawler: CrawlerConfig,
    pub advanced: AdvancedConfig,
}

/// Download-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    pub concurrent_downloads: usize,

    /// Total download attempts per task, including the first try
    pub retry_attempts: usize,

    pub timeout_seconds: u64,

    pub user_agent: String,

    pub output_directory: String,

    /// Whether to resume partial files via HTTP Range requests
    pub resume_enabled: bool,

    /// Whether to verify file integrity after download
    pub verify_integrity: bool,

    /// Expected SHA-256 digests for files (URL -> hex digest)
    pub expected_hashes: HashMap<String, String>,

    /// Global bandwidth cap in bytes per second (None = unlimited)
    pub rate_limit_bytes: Option<u64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: 3,
            retry_attempts: 3,
            timeout_seconds: 30,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            output_directory: default_output_directory(),
            resume_enabled: true,
            verify_integrity: false,
            expected_hashes: HashMap::new(),
            rate_limit_bytes: None,
        }
    }
}

/// Crawler-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Concurrency bound for validation probes and multi-page crawls
    pub max_parallel_probes: usize,

    pub timeout_seconds: u64,

    /// Whether detected candidates are validated with HEAD requests
    pub validate: bool,

    pub user_agent: String,

    /// Extra video file extensions to detect, including the dot
    pub extra_extensions: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_parallel_probes: 5,
            timeout_seconds: 30,
            validate: true,
            user_agent: DownloadConfig::default().user_agent,
            extra_extensions: Vec::new(),
        }
    }
}

/// Advanced configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    pub log_level: String, // "error", "warn", "info", "debug", "trace"

    pub proxy: Option<String>,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            proxy: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            crawler: CrawlerConfig::default(),
            advanced: AdvancedConfig::default(),
        }
    }
}

/// Default download destination: ~/Downloads/BulkVideos when a home
/// directory is resolvable, otherwise a relative "downloads" directory.
pub fn default_output_directory() -> String {
    if let Some(user_dirs) = UserDirs::new() {
        if let Some(download_dir) = user_dirs.download_dir() {
            return download_dir.join("BulkVideos").to_string_lossy().to_string();
        }
        return user_dirs
            .home_dir()
            .join("Downloads")
            .join("BulkVideos")
            .to_string_lossy()
            .to_string();
    }
    "downloads".to_string()
}

impl AppConfig {
    /// Load configuration from file, creating default if not exists.
    /// An unreadable or invalid file falls back to defaults with a warning.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            match serde_json::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        tracing::info!("Loaded configuration from: {:?}", config_path);
                        Ok(config)
                    }
                    Err(err) => {
                        tracing::warn!(
                            "Invalid configuration detected ({}), falling back to defaults",
                            err
                        );
                        Ok(Self::default())
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        "Failed to parse config file ({}), falling back to defaults",
                        err
                    );
                    Ok(Self::default())
                }
            }
        } else {
            let config = Self::default();
            config.save()?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved configuration to: {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "shafayatnabi", "bulkvideodownloader")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Reset configuration to defaults
    pub fn reset() -> Result<Self> {
        let config = Self::default();
        config.save()?;
        tracing::info!("Reset configuration to defaults");
        Ok(config)
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Merge with another configuration, keeping non-default values from other
    pub fn merge(&mut self, other: &AppConfig) {
        let defaults = AppConfig::default();

        if other.download.concurrent_downloads != 0 {
            self.download.concurrent_downloads = other.download.concurrent_downloads;
        }
        if other.download.retry_attempts != defaults.download.retry_attempts {
            self.download.retry_attempts = other.download.retry_attempts;
        }
        if other.download.timeout_seconds != 0 {
            self.download.timeout_seconds = other.download.timeout_seconds;
        }
        if !other.download.user_agent.is_empty() {
            self.download.user_agent = other.download.user_agent.clone();
        }
        if !other.download.output_directory.is_empty() {
            self.download.output_directory = other.download.output_directory.clone();
        }
        if other.download.resume_enabled != defaults.download.resume_enabled {
            self.download.resume_enabled = other.download.resume_enabled;
        }
        if other.download.verify_integrity != defaults.download.verify_integrity {
            self.download.verify_integrity = other.download.verify_integrity;
        }
        if !other.download.expected_hashes.is_empty() {
            self.download.expected_hashes = other.download.expected_hashes.clone();
        }
        if other.download.rate_limit_bytes.is_some() {
            self.download.rate_limit_bytes = other.download.rate_limit_bytes;
        }

        if other.crawler.max_parallel_probes != 0 {
            self.crawler.max_parallel_probes = other.crawler.max_parallel_probes;
        }
        if other.crawler.timeout_seconds != 0 {
            self.crawler.timeout_seconds = other.crawler.timeout_seconds;
        }
        if other.crawler.validate != defaults.crawler.validate {
            self.crawler.validate = other.crawler.validate;
        }
        if !other.crawler.extra_extensions.is_empty() {
            self.crawler.extra_extensions = other.crawler.extra_extensions.clone();
        }

        if !other.advanced.log_level.is_empty() {
            self.advanced.log_level = other.advanced.log_level.clone();
        }
        if other.advanced.proxy.is_some() {
            self.advanced.proxy = other.advanced.proxy.clone();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.download.concurrent_downloads == 0 {
            anyhow::bail!("Concurrent downloads must be greater than 0");
        }

        if self.download.concurrent_downloads > 20 {
            anyhow::bail!("Concurrent downloads should not exceed 20");
        }

        if self.download.retry_attempts > 10 {
            anyhow::bail!("Retry attempts should not exceed 10");
        }

        if self.download.timeout_seconds == 0 || self.download.timeout_seconds > 300 {
            anyhow::bail!("Download timeout should be between 1 and 300 seconds");
        }

        if let Some(limit) = self.download.rate_limit_bytes {
            if limit == 0 {
                anyhow::bail!("Rate limit must be greater than 0 when set");
            }
        }

        if self.crawler.max_parallel_probes == 0 || self.crawler.max_parallel_probes > 50 {
            anyhow::bail!("Parallel probes should be between 1 and 50");
        }

        if self.crawler.timeout_seconds == 0 || self.crawler.timeout_seconds > 300 {
            anyhow::bail!("Crawler timeout should be between 1 and 300 seconds");
        }

        for ext in &self.crawler.extra_extensions {
            if !ext.starts_with('.') {
                anyhow::bail!("Extra extension must start with a dot: {}", ext);
            }
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.advanced.log_level.as_str())
        {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        if let Some(ref proxy) = self.advanced.proxy {
            url::Url::parse(proxy)
                .map_err(|e| anyhow::anyhow!("Invalid proxy URL {}: {}", proxy, e))?;
        }

        Ok(())
    }
}
