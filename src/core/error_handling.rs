//! Error classification and retry mechanism
//!
//! Classifies download and crawl failures into retryable and fatal kinds and
//! drives retries with exponential backoff plus jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::core::models::{AppError, AppResult};

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Maximum delay cap for exponential backoff
pub const MAX_DELAY_CAP: Duration = Duration::from_secs(60);

/// Coarse failure categories used to decide whether a retry makes sense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connection-level failures (DNS, refused, reset)
    Network,
    /// Request or body read timed out
    Timeout,
    /// Server-side HTTP errors (5xx) and rate limiting (429)
    Server,
    /// Client-side HTTP errors (remaining 4xx)
    Client,
    /// Local filesystem errors
    Io,
    /// Everything else (parse, config, ...)
    Other,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Server)
    }
}

/// Classify an application error for retry purposes
pub fn classify(error: &AppError) -> ErrorKind {
    match error {
        AppError::Network(err) => {
            if err.is_timeout() {
                ErrorKind::Timeout
            } else if let Some(status) = err.status() {
                if status.is_server_error() || status.as_u16() == 429 {
                    ErrorKind::Server
                } else {
                    ErrorKind::Client
                }
            } else {
                ErrorKind::Network
            }
        }
        AppError::Io(_) => ErrorKind::Io,
        // Download errors carry an HTTP status in their message when the
        // engine saw a non-success response; treat 5xx/429 as server-side.
        AppError::Download(msg) | AppError::Crawl(msg) => {
            if msg.contains("HTTP 5") || msg.contains("HTTP 429") {
                ErrorKind::Server
            } else if msg.contains("HTTP 4") {
                ErrorKind::Client
            } else if msg.contains("cancelled") || msg.contains("paused") {
                ErrorKind::Other
            } else {
                ErrorKind::Network
            }
        }
        AppError::Parse(_) | AppError::Config(_) => ErrorKind::Other,
    }
}

/// Retry strategy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff multiplier per attempt
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0) applied symmetrically to the delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: MAX_DELAY_CAP,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before retry number `attempt` (1-based: the delay
    /// after the first failure is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter_factor > 0.0 {
            let spread = capped * self.jitter_factor;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

/// Drives an async operation through a retry policy
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts the attempt budget. The closure receives the 1-based
    /// attempt number.
    pub async fn run<T, F, Fut>(&self, description: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", description, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let kind = classify(&err);
                    if !kind.is_retryable() || attempt >= self.policy.max_attempts {
                        return Err(err);
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "{} failed on attempt {} ({:?}: {}), retrying in {:.1}s",
                        description,
                        attempt,
                        kind,
                        err,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
