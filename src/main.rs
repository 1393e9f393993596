//! bulkvid: crawl web pages for videos and download them in bulk

use std::collections::HashMap;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bulk_video_downloader::core::config::{AppConfig, DownloadConfig};
use bulk_video_downloader::core::crawler::{normalize_url, VideoCrawler};
use bulk_video_downloader::core::manager::{DownloadEvent, DownloadManager, EventReceiver};
use bulk_video_downloader::core::models::{DetectionMethod, VideoSource};

#[derive(Parser)]
#[command(
    name = "bulkvid",
    version,
    about = "Crawl web pages for video resources and download them in bulk"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect video resources on one or more pages
    Crawl {
        /// Page URLs to crawl
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Skip HEAD validation of detected candidates
        #[arg(long)]
        no_validate: bool,
    },

    /// Download video files from direct URLs
    Download {
        /// Direct video URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<String>,

        /// Maximum concurrent downloads
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Global bandwidth cap in bytes per second
        #[arg(long)]
        rate_limit: Option<u64>,
    },

    /// Crawl a page, then download a selection of what was found
    Fetch {
        /// Page URL to crawl
        page: String,

        /// Comma-separated 1-based indices or ranges, e.g. "1,3,5-7"
        #[arg(long, conflicts_with = "all")]
        select: Option<String>,

        /// Download everything that was found
        #[arg(long)]
        all: bool,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<String>,

        /// Maximum concurrent downloads
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Show or reset the configuration
    Config {
        /// Print the current configuration
        #[arg(long)]
        show: bool,

        /// Reset the configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Command::Crawl {
            urls,
            json,
            no_validate,
        } => {
            let mut crawler_config = config.crawler.clone();
            if no_validate {
                crawler_config.validate = false;
            }
            let crawler = VideoCrawler::new(crawler_config)?;
            let sources = crawler.crawl_many(&urls).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else if sources.is_empty() {
                println!("No videos found.");
            } else {
                print_sources(&sources);
            }
        }

        Command::Download {
            urls,
            output,
            concurrency,
            rate_limit,
        } => {
            let mut download_config = config.download.clone();
            if let Some(dir) = output {
                download_config.output_directory = dir;
            }
            if let Some(n) = concurrency {
                download_config.concurrent_downloads = n;
            }
            if let Some(limit) = rate_limit {
                download_config.rate_limit_bytes = Some(limit);
            }

            let helper = VideoCrawler::new(config.crawler.clone())?;
            let sources = urls
                .iter()
                .map(|u| direct_source(&helper, u))
                .collect::<anyhow::Result<Vec<_>>>()?;

            run_downloads(download_config, sources).await?;
        }

        Command::Fetch {
            page,
            select,
            all,
            output,
            concurrency,
        } => {
            let crawler = VideoCrawler::new(config.crawler.clone())?;
            let sources = crawler.crawl(&page).await?;

            if sources.is_empty() {
                println!("No videos found on {}", page);
                return Ok(());
            }

            print_sources(&sources);

            let selected = if all {
                sources
            } else if let Some(spec) = select {
                let indices = parse_selection(&spec, sources.len())?;
                indices.into_iter().map(|i| sources[i].clone()).collect()
            } else {
                println!(
                    "\nNothing downloaded. Re-run with --all or --select to pick entries."
                );
                return Ok(());
            };

            let mut download_config = config.download.clone();
            if let Some(dir) = output {
                download_config.output_directory = dir;
            }
            if let Some(n) = concurrency {
                download_config.concurrent_downloads = n;
            }

            run_downloads(download_config, selected).await?;
        }

        Command::Config { show, reset } => {
            if reset {
                let config = AppConfig::reset()?;
                println!("Configuration reset to defaults.");
                println!("{}", config.export()?);
            } else if show {
                println!("{}", config.export()?);
            } else {
                println!("Config file: {}", AppConfig::config_path()?.display());
                println!("{}", config.export()?);
            }
        }
    }

    Ok(())
}

/// Build a download source from a direct URL given on the command line
fn direct_source(helper: &VideoCrawler, url: &str) -> anyhow::Result<VideoSource> {
    let normalized = normalize_url(url);
    let parsed = url::Url::parse(&normalized)
        .with_context(|| format!("invalid URL: {}", url))?;

    Ok(VideoSource {
        title: helper.title_from_url(&parsed),
        file_type: helper.file_extension_of(&parsed),
        url: parsed.to_string(),
        size: None,
        quality: None,
        source_page: parsed.to_string(),
        detected_by: DetectionMethod::DirectLink,
    })
}

/// Queue the sources, stream events to the terminal, and wait for the
/// queue to drain. Fails when any download ends up Failed.
async fn run_downloads(
    download_config: DownloadConfig,
    sources: Vec<VideoSource>,
) -> anyhow::Result<()> {
    let total = sources.len();
    let manager = DownloadManager::new(download_config)?;
    let printer = manager.take_event_receiver().map(spawn_event_printer);

    manager.start().await?;
    manager.add_all(sources).await?;
    manager.wait_until_idle().await;

    let completed = manager.completed_tasks().await;
    let failed = manager.failed_tasks().await;
    manager.stop().await?;

    // Give the printer a moment to drain, then shut it down
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    if let Some(handle) = printer {
        handle.abort();
    }

    println!(
        "\n{} of {} downloads completed, {} failed",
        completed.len(),
        total,
        failed.len()
    );

    if !failed.is_empty() {
        for task in &failed {
            eprintln!(
                "  {} - {}",
                task.filename,
                task.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        anyhow::bail!("{} of {} downloads failed", failed.len(), total);
    }

    Ok(())
}

fn spawn_event_printer(mut events: EventReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut names: HashMap<String, String> = HashMap::new();
        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::TaskQueued { task_id, task } => {
                    println!("Queued   {}", task.filename);
                    names.insert(task_id, task.filename);
                }
                DownloadEvent::TaskStarted { task_id } => {
                    if let Some(name) = names.get(&task_id) {
                        println!("Started  {}", name);
                    }
                }
                DownloadEvent::TaskProgress { task_id, progress } => {
                    let Some(name) = names.get(&task_id) else {
                        continue;
                    };
                    let speed = format_bytes(progress.speed as u64);
                    match progress.total_bytes.filter(|t| *t > 0) {
                        Some(total) => {
                            let percent =
                                progress.downloaded_bytes as f64 / total as f64 * 100.0;
                            println!("{:>6.1}%  {} ({}/s)", percent, name, speed);
                        }
                        None => println!(
                            "{:>8}  {} ({}/s)",
                            format_bytes(progress.downloaded_bytes),
                            name,
                            speed
                        ),
                    }
                }
                DownloadEvent::TaskCompleted { task_id, file_path } => {
                    let name = names
                        .get(&task_id)
                        .map(String::as_str)
                        .unwrap_or(task_id.as_str());
                    println!("Done     {} -> {}", name, file_path);
                }
                DownloadEvent::TaskFailed { task_id, error } => {
                    let name = names
                        .get(&task_id)
                        .map(String::as_str)
                        .unwrap_or(task_id.as_str());
                    eprintln!("Failed   {}: {}", name, error);
                }
                _ => {}
            }
        }
    })
}

fn print_sources(sources: &[VideoSource]) {
    for (index, source) in sources.iter().enumerate() {
        let size = source
            .size
            .map(format_bytes)
            .unwrap_or_else(|| "?".to_string());
        let quality = source.quality.as_deref().unwrap_or("-");
        println!(
            "{:3}. {} [{}] {} {} ({})",
            index + 1,
            source.title,
            source.detected_by.as_str(),
            quality,
            size,
            source.url
        );
    }
}

/// Parse a 1-based selection like "1,3,5-7" into 0-based indices
fn parse_selection(spec: &str, available: usize) -> anyhow::Result<Vec<usize>> {
    let mut picked = Vec::new();
    let mut push = |index: usize| -> anyhow::Result<()> {
        if index == 0 || index > available {
            anyhow::bail!("selection {} is out of range (1-{})", index, available);
        }
        if !picked.contains(&(index - 1)) {
            picked.push(index - 1);
        }
        Ok(())
    };

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid selection: {}", part))?;
                let end: usize = end
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid selection: {}", part))?;
                if start > end {
                    anyhow::bail!("invalid range: {}", part);
                }
                for index in start..=end {
                    push(index)?;
                }
            }
            None => {
                let index: usize = part
                    .parse()
                    .with_context(|| format!("invalid selection: {}", part))?;
                push(index)?;
            }
        }
    }

    if picked.is_empty() {
        anyhow::bail!("empty selection");
    }
    Ok(picked)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
