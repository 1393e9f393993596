//! Video crawler: detects video resources on web pages
//!
//! Fetches a page, parses the HTML, and runs a set of detection strategies
//! over it: direct links, video/source tags, object/embed tags, inline
//! script and stylesheet scans, and iframes of known video platforms.
//! Candidates are deduplicated by URL and optionally validated with
//! concurrent HEAD probes.

use futures_util::{stream, StreamExt};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::CrawlerConfig;
use crate::core::error_handling::{RetryExecutor, RetryPolicy};
use crate::core::models::{AppError, AppResult, DetectionMethod, VideoSource};

/// Video file extensions recognized by default, including the dot
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".3gp", ".ogv", ".ts",
    ".mts", ".m2ts", ".divx", ".xvid",
];

/// URL path segments that commonly front video resources
const VIDEO_PATH_PATTERNS: &[&str] = &[
    r#"https?://[^\s<>"']+/video/[^\s<>"']+"#,
    r#"https?://[^\s<>"']+/media/[^\s<>"']+"#,
    r#"https?://[^\s<>"']+/stream/[^\s<>"']+"#,
    r#"https?://[^\s<>"']+/embed/[^\s<>"']+"#,
    r#"https?://[^\s<>"']+/player/[^\s<>"']+"#,
];

/// Extension-based URL pattern used when scanning script bodies
const VIDEO_FILE_PATTERN: &str =
    r#"(?i)https?://[^\s<>"']+\.(?:mp4|avi|mkv|mov|wmv|flv|webm|m4v|3gp|ogv|ts)"#;

/// CSS url(...) references
const CSS_URL_PATTERN: &str = r#"url\(["']?([^"')\s]+)["']?\)"#;

/// Hosts of well-known video platforms, matched against iframe sources
const VIDEO_PLATFORMS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "facebook.com",
    "instagram.com",
    "tiktok.com",
];

/// Per-connection timeout for validation probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pre-parsed CSS selectors for the detection strategies
struct Selectors {
    anchors: Selector,
    videos: Selector,
    video_sources: Selector,
    sources: Selector,
    objects: Selector,
    embeds: Selector,
    scripts: Selector,
    styles: Selector,
    iframes: Selector,
}

impl Selectors {
    fn build() -> AppResult<Self> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| AppError::Parse(format!("selector {}: {:?}", css, e)))
        };

        Ok(Self {
            anchors: parse("a[href]")?,
            videos: parse("video")?,
            video_sources: parse("video source[src]")?,
            sources: parse("source[src]")?,
            objects: parse("object[data]")?,
            embeds: parse("embed[src]")?,
            scripts: parse("script")?,
            styles: parse("style")?,
            iframes: parse("iframe[src]")?,
        })
    }
}

/// Crawler for detecting video files on web pages
pub struct VideoCrawler {
    config: CrawlerConfig,
    client: reqwest::Client,
    selectors: Selectors,
    url_patterns: Vec<Regex>,
    css_url_pattern: Regex,
    extensions: Vec<String>,
    retry: RetryExecutor,
}

impl VideoCrawler {
    pub fn new(config: CrawlerConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()?;

        let mut patterns = vec![VIDEO_FILE_PATTERN.to_string()];
        patterns.extend(VIDEO_PATH_PATTERNS.iter().map(|p| p.to_string()));

        let url_patterns = patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| AppError::Parse(e.to_string())))
            .collect::<AppResult<Vec<_>>>()?;

        let css_url_pattern =
            Regex::new(CSS_URL_PATTERN).map_err(|e| AppError::Parse(e.to_string()))?;

        let mut extensions: Vec<String> =
            VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        extensions.extend(config.extra_extensions.iter().cloned());

        Ok(Self {
            config,
            client,
            selectors: Selectors::build()?,
            url_patterns,
            css_url_pattern,
            extensions,
            retry: RetryExecutor::new(RetryPolicy::default()),
        })
    }

    /// Crawl a single page for video resources.
    ///
    /// Scheme-less input is normalized to https. Results are unique by URL
    /// and ordered by first detection. When validation is enabled,
    /// unreachable candidates are dropped.
    pub async fn crawl(&self, url: &str) -> AppResult<Vec<VideoSource>> {
        let normalized = normalize_url(url);
        info!("Starting crawl for: {}", normalized);

        let (base, body) = self
            .retry
            .run("page fetch", |_| self.fetch_page(&normalized))
            .await
            .map_err(|e| match e {
                AppError::Network(err) => {
                    AppError::Crawl(format!("failed to fetch {}: {}", normalized, err))
                }
                other => other,
            })?;

        let candidates = self.extract_sources(&body, &base);
        debug!("Extracted {} unique candidates", candidates.len());

        let results = if self.config.validate {
            self.validate_sources(candidates).await
        } else {
            candidates
        };

        info!("Found {} videos on {}", results.len(), normalized);
        Ok(results)
    }

    /// Crawl several pages concurrently, deduplicating across pages.
    /// Per-page failures are logged and skipped.
    pub async fn crawl_many(&self, urls: &[String]) -> AppResult<Vec<VideoSource>> {
        let results: Vec<(usize, Vec<VideoSource>)> = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| async move {
                match self.crawl(url).await {
                    Ok(sources) => (index, sources),
                    Err(e) => {
                        warn!("Error crawling {}: {}", url, e);
                        (index, Vec::new())
                    }
                }
            })
            .buffer_unordered(self.config.max_parallel_probes.max(1))
            .collect()
            .await;

        let mut ordered = results;
        ordered.sort_by_key(|(index, _)| *index);

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for (_, sources) in ordered {
            for source in sources {
                if seen.insert(source.url.clone()) {
                    merged.push(source);
                }
            }
        }

        Ok(merged)
    }

    async fn fetch_page(&self, url: &str) -> AppResult<(Url, String)> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Crawl(format!(
                "HTTP {} fetching {}",
                response.status(),
                url
            )));
        }

        // Redirects may have moved us; relative URLs resolve against the
        // final location.
        let base = response.url().clone();
        let body = response.text().await?;
        Ok((base, body))
    }

    /// Run every detection strategy over a parsed page and deduplicate by
    /// URL, preserving first-seen order.
    pub fn extract_sources(&self, html: &str, base: &Url) -> Vec<VideoSource> {
        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        self.find_direct_links(&document, base, &mut candidates);
        self.find_video_tags(&document, base, &mut candidates);
        self.find_source_tags(&document, base, &mut candidates);
        self.find_embed_objects(&document, base, &mut candidates);
        self.find_script_urls(&document, base, &mut candidates);
        self.find_style_urls(&document, base, &mut candidates);
        self.find_iframe_embeds(&document, base, &mut candidates);

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|source| seen.insert(source.url.clone()))
            .collect()
    }

    /// Strategy 1: anchors whose href resolves to a video-looking URL
    fn find_direct_links(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for link in document.select(&self.selectors.anchors) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Some(resolved) = resolve(base, href) else {
                continue;
            };
            if !self.is_video_url(&resolved) {
                continue;
            }

            let text = link.text().collect::<String>();
            let text = text.trim();
            let title = if text.is_empty() {
                self.title_from_url(&resolved)
            } else {
                text.to_string()
            };

            out.push(self.make_source(resolved, title, base, DetectionMethod::DirectLink));
        }
    }

    /// Strategy 2: `<video src>` and nested `<source>` tags
    fn find_video_tags(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for video in document.select(&self.selectors.videos) {
            if let Some(src) = video.value().attr("src") {
                if let Some(resolved) = resolve(base, src) {
                    let title = video
                        .value()
                        .attr("title")
                        .or_else(|| video.value().attr("alt"))
                        .unwrap_or("Video")
                        .to_string();
                    out.push(self.make_source(resolved, title, base, DetectionMethod::VideoTag));
                }
            }
        }

        for source in document.select(&self.selectors.video_sources) {
            if let Some(src) = source.value().attr("src") {
                if let Some(resolved) = resolve(base, src) {
                    let title = source.value().attr("title").unwrap_or("Video").to_string();
                    out.push(self.make_source(
                        resolved,
                        title,
                        base,
                        DetectionMethod::VideoSourceTag,
                    ));
                }
            }
        }
    }

    /// Strategy 3: bare `<source>` tags with a video-looking src
    fn find_source_tags(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for source in document.select(&self.selectors.sources) {
            let Some(src) = source.value().attr("src") else {
                continue;
            };
            let Some(resolved) = resolve(base, src) else {
                continue;
            };
            if !self.is_video_url(&resolved) {
                continue;
            }

            let title = source
                .value()
                .attr("title")
                .unwrap_or("Video Source")
                .to_string();
            out.push(self.make_source(resolved, title, base, DetectionMethod::SourceTag));
        }
    }

    /// Strategy 4: `<object data>` and `<embed src>`
    fn find_embed_objects(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for object in document.select(&self.selectors.objects) {
            let Some(data) = object.value().attr("data") else {
                continue;
            };
            let Some(resolved) = resolve(base, data) else {
                continue;
            };
            if self.is_video_url(&resolved) {
                let title = object
                    .value()
                    .attr("title")
                    .unwrap_or("Embedded Video")
                    .to_string();
                out.push(self.make_source(resolved, title, base, DetectionMethod::ObjectTag));
            }
        }

        for embed in document.select(&self.selectors.embeds) {
            let Some(src) = embed.value().attr("src") else {
                continue;
            };
            let Some(resolved) = resolve(base, src) else {
                continue;
            };
            if self.is_video_url(&resolved) {
                let title = embed
                    .value()
                    .attr("title")
                    .unwrap_or("Embedded Video")
                    .to_string();
                out.push(self.make_source(resolved, title, base, DetectionMethod::EmbedTag));
            }
        }
    }

    /// Strategy 5: regex scan of inline script bodies
    fn find_script_urls(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for script in document.select(&self.selectors.scripts) {
            let text = script.text().collect::<String>();
            if text.is_empty() {
                continue;
            }

            for pattern in &self.url_patterns {
                for found in pattern.find_iter(&text) {
                    let Some(resolved) = resolve(base, found.as_str()) else {
                        continue;
                    };
                    if self.is_video_url(&resolved) {
                        let title = self.title_from_url(&resolved);
                        out.push(self.make_source(resolved, title, base, DetectionMethod::Script));
                    }
                }
            }
        }
    }

    /// Strategy 6: url(...) references in inline stylesheets
    fn find_style_urls(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for style in document.select(&self.selectors.styles) {
            let text = style.text().collect::<String>();
            if text.is_empty() {
                continue;
            }

            for capture in self.css_url_pattern.captures_iter(&text) {
                let Some(reference) = capture.get(1) else {
                    continue;
                };
                let Some(resolved) = resolve(base, reference.as_str()) else {
                    continue;
                };
                if self.is_video_url(&resolved) {
                    let title = self.title_from_url(&resolved);
                    out.push(self.make_source(
                        resolved,
                        title,
                        base,
                        DetectionMethod::Stylesheet,
                    ));
                }
            }
        }
    }

    /// Strategy 7: iframes pointing at known video platforms
    fn find_iframe_embeds(&self, document: &Html, base: &Url, out: &mut Vec<VideoSource>) {
        for iframe in document.select(&self.selectors.iframes) {
            let Some(src) = iframe.value().attr("src") else {
                continue;
            };
            let Some(resolved) = resolve(base, src) else {
                continue;
            };
            if !is_video_platform(&resolved) {
                continue;
            }

            let title = iframe
                .value()
                .attr("title")
                .unwrap_or("Embedded Video")
                .to_string();
            out.push(VideoSource {
                url: resolved.to_string(),
                title,
                file_type: "embedded".to_string(),
                size: None,
                quality: infer_quality(resolved.as_str()),
                source_page: base.to_string(),
                detected_by: DetectionMethod::Iframe,
            });
        }
    }

    fn make_source(
        &self,
        url: Url,
        title: String,
        base: &Url,
        detected_by: DetectionMethod,
    ) -> VideoSource {
        VideoSource {
            quality: infer_quality(url.as_str()),
            file_type: self.file_extension_of(&url),
            url: url.to_string(),
            title,
            size: None,
            source_page: base.to_string(),
            detected_by,
        }
    }

    /// Check whether a URL points at a video: by file extension or by a
    /// recognized URL pattern.
    pub fn is_video_url(&self, url: &Url) -> bool {
        let path = url.path().to_lowercase();
        if self.extensions.iter().any(|ext| path.ends_with(ext)) {
            return true;
        }

        let url_str = url.as_str();
        self.url_patterns.iter().any(|p| p.is_match(url_str))
    }

    /// Extract the recognized file extension of a URL, or "unknown"
    pub fn file_extension_of(&self, url: &Url) -> String {
        let path = url.path().to_lowercase();
        self.extensions
            .iter()
            .find(|ext| path.ends_with(ext.as_str()))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Derive a human-readable title from the URL stem
    pub fn title_from_url(&self, url: &Url) -> String {
        let mut path = url.path().to_string();

        let lowered = path.to_lowercase();
        for ext in &self.extensions {
            if lowered.ends_with(ext.as_str()) {
                path.truncate(path.len() - ext.len());
                break;
            }
        }

        let stem = path.rsplit('/').next().unwrap_or("");
        let title: String = stem
            .replace("%20", " ")
            .replace(['-', '_'], " ")
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();

        let title = title.trim().to_string();
        if title.is_empty() {
            "Untitled Video".to_string()
        } else {
            title
        }
    }

    /// Validate candidates with concurrent HEAD probes, preserving order.
    ///
    /// A candidate survives when the probe succeeds and either the
    /// content-type looks like a video stream or the extension already
    /// classified it. Probe failures drop the candidate, never the crawl.
    async fn validate_sources(&self, candidates: Vec<VideoSource>) -> Vec<VideoSource> {
        let mut probed: Vec<(usize, Option<VideoSource>)> =
            stream::iter(candidates.into_iter().enumerate())
                .map(|(index, source)| async move { (index, self.probe(source).await) })
                .buffer_unordered(self.config.max_parallel_probes.max(1))
                .collect()
                .await;

        probed.sort_by_key(|(index, _)| *index);
        probed
            .into_iter()
            .filter_map(|(_, source)| source)
            .collect()
    }

    async fn probe(&self, mut source: VideoSource) -> Option<VideoSource> {
        let response = self
            .client
            .head(&source.url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!("Dropping {} (HTTP {})", source.url, response.status());
            return None;
        }

        if source.size.is_none() {
            source.size = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        if content_type.contains("video") || content_type.contains("stream") {
            return Some(source);
        }

        if source.file_type != "unknown" {
            return Some(source);
        }

        debug!("Dropping {} (content-type {})", source.url, content_type);
        None
    }
}

/// Prefix scheme-less URLs with https
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn resolve(base: &Url, reference: &str) -> Option<Url> {
    let resolved = base.join(reference).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

fn is_video_platform(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    VIDEO_PLATFORMS.iter().any(|p| host.contains(p))
}

/// Pick a resolution marker like "720p" out of a URL, if present
fn infer_quality(url: &str) -> Option<String> {
    let lowered = url.to_lowercase();
    for marker in ["2160p", "1440p", "1080p", "720p", "480p", "360p", "240p"] {
        if lowered.contains(marker) {
            return Some(marker.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::DetectionMethod;

    fn crawler() -> VideoCrawler {
        VideoCrawler::new(CrawlerConfig::default()).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://example.com/gallery/").unwrap()
    }

    #[test]
    fn test_direct_link_detection() {
        let html = r#"<html><body>
            <a href="/files/holiday-clip.mp4">Holiday clip</a>
            <a href="https://cdn.example.com/other.webm"></a>
            <a href="/about.html">About us</a>
        </body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].url, "https://example.com/files/holiday-clip.mp4");
        assert_eq!(sources[0].title, "Holiday clip");
        assert_eq!(sources[0].file_type, ".mp4");
        assert_eq!(sources[0].detected_by, DetectionMethod::DirectLink);
        // Empty anchor text falls back to the URL stem
        assert_eq!(sources[1].title, "other");
    }

    #[test]
    fn test_video_and_source_tag_detection() {
        let html = r#"<html><body>
            <video src="/media/intro.mp4" title="Intro"></video>
            <video><source src="clips/part1.webm"></video>
            <audio><source src="/clips/part2.mkv"></audio>
        </body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].detected_by, DetectionMethod::VideoTag);
        assert_eq!(sources[0].title, "Intro");
        assert_eq!(sources[1].detected_by, DetectionMethod::VideoSourceTag);
        assert_eq!(sources[1].url, "https://example.com/gallery/clips/part1.webm");
        assert_eq!(sources[2].detected_by, DetectionMethod::SourceTag);
    }

    #[test]
    fn test_object_and_embed_detection() {
        let html = r#"<html><body>
            <object data="/videos/talk.mov" title="Conference talk"></object>
            <embed src="/videos/demo.flv">
            <object data="/docs/paper.pdf"></object>
        </body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].detected_by, DetectionMethod::ObjectTag);
        assert_eq!(sources[0].title, "Conference talk");
        assert_eq!(sources[1].detected_by, DetectionMethod::EmbedTag);
    }

    #[test]
    fn test_script_scan_detection() {
        let html = r#"<html><head><script>
            var player = { file: "https://cdn.example.com/stream/abc123/index",
                           fallback: "https://cdn.example.com/files/movie-1080p.mp4" };
        </script></head><body></body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        let urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        assert!(urls.contains(&"https://cdn.example.com/files/movie-1080p.mp4"));
        assert!(urls.contains(&"https://cdn.example.com/stream/abc123/index"));
        assert!(sources
            .iter()
            .all(|s| s.detected_by == DetectionMethod::Script));

        let movie = sources
            .iter()
            .find(|s| s.url.ends_with(".mp4"))
            .unwrap();
        assert_eq!(movie.quality.as_deref(), Some("1080p"));
    }

    #[test]
    fn test_style_scan_detection() {
        let html = r#"<html><head><style>
            .hero { background: url("https://cdn.example.com/loops/bg-loop.mp4"); }
            .logo { background: url(/img/logo.png); }
        </style></head><body></body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].detected_by, DetectionMethod::Stylesheet);
        assert_eq!(sources[0].url, "https://cdn.example.com/loops/bg-loop.mp4");
    }

    #[test]
    fn test_iframe_platform_detection() {
        let html = r#"<html><body>
            <iframe src="https://www.youtube.com/embed/xyz" title="Talk recording"></iframe>
            <iframe src="https://player.vimeo.com/video/123"></iframe>
            <iframe src="https://maps.example.com/widget"></iframe>
        </body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert_eq!(sources.len(), 2);
        assert!(sources
            .iter()
            .all(|s| s.detected_by == DetectionMethod::Iframe && s.file_type == "embedded"));
        assert_eq!(sources[0].title, "Talk recording");
    }

    #[test]
    fn test_deduplication_preserves_first_seen() {
        let html = r#"<html><body>
            <a href="/files/clip.mp4">First mention</a>
            <video src="/files/clip.mp4"></video>
            <a href="/files/clip.mp4">Third mention</a>
        </body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, "First mention");
        assert_eq!(sources[0].detected_by, DetectionMethod::DirectLink);
    }

    #[test]
    fn test_is_video_url() {
        let c = crawler();
        let video = Url::parse("https://example.com/a/b/movie.MP4").unwrap();
        let path_based = Url::parse("https://example.com/video/watch-now").unwrap();
        let page = Url::parse("https://example.com/about.html").unwrap();

        assert!(c.is_video_url(&video));
        assert!(c.is_video_url(&path_based));
        assert!(!c.is_video_url(&page));
    }

    #[test]
    fn test_extra_extensions_are_honored() {
        let config = CrawlerConfig {
            extra_extensions: vec![".rm".to_string()],
            ..Default::default()
        };
        let c = VideoCrawler::new(config).unwrap();
        let url = Url::parse("https://example.com/old/clip.rm").unwrap();

        assert!(c.is_video_url(&url));
        assert_eq!(c.file_extension_of(&url), ".rm");
    }

    #[test]
    fn test_title_from_url() {
        let c = crawler();
        let url = Url::parse("https://example.com/files/my-summer_trip%202024.mp4").unwrap();
        assert_eq!(c.title_from_url(&url), "my summer trip 2024");

        let bare = Url::parse("https://example.com/").unwrap();
        assert_eq!(c.title_from_url(&bare), "Untitled Video");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_non_http_schemes_are_skipped() {
        let html = r#"<html><body>
            <a href="ftp://example.com/clip.mp4">FTP clip</a>
            <a href="javascript:play('x.mp4')">Play</a>
        </body></html>"#;

        let sources = crawler().extract_sources(html, &base());
        assert!(sources.is_empty());
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let sources = crawler().extract_sources("", &base());
        assert!(sources.is_empty());
    }
}
