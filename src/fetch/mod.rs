// src/fetch/mod.rs
//! Content Fetcher.
//!
//! Two tiers behind one trait:
//! - primary: headless Chromium (rendered DOM)
//! - fallback: plain HTTP GET, only after timeout/navigation/driver failures
//!
//! Media URLs are skipped before any network access.

pub mod browser;
pub mod http;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::normalize::url_hash;
use crate::sanitize::{self, ContentRules, SanitizeOutcome};

pub use browser::ChromiumRenderer;
pub use http::HttpRenderer;

/// Browser-like User-Agent shared by the HTTP tiers.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "mp4", "avi", "mov", "mkv", "webm",
];

const MEDIA_HOSTS: &[&str] = &[
    "i.redd.it",
    "v.redd.it",
    "preview.redd.it",
    "i.imgur.com",
    "imgur.com",
    "gfycat.com",
    "redgifs.com",
    "streamable.com",
    "youtube.com",
    "youtu.be",
    "vimeo.com",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser driver error: {0}")]
    Driver(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Renderer-level failures that the plain HTTP tier may recover from.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_) | FetchError::Navigation(_) | FetchError::Driver(_)
        )
    }
}

/// "Fetch rendered HTML for a URL, or fail."
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, FetchError>;
    fn name(&self) -> &'static str;
}

/// Capped exponential backoff: `base_delay * 2^(n-1)` after failed attempt `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(what, attempt, ?delay, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(what, attempt, error = %e, "giving up");
                    return Err(e);
                }
            }
        }
    }
}

/// Media by file extension or by hosting domain (subdomains included).
pub fn is_media_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        let lower = raw.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        return has_media_extension(path);
    };

    if let Some(host) = url.host_str() {
        let host = host.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let on_media_host = MEDIA_HOSTS
            .iter()
            .any(|m| host == *m || host.ends_with(&format!(".{m}")));
        if on_media_host {
            return true;
        }
    }
    has_media_extension(&url.path().to_ascii_lowercase())
}

fn has_media_extension(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => MEDIA_EXTENSIONS.contains(&ext),
        None => false,
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Archived(PathBuf),
    MediaSkipped,
    /// Post-fetch blacklist hit; carries every matching term.
    Rejected(Vec<String>),
    Failed(String),
}

pub struct Fetcher {
    primary: Box<dyn PageRenderer>,
    fallback: Option<Box<dyn PageRenderer>>,
}

impl Fetcher {
    pub fn new(primary: Box<dyn PageRenderer>, fallback: Option<Box<dyn PageRenderer>>) -> Self {
        Self { primary, fallback }
    }

    /// Chromium first (`CHROME_PATH` if set), plain HTTP as fallback.
    pub fn from_env() -> Result<Self> {
        let chrome = ChromiumRenderer::from_env();
        let http = HttpRenderer::new().context("building http renderer")?;
        Ok(Self::new(Box::new(chrome), Some(Box::new(http))))
    }

    pub fn http_only() -> Result<Self> {
        let http = HttpRenderer::new().context("building http renderer")?;
        Ok(Self::new(Box::new(http), None))
    }

    /// Raw HTML through the primary renderer, falling back when allowed.
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        match self.primary.render(url).await {
            Ok(html) => Ok(html),
            Err(e) if e.allows_fallback() => match &self.fallback {
                Some(fb) => {
                    tracing::warn!(
                        url,
                        primary = self.primary.name(),
                        fallback = fb.name(),
                        error = %e,
                        "primary renderer failed, falling back"
                    );
                    fb.render(url).await
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Fetch `url`, persist it as `<output_dir>/<hash>.html`, sanitize it.
    ///
    /// Item-level problems come back as `Failed`. Only a failed write of the
    /// raw HTML is returned as an error.
    pub async fn fetch(
        &self,
        url: &str,
        output_dir: &Path,
        rules: &ContentRules,
    ) -> Result<FetchOutcome> {
        if is_media_url(url) {
            tracing::debug!(url, "media url skipped");
            counter!("pasture_media_skipped_total").increment(1);
            return Ok(FetchOutcome::MediaSkipped);
        }

        let t0 = Instant::now();
        let fetched = self.fetch_html(url).await;
        histogram!("pasture_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let html = match fetched {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(url, error = %e, "fetch failed");
                return Ok(FetchOutcome::Failed(e.to_string()));
            }
        };

        let raw_path = output_dir.join(format!("{}.html", url_hash(url)));
        tokio::fs::write(&raw_path, html)
            .await
            .with_context(|| format!("writing raw html {}", raw_path.display()))?;

        Ok(match sanitize::sanitize(&raw_path, rules) {
            SanitizeOutcome::Converted(p) => FetchOutcome::Archived(p),
            SanitizeOutcome::Rejected(terms) => FetchOutcome::Rejected(terms),
            SanitizeOutcome::Failed(e) => FetchOutcome::Failed(format!("{e:#}")),
        })
    }
}
