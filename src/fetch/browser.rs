// src/fetch/browser.rs
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{FetchError, PageRenderer, RetryPolicy, BROWSER_USER_AGENT};

const ENV_CHROME_PATH: &str = "CHROME_PATH";

#[derive(Debug, Clone, Copy)]
pub struct RenderTimeouts {
    pub page_load: Duration,
    pub navigation: Duration,
    /// Extra wait for client-rendered content.
    pub settle: Duration,
    /// Per step of browser shutdown (close, then process exit).
    pub shutdown: Duration,
}

impl Default for RenderTimeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(60),
            navigation: Duration::from_secs(15),
            settle: Duration::from_secs(8),
            shutdown: Duration::from_secs(10),
        }
    }
}

/// Headless Chromium, one fresh browser per render.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
    retry: RetryPolicy,
    timeouts: RenderTimeouts,
}

impl ChromiumRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `$CHROME_PATH` as the browser executable when set.
    pub fn from_env() -> Self {
        let executable = std::env::var(ENV_CHROME_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self {
            executable,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: RenderTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={BROWSER_USER_AGENT}"))
            .request_timeout(self.timeouts.page_load);
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        builder
            .build()
            .map_err(|e| FetchError::Driver(format!("browser config: {e}")))
    }

    async fn launch(&self) -> Result<BrowserSession, FetchError> {
        let cfg = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(cfg)
            .await
            .map_err(|e| FetchError::Driver(format!("browser launch: {e}")))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        Ok(BrowserSession { browser, handler })
    }

    async fn render_in(&self, session: &BrowserSession, url: &str) -> Result<String, FetchError> {
        let t = self.timeouts;
        let page = tokio::time::timeout(t.page_load, session.browser.new_page(url))
            .await
            .map_err(|_| FetchError::Timeout(t.page_load))?
            .map_err(|e| FetchError::Navigation(e.to_string()))?;

        // Best-effort: some pages never report navigation complete.
        let _ = tokio::time::timeout(t.navigation, page.wait_for_navigation()).await;
        tokio::time::sleep(t.settle).await;

        let html = tokio::time::timeout(t.page_load, page.content())
            .await
            .map_err(|_| FetchError::Timeout(t.page_load))?
            .map_err(|e| FetchError::Navigation(e.to_string()));

        if let Err(e) = page.close().await {
            tracing::debug!(url, error = %e, "page close error");
        }
        html
    }
}

/// Browser plus its CDP event loop task. Must be closed explicitly.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn close(mut self, limit: Duration) {
        shut_down(&mut self.browser, limit).await;
        self.handler.abort();
    }
}

/// The process-level calls needed to shut a browser down.
#[async_trait]
trait BrowserProcess: Send {
    async fn close(&mut self) -> Result<(), String>;
    async fn wait(&mut self) -> Result<(), String>;
    async fn kill(&mut self) -> Result<(), String>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn close(&mut self) -> Result<(), String> {
        Browser::close(self).await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn wait(&mut self) -> Result<(), String> {
        Browser::wait(self).await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn kill(&mut self) -> Result<(), String> {
        match Browser::kill(self).await {
            Some(Err(e)) => Err(e.to_string()),
            _ => Ok(()),
        }
    }
}

/// Graceful close, then wait for the process; each step is bounded by
/// `limit`. A failed or stuck close or wait ends in a kill.
async fn shut_down<B: BrowserProcess>(browser: &mut B, limit: Duration) {
    let closed = match tokio::time::timeout(limit, browser.close()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "browser close failed");
            false
        }
        Err(_) => {
            tracing::debug!("browser close timed out");
            false
        }
    };
    if !closed {
        if let Err(e) = browser.kill().await {
            tracing::debug!(error = %e, "browser kill failed");
        }
    }

    match tokio::time::timeout(limit, browser.wait()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "browser wait error"),
        Err(_) => {
            tracing::warn!("browser process did not exit, killing");
            if let Err(e) = browser.kill().await {
                tracing::debug!(error = %e, "browser kill failed");
            }
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let session = self.retry.run("browser launch", || self.launch()).await?;
        let result = self.render_in(&session, url).await;
        session.close(self.timeouts.shutdown).await;
        result
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}
