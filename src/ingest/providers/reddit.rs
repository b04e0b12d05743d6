// src/ingest/providers/reddit.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{Source, SourceItem, SourceSettings};
use crate::stats::RunStats;

pub const USER_AGENT: &str = "pasture/0.1 (link archiver)";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}
#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}
#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}
#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    link_flair_text: Option<String>,
}

/// Subreddit JSON listing (`https://www.reddit.com/r/<name>/.json`).
pub struct RedditSource {
    settings: SourceSettings,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RedditSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("building reddit client")?;
        Ok(Self {
            settings,
            mode: Mode::Http { client },
        })
    }

    pub fn from_fixture(settings: SourceSettings, body: &str) -> Self {
        Self {
            settings,
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn parse_listing(body: &str) -> Result<Vec<SourceItem>> {
        let listing: Listing = serde_json::from_str(body).context("parsing reddit listing")?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|c| {
                let p = c.data;
                SourceItem {
                    id: p.id,
                    title: p.title,
                    url: p.url.unwrap_or_default(),
                    description: p.selftext.filter(|s| !s.is_empty()),
                    author: p.author,
                    published: p
                        .created_utc
                        .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
                        .map(|dt| dt.to_rfc3339()),
                    categories: p.link_flair_text.into_iter().collect(),
                    stickied: p.stickied,
                    is_self: p.is_self,
                    kind: Some("post".to_string()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl Source for RedditSource {
    fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    async fn fetch_posts(&self) -> Result<Vec<SourceItem>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client } => {
                let resp = client
                    .get(&self.settings.url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                let text = match resp {
                    Ok(r) => r.text().await,
                    Err(e) => Err(e),
                };
                match text {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(source = %self.settings.name, error = %e, "reddit fetch failed");
                        counter!("pasture_source_errors_total").increment(1);
                        return Ok(Vec::new());
                    }
                }
            }
        };
        let items = Self::parse_listing(&body)?;
        tracing::info!(source = %self.settings.name, count = items.len(), "fetched posts");
        Ok(items)
    }

    fn filter_posts(&self, items: Vec<SourceItem>, stats: &mut RunStats) -> Vec<SourceItem> {
        let total = items.len();
        let kept: Vec<SourceItem> = items
            .into_iter()
            .filter(|p| !p.stickied && !p.is_self && !p.url.trim().is_empty())
            .filter(|p| !self.settings.reject_if_blacklisted(&[p.title.as_str()], stats))
            .collect();
        if kept.len() < total {
            tracing::debug!(source = %self.settings.name, filtered = total - kept.len(), "posts filtered");
        }
        kept
    }
}
