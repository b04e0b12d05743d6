// src/ingest/providers/hackernews.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::ingest::types::{Source, SourceItem, SourceSettings};
use crate::stats::RunStats;

pub const DEFAULT_TOP_STORIES_URL: &str = "https://hacker-news.firebaseio.com/v0/topstories.json";
pub const ITEM_URL_BASE: &str = "https://hacker-news.firebaseio.com/v0/item";
pub const MAX_STORIES: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct HnItem {
    pub id: u64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
}

impl From<HnItem> for SourceItem {
    fn from(it: HnItem) -> Self {
        SourceItem {
            id: it.id.to_string(),
            title: it.title.unwrap_or_default(),
            url: it.url.unwrap_or_default(),
            author: it.by,
            published: it
                .time
                .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                .map(|dt| dt.to_rfc3339()),
            kind: it.kind,
            ..Default::default()
        }
    }
}

/// Hacker News top stories via the Firebase API.
pub struct HackerNewsSource {
    settings: SourceSettings,
    mode: Mode,
}

enum Mode {
    /// Top-story ID list plus item bodies keyed by ID.
    Fixture {
        ids: String,
        items: HashMap<u64, String>,
    },
    Http {
        list_url: String,
        client: reqwest::Client,
    },
}

/// Configured URL if it is a JSON endpoint, the public API otherwise.
pub fn top_stories_url(configured: &str) -> String {
    let c = configured.trim();
    let path = c.split(['?', '#']).next().unwrap_or_default();
    if path.to_ascii_lowercase().ends_with(".json") {
        c.to_string()
    } else {
        DEFAULT_TOP_STORIES_URL.to_string()
    }
}

impl HackerNewsSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building hackernews client")?;
        let list_url = top_stories_url(&settings.url);
        Ok(Self {
            settings,
            mode: Mode::Http { list_url, client },
        })
    }

    /// `ids` is the topstories JSON array; `items` pairs an ID with its JSON.
    pub fn from_fixture(settings: SourceSettings, ids: &str, items: &[(u64, &str)]) -> Self {
        Self {
            settings,
            mode: Mode::Fixture {
                ids: ids.to_string(),
                items: items.iter().map(|(id, s)| (*id, s.to_string())).collect(),
            },
        }
    }

    fn parse_ids(body: &str) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = serde_json::from_str(body).context("parsing hn top stories")?;
        ids.truncate(MAX_STORIES);
        Ok(ids)
    }

    /// Stories that link somewhere; Ask/Job/text posts are dropped.
    fn keep_story(item: &HnItem) -> bool {
        item.kind.as_deref() == Some("story")
            && item.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    async fn fetch_item(&self, client: &reqwest::Client, id: u64) -> Result<HnItem> {
        let url = format!("{ITEM_URL_BASE}/{id}.json");
        let item = client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {url}"))?
            .json::<HnItem>()
            .await
            .with_context(|| format!("decoding {url}"))?;
        Ok(item)
    }
}

#[async_trait]
impl Source for HackerNewsSource {
    fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    async fn fetch_posts(&self) -> Result<Vec<SourceItem>> {
        let mut out = Vec::new();
        match &self.mode {
            Mode::Fixture { ids, items } => {
                for id in Self::parse_ids(ids)? {
                    let Some(body) = items.get(&id) else {
                        tracing::debug!(id, "hn fixture item missing, skipped");
                        continue;
                    };
                    match serde_json::from_str::<HnItem>(body) {
                        Ok(it) if Self::keep_story(&it) => out.push(it.into()),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(id, error = %e, "hn item skipped"),
                    }
                }
            }
            Mode::Http { list_url, client } => {
                let body = match client
                    .get(list_url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                {
                    Ok(r) => r.text().await,
                    Err(e) => Err(e),
                };
                let body = match body {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::warn!(source = %self.settings.name, error = %e, "hn top stories fetch failed");
                        counter!("pasture_source_errors_total").increment(1);
                        return Ok(Vec::new());
                    }
                };
                for id in Self::parse_ids(&body)? {
                    match self.fetch_item(client, id).await {
                        Ok(it) if Self::keep_story(&it) => out.push(it.into()),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(id, error = ?e, "hn item skipped"),
                    }
                }
            }
        }
        tracing::info!(source = %self.settings.name, count = out.len(), "stories with urls");
        Ok(out)
    }

    fn filter_posts(&self, items: Vec<SourceItem>, stats: &mut RunStats) -> Vec<SourceItem> {
        items
            .into_iter()
            .filter(|p| !p.url.trim().is_empty())
            .filter(|p| {
                !self
                    .settings
                    .reject_if_blacklisted(&[p.title.as_str(), p.url.as_str()], stats)
            })
            .collect()
    }
}
