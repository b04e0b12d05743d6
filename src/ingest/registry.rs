// src/ingest/registry.rs
//! Adapter selection. New source types plug in through `register`; the
//! orchestrator only ever sees `Box<dyn Source>`.

use anyhow::{anyhow, Result};
use std::collections::HashMap;

use crate::ingest::providers::{HackerNewsSource, RedditSource, RssSource};
use crate::ingest::types::{Source, SourceSettings};

pub const KIND_REDDIT: &str = "reddit";
pub const KIND_HACKERNEWS: &str = "hackernews";
pub const KIND_RSS: &str = "rss";

pub type SourceCtor = Box<dyn Fn(SourceSettings) -> Result<Box<dyn Source>> + Send + Sync>;

/// Explicit type wins; otherwise guess from the URL, defaulting to Reddit.
pub fn infer_kind(explicit: Option<&str>, url: &str) -> String {
    if let Some(k) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return k.to_ascii_lowercase();
    }
    let u = url.to_ascii_lowercase();
    if u.contains("reddit.com") {
        KIND_REDDIT.to_string()
    } else if u.contains("news.ycombinator.com")
        || u.contains("hacker-news.firebaseio.com")
        || u.contains("hackernews")
    {
        KIND_HACKERNEWS.to_string()
    } else {
        KIND_REDDIT.to_string()
    }
}

pub struct SourceRegistry {
    ctors: HashMap<String, SourceCtor>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl SourceRegistry {
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// `reddit`, `hackernews` and `rss` over HTTP.
    pub fn with_builtin() -> Self {
        let mut r = Self::empty();
        r.register(KIND_REDDIT, |s| Ok(Box::new(RedditSource::new(s)?)));
        r.register(KIND_HACKERNEWS, |s| Ok(Box::new(HackerNewsSource::new(s)?)));
        r.register(KIND_RSS, |s| Ok(Box::new(RssSource::new(s)?)));
        r
    }

    /// Add or replace the constructor for `kind` (case-insensitive).
    pub fn register<F>(&mut self, kind: &str, ctor: F)
    where
        F: Fn(SourceSettings) -> Result<Box<dyn Source>> + Send + Sync + 'static,
    {
        self.ctors
            .insert(kind.trim().to_ascii_lowercase(), Box::new(ctor));
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    /// Build the adapter for `settings.kind`. Unknown kinds are an error for
    /// this source only.
    pub fn create(&self, settings: SourceSettings) -> Result<Box<dyn Source>> {
        let kind = settings.kind.trim().to_ascii_lowercase();
        let ctor = self.ctors.get(&kind).ok_or_else(|| {
            anyhow!(
                "unknown source type '{}' for '{}' (known: {})",
                settings.kind,
                settings.name,
                self.kinds().join(", ")
            )
        })?;
        ctor(settings)
    }
}
