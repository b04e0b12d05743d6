// src/ingest/types.rs
use anyhow::Result;
use chrono::{Local, NaiveDate};
use metrics::counter;
use std::path::{Path, PathBuf};

use crate::blacklist::matching_terms;
use crate::sanitize::ContentRules;
use crate::stats::RunStats;

/// One record from a source feed. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    /// External URL (empty when the record has none).
    pub url: String,
    pub description: Option<String>,
    pub author: Option<String>,
    /// Publish date as given by the feed, or RFC 3339 when derived.
    pub published: Option<String>,
    pub categories: Vec<String>,
    pub stickied: bool,
    pub is_self: bool,
    /// Feed-level item type (e.g. HN "story").
    pub kind: Option<String>,
}

/// Resolved per-source settings shared by every adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    pub name: String,
    pub url: String,
    pub kind: String,
    /// Effective list (global merged with source).
    pub blacklist: Vec<String>,
    /// Effective list (global merged with source).
    pub remove_tags: Vec<String>,
    pub interval_minutes: Option<u64>,
    pub max_age_days: Option<u64>,
}

impl SourceSettings {
    /// `base/<name>/<YYYY>/<MM>/<DD>`, created if absent.
    pub fn output_directory(&self, base: &Path, date: NaiveDate) -> std::io::Result<PathBuf> {
        let dir = base
            .join(&self.name)
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(date.format("%d").to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn content_rules(&self) -> ContentRules {
        ContentRules::new(self.remove_tags.clone(), self.blacklist.clone())
    }

    /// Pre-fetch blacklist gate. On a hit the rejection is recorded and
    /// `true` is returned.
    pub fn reject_if_blacklisted(&self, haystacks: &[&str], stats: &mut RunStats) -> bool {
        let hits = matching_terms(&self.blacklist, haystacks);
        if hits.is_empty() {
            return false;
        }
        tracing::debug!(source = %self.name, terms = ?hits, "item rejected by blacklist");
        stats.record_rejected(&self.name, &hits);
        counter!("pasture_items_rejected_total", "source" => self.name.clone()).increment(1);
        true
    }
}

/// Source Adapter contract.
///
/// Adapters implement fetching and eligibility; everything else defaults to
/// the shared `SourceSettings`.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    fn settings(&self) -> &SourceSettings;

    /// Request failures are logged and yield an empty list.
    async fn fetch_posts(&self) -> Result<Vec<SourceItem>>;

    /// Eligible items, in feed order. Blacklist hits are recorded in `stats`.
    fn filter_posts(&self, items: Vec<SourceItem>, stats: &mut RunStats) -> Vec<SourceItem>;

    fn name(&self) -> &str {
        &self.settings().name
    }

    fn url_from_post<'a>(&self, item: &'a SourceItem) -> &'a str {
        item.url.trim()
    }

    fn output_directory(&self, base: &Path) -> std::io::Result<PathBuf> {
        self.settings()
            .output_directory(base, Local::now().date_naive())
    }

    fn tags_to_remove(&self) -> &[String] {
        &self.settings().remove_tags
    }

    fn blacklist(&self) -> &[String] {
        &self.settings().blacklist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_directory_is_zero_padded() {
        let tmp = tempfile::tempdir().unwrap();
        let s = SourceSettings {
            name: "news".into(),
            ..Default::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let dir = s.output_directory(tmp.path(), date).unwrap();
        assert_eq!(dir, tmp.path().join("news").join("2024").join("03").join("07"));
        assert!(dir.is_dir());
    }

    #[test]
    fn blacklist_gate_records_terms() {
        let s = SourceSettings {
            name: "r".into(),
            blacklist: vec!["politics".into()],
            ..Default::default()
        };
        let mut stats = RunStats::new();
        assert!(s.reject_if_blacklisted(&["World POLITICS"], &mut stats));
        assert!(!s.reject_if_blacklisted(&["Rust 2.0"], &mut stats));
        assert_eq!(stats.blacklist_hits_by_term["politics"], 1);
    }
}
