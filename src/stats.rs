// src/stats.rs
//! Statistics Aggregator.
//!
//! `RunStats` lives for one run and is mutated per item. At the end of the
//! run it is folded into `stats.json`: appended as a session record and merged
//! additively into the record for its calendar day.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATS_FILE_NAME: &str = "stats.json";
pub const MAX_SESSIONS: usize = 100;
pub const MAX_DAYS: usize = 90;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCounts {
    pub scraped: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub errors: u64,
}

impl SourceCounts {
    fn absorb(&mut self, other: &SourceCounts) {
        self.scraped += other.scraped;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        self.errors += other.errors;
    }
}

/// Counters for the run in progress.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub start_time: DateTime<Local>,
    pub articles_scraped: u64,
    pub articles_skipped_duplicate: u64,
    pub articles_rejected_blacklist: u64,
    pub blacklist_hits_by_term: BTreeMap<String, u64>,
    pub articles_by_source: BTreeMap<String, u64>,
    pub errors: u64,
    pub sources_processed: Vec<String>,
    pub source_breakdown: BTreeMap<String, SourceCounts>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            articles_scraped: 0,
            articles_skipped_duplicate: 0,
            articles_rejected_blacklist: 0,
            blacklist_hits_by_term: BTreeMap::new(),
            articles_by_source: BTreeMap::new(),
            errors: 0,
            sources_processed: Vec::new(),
            source_breakdown: BTreeMap::new(),
        }
    }

    fn counts(&mut self, source: &str) -> &mut SourceCounts {
        self.source_breakdown.entry(source.to_string()).or_default()
    }

    pub fn add_source(&mut self, source: &str) {
        if !self.sources_processed.iter().any(|s| s == source) {
            self.sources_processed.push(source.to_string());
        }
    }

    pub fn record_scraped(&mut self, source: &str) {
        self.articles_scraped += 1;
        *self.articles_by_source.entry(source.to_string()).or_default() += 1;
        self.counts(source).scraped += 1;
    }

    pub fn record_duplicate(&mut self, source: &str) {
        self.articles_skipped_duplicate += 1;
        self.counts(source).duplicates += 1;
    }

    /// One rejected article; every matching term is counted.
    pub fn record_rejected<S: AsRef<str>>(&mut self, source: &str, terms: &[S]) {
        self.articles_rejected_blacklist += 1;
        for t in terms {
            *self
                .blacklist_hits_by_term
                .entry(t.as_ref().to_string())
                .or_default() += 1;
        }
        self.counts(source).rejected += 1;
    }

    pub fn record_error(&mut self, source: &str) {
        self.errors += 1;
        self.counts(source).errors += 1;
    }

    pub fn scraped_for(&self, source: &str) -> u64 {
        self.articles_by_source.get(source).copied().unwrap_or(0)
    }

    pub fn to_session(&self, end: DateTime<Local>) -> SessionRecord {
        SessionRecord {
            date: end.format("%Y-%m-%d").to_string(),
            time: end.format("%H:%M:%S").to_string(),
            start_time: self.start_time.to_rfc3339(),
            end_time: end.to_rfc3339(),
            articles_scraped: self.articles_scraped,
            articles_skipped_duplicate: self.articles_skipped_duplicate,
            articles_rejected_blacklist: self.articles_rejected_blacklist,
            blacklist_hits_by_term: self.blacklist_hits_by_term.clone(),
            articles_by_source: self.articles_by_source.clone(),
            errors: self.errors,
            sources_processed: self.sources_processed.clone(),
            source_breakdown: self.source_breakdown.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    pub date: String,
    pub time: String,
    pub start_time: String,
    pub end_time: String,
    pub articles_scraped: u64,
    pub articles_skipped_duplicate: u64,
    pub articles_rejected_blacklist: u64,
    pub blacklist_hits_by_term: BTreeMap<String, u64>,
    pub articles_by_source: BTreeMap<String, u64>,
    pub errors: u64,
    pub sources_processed: Vec<String>,
    pub source_breakdown: BTreeMap<String, SourceCounts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyRecord {
    pub articles_scraped: u64,
    pub articles_rejected_blacklist: u64,
    pub articles_skipped_duplicate: u64,
    pub errors: u64,
    pub blacklist_hits_by_term: BTreeMap<String, u64>,
    pub articles_by_source: BTreeMap<String, u64>,
    pub source_breakdown: BTreeMap<String, SourceCounts>,
    pub sessions_count: u64,
}

impl DailyRecord {
    fn absorb(&mut self, s: &SessionRecord) {
        self.articles_scraped += s.articles_scraped;
        self.articles_rejected_blacklist += s.articles_rejected_blacklist;
        self.articles_skipped_duplicate += s.articles_skipped_duplicate;
        self.errors += s.errors;
        for (term, n) in &s.blacklist_hits_by_term {
            *self.blacklist_hits_by_term.entry(term.clone()).or_default() += n;
        }
        for (src, n) in &s.articles_by_source {
            *self.articles_by_source.entry(src.clone()).or_default() += n;
        }
        for (src, c) in &s.source_breakdown {
            self.source_breakdown.entry(src.clone()).or_default().absorb(c);
        }
        self.sessions_count += 1;
    }
}

/// On-disk shape of `stats.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsFile {
    pub sessions: Vec<SessionRecord>,
    pub daily: BTreeMap<String, DailyRecord>,
}

impl StatsFile {
    /// Append `session`, fold it into its day, then apply retention.
    pub fn merge_session(&mut self, session: SessionRecord) {
        self.daily
            .entry(session.date.clone())
            .or_default()
            .absorb(&session);
        self.sessions.push(session);

        if self.sessions.len() > MAX_SESSIONS {
            let drop = self.sessions.len() - MAX_SESSIONS;
            self.sessions.drain(..drop);
        }
        // ISO dates sort chronologically.
        while self.daily.len() > MAX_DAYS {
            if self.daily.pop_first().is_none() {
                break;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<output_root>/stats.json`
    pub fn in_dir(output_root: &Path) -> Self {
        Self::new(output_root.join(STATS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted document; missing or corrupt files read as empty.
    pub fn load(&self) -> StatsFile {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StatsFile::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "stats file unreadable, starting empty");
                return StatsFile::default();
            }
        };
        serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "stats file corrupt, starting empty");
            StatsFile::default()
        })
    }

    /// Merge `run` into the persisted document and rewrite it.
    pub fn save_session(&self, run: &RunStats) -> Result<SessionRecord> {
        let session = run.to_session(Local::now());
        let mut all = self.load();
        all.merge_session(session.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating stats dir {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&all).context("serializing stats")?;
        fs::write(&self.path, body)
            .with_context(|| format!("writing stats {}", self.path.display()))?;

        tracing::info!(
            scraped = session.articles_scraped,
            rejected = session.articles_rejected_blacklist,
            duplicates = session.articles_skipped_duplicate,
            errors = session.errors,
            "session stats saved"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_counts_article_once_and_every_term() {
        let mut r = RunStats::new();
        r.record_rejected("hn", &["crypto", "nft"]);
        r.record_rejected("hn", &["crypto"]);
        assert_eq!(r.articles_rejected_blacklist, 2);
        assert_eq!(r.blacklist_hits_by_term["crypto"], 2);
        assert_eq!(r.blacklist_hits_by_term["nft"], 1);
        assert_eq!(r.source_breakdown["hn"].rejected, 2);
    }

    #[test]
    fn daily_merge_is_additive() {
        let mut r = RunStats::new();
        r.record_scraped("a");
        r.record_duplicate("a");
        let s = r.to_session(Local::now());

        let mut f = StatsFile::default();
        f.merge_session(s.clone());
        f.merge_session(s.clone());
        let day = &f.daily[&s.date];
        assert_eq!(day.sessions_count, 2);
        assert_eq!(day.articles_scraped, 2);
        assert_eq!(day.articles_by_source["a"], 2);
        assert_eq!(day.source_breakdown["a"].duplicates, 2);
    }

    #[test]
    fn retention_bounds_sessions_and_days() {
        let mut f = StatsFile::default();
        for i in 0..(MAX_DAYS + 10) {
            let s = SessionRecord {
                date: format!("2024-{:02}-{:02}", 1 + i / 28, 1 + i % 28),
                ..Default::default()
            };
            f.merge_session(s);
        }
        for _ in 0..MAX_SESSIONS {
            f.merge_session(SessionRecord {
                date: "2099-01-01".into(),
                ..Default::default()
            });
        }
        assert_eq!(f.sessions.len(), MAX_SESSIONS);
        assert_eq!(f.daily.len(), MAX_DAYS);
        assert!(f.daily.contains_key("2099-01-01"));
        assert!(!f.daily.contains_key("2024-01-01"));
    }
}
