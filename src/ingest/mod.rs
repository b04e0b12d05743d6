// src/ingest/mod.rs
//! Pipeline Orchestrator.
//!
//! Per source: fetch posts -> filter -> for each item dedup gate -> fetch ->
//! sanitize -> record. Item failures stay with the item, source failures stay
//! with the source. Only output-path write failures end the run.

pub mod config;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod types;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::Instrument;

use crate::dedup::DedupStore;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::ingest::config::Config;
use crate::ingest::registry::SourceRegistry;
use crate::ingest::types::Source;
use crate::stats::{RunStats, StatsStore};

/// One-time metrics registration (so series show up on any installed exporter).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pasture_items_scraped_total",
            "Items archived as Markdown, by source."
        );
        describe_counter!(
            "pasture_items_duplicate_total",
            "Items skipped because their URL hash was already processed."
        );
        describe_counter!(
            "pasture_items_rejected_total",
            "Items rejected by a blacklist (pre- or post-fetch)."
        );
        describe_counter!(
            "pasture_item_errors_total",
            "Items whose fetch or sanitize step failed."
        );
        describe_counter!(
            "pasture_source_errors_total",
            "Source fetch/parse/setup failures."
        );
        describe_counter!(
            "pasture_media_skipped_total",
            "Media URLs skipped without fetching."
        );
        describe_counter!(
            "pasture_scheduled_runs_total",
            "Scheduled (interval-driven) runs."
        );
        describe_histogram!("pasture_fetch_ms", "Page retrieval time in milliseconds.");
        describe_gauge!("pasture_last_run_ts", "Unix ts when a run last finished.");
    });
}

/// Per-source counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub eligible: usize,
    pub archived: usize,
    pub duplicates: usize,
    /// Pre-fetch and post-fetch blacklist rejections.
    pub rejected: usize,
    pub failed: usize,
    pub media_skipped: usize,
    /// Set when fetching or filtering the source failed.
    pub source_error: Option<String>,
}

/// Shared per-run state threaded through each source.
pub struct Pipeline<'a> {
    fetcher: &'a Fetcher,
    dedup: &'a mut DedupStore,
    stats: &'a mut RunStats,
    output_root: &'a Path,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        fetcher: &'a Fetcher,
        dedup: &'a mut DedupStore,
        stats: &'a mut RunStats,
        output_root: &'a Path,
    ) -> Self {
        Self {
            fetcher,
            dedup,
            stats,
            output_root,
        }
    }

    /// Run one source to completion. `Err` means the output tree could not
    /// be written and the whole run must stop.
    pub async fn run_source(&mut self, source: &dyn Source) -> Result<SourceReport> {
        let name = source.name().to_string();
        let mut report = SourceReport {
            source: name.clone(),
            ..Default::default()
        };
        self.stats.add_source(&name);

        let items = match source.fetch_posts().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(source = %name, error = ?e, "source fetch failed, skipping");
                self.stats.record_error(&name);
                counter!("pasture_source_errors_total").increment(1);
                report.source_error = Some(format!("{e:#}"));
                return Ok(report);
            }
        };
        report.fetched = items.len();

        let rejected_before = self.rejected_for(&name);
        let eligible = source.filter_posts(items, self.stats);
        report.eligible = eligible.len();
        report.rejected = (self.rejected_for(&name) - rejected_before) as usize;
        if eligible.is_empty() {
            tracing::info!(source = %name, fetched = report.fetched, "nothing eligible");
            return Ok(report);
        }

        let out_dir = source
            .output_directory(self.output_root)
            .with_context(|| format!("creating output directory for '{name}'"))?;
        let rules = source.settings().content_rules();

        for item in &eligible {
            let url = source.url_from_post(item);
            if !self.dedup.should_fetch(url) {
                tracing::debug!(source = %name, url, "duplicate, skipped");
                self.stats.record_duplicate(&name);
                counter!("pasture_items_duplicate_total", "source" => name.clone()).increment(1);
                report.duplicates += 1;
                continue;
            }

            tracing::info!(source = %name, url, "fetching");
            match self.fetcher.fetch(url, &out_dir, &rules).await? {
                FetchOutcome::Archived(path) => {
                    self.dedup.mark_processed(url);
                    self.stats.record_scraped(&name);
                    counter!("pasture_items_scraped_total", "source" => name.clone()).increment(1);
                    report.archived += 1;
                    tracing::info!(source = %name, url, path = %path.display(), "archived");
                }
                FetchOutcome::MediaSkipped => {
                    report.media_skipped += 1;
                }
                FetchOutcome::Rejected(terms) => {
                    // Not re-rendered on later runs.
                    self.dedup.mark_processed(url);
                    self.stats.record_rejected(&name, &terms);
                    counter!("pasture_items_rejected_total", "source" => name.clone()).increment(1);
                    report.rejected += 1;
                }
                FetchOutcome::Failed(reason) => {
                    self.stats.record_error(&name);
                    counter!("pasture_item_errors_total", "source" => name.clone()).increment(1);
                    report.failed += 1;
                    tracing::warn!(source = %name, url, reason = %reason, "item failed");
                }
            }
        }

        tracing::info!(
            source = %name,
            fetched = report.fetched,
            eligible = report.eligible,
            archived = report.archived,
            duplicates = report.duplicates,
            rejected = report.rejected,
            failed = report.failed,
            media = report.media_skipped,
            "source done"
        );
        Ok(report)
    }

    fn rejected_for(&self, name: &str) -> u64 {
        self.stats
            .source_breakdown
            .get(name)
            .map(|c| c.rejected)
            .unwrap_or(0)
    }
}

/// Run every configured source once.
pub async fn run_once(
    config: &Config,
    registry: &SourceRegistry,
    fetcher: &Fetcher,
    output_root: &Path,
) -> Result<RunStats> {
    run_selected(config, registry, fetcher, output_root, &config.source_names()).await
}

/// Run the named sources (configuration order), persisting the dedup set
/// after each source and the statistics at the end.
pub async fn run_selected(
    config: &Config,
    registry: &SourceRegistry,
    fetcher: &Fetcher,
    output_root: &Path,
    names: &[String],
) -> Result<RunStats> {
    ensure_metrics_described();
    std::fs::create_dir_all(output_root)
        .with_context(|| format!("creating output root {}", output_root.display()))?;

    for missing in names
        .iter()
        .filter(|n| !config.sources.iter().any(|s| &s.name == *n))
    {
        tracing::warn!(source = %missing, "not in configuration, skipped");
    }

    let mut dedup = DedupStore::load_in(output_root);
    let mut stats = RunStats::new();
    tracing::info!(sources = names.len(), known = dedup.len(), "run started");

    for settings in config
        .resolved_sources()
        .into_iter()
        .filter(|s| names.contains(&s.name))
    {
        let name = settings.name.clone();
        let span = tracing::info_span!("source", source = %name);

        let source = match registry.create(settings) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(parent: &span, error = ?e, "source setup failed, skipping");
                stats.add_source(&name);
                stats.record_error(&name);
                counter!("pasture_source_errors_total").increment(1);
                continue;
            }
        };

        Pipeline::new(fetcher, &mut dedup, &mut stats, output_root)
            .run_source(source.as_ref())
            .instrument(span)
            .await?;

        dedup
            .save()
            .with_context(|| format!("saving dedup set {}", dedup.path().display()))?;
    }

    gauge!("pasture_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    if let Err(e) = StatsStore::in_dir(output_root).save_session(&stats) {
        tracing::error!(error = ?e, "failed to save stats");
    }
    tracing::info!(
        scraped = stats.articles_scraped,
        duplicates = stats.articles_skipped_duplicate,
        rejected = stats.articles_rejected_blacklist,
        errors = stats.errors,
        "run completed"
    );
    Ok(stats)
}
