// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod blacklist;
pub mod dedup;
pub mod fetch;
pub mod ingest;
pub mod normalize;
pub mod sanitize;
pub mod stats;

// ---- Re-exports for stable public API ----
pub use crate::dedup::DedupStore;
pub use crate::fetch::{FetchError, FetchOutcome, Fetcher, PageRenderer};
pub use crate::ingest::config::Config;
pub use crate::ingest::registry::SourceRegistry;
pub use crate::ingest::types::{Source, SourceItem, SourceSettings};
pub use crate::ingest::{run_once, run_selected, Pipeline, SourceReport};
pub use crate::normalize::{normalize_url, url_hash};
pub use crate::stats::{RunStats, StatsStore};
