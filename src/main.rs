//! pasture: binary entrypoint.
//! Loads configuration, then either runs every source once or enters the
//! scheduled loop (when any section sets `interval`).

use anyhow::{Context, Result};
use pasture::ingest::{self, scheduler};
use pasture::{Config, Fetcher, SourceRegistry};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENV_OUTPUT_DIR: &str = "PASTURE_OUTPUT_DIR";
const ENV_ONCE: &str = "PASTURE_ONCE";
const ENV_LOG_JSON: &str = "PASTURE_LOG_JSON";
const DEFAULT_OUTPUT_DIR: &str = "output";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Compact logs by default, JSON with PASTURE_LOG_JSON=1.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pasture=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if env_flag(ENV_LOG_JSON) {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let (config, config_path) = Config::load_default().context("loading configuration")?;
    let output_root = std::env::var(ENV_OUTPUT_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let registry = SourceRegistry::with_builtin();
    let fetcher = Fetcher::from_env()?;

    tracing::info!(
        config = %config_path.display(),
        output = %output_root.display(),
        sources = config.sources.len(),
        "pasture starting"
    );

    if config.wants_schedule() && !env_flag(ENV_ONCE) {
        let (trigger, reload) = scheduler::reload_channel();
        let watcher = scheduler::spawn_config_watcher(config_path.clone(), trigger);
        let res = scheduler::run_scheduled(
            config,
            &config_path,
            &registry,
            &fetcher,
            &output_root,
            reload,
        )
        .await;
        watcher.abort();
        res?;
    } else {
        ingest::run_once(&config, &registry, &fetcher, &output_root).await?;
    }
    Ok(())
}
