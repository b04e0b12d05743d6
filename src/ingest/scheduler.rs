// src/ingest/scheduler.rs
//! Scheduled mode: one initial full run, then each source on its own
//! interval. Config reloads arrive over a channel and rebuild the schedule.

use anyhow::Result;
use metrics::counter;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fetch::Fetcher;
use crate::ingest::config::{interval_minutes, Config};
use crate::ingest::registry::SourceRegistry;

const TICK: Duration = Duration::from_secs(1);
const WATCH_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    every: Duration,
    next_due: Instant,
}

/// Per-source due instants, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    entries: Vec<Entry>,
}

impl Schedule {
    pub fn from_intervals<I>(intervals: I, now: Instant) -> Self
    where
        I: IntoIterator<Item = (String, Duration)>,
    {
        let entries = intervals
            .into_iter()
            .map(|(name, every)| Entry {
                name,
                every,
                next_due: now + every,
            })
            .collect();
        Self { entries }
    }

    /// Every source, first due one interval after `now`.
    pub fn from_config(config: &Config, now: Instant) -> Self {
        Self::from_intervals(
            config.resolved_sources().into_iter().map(|s| {
                let every = Duration::from_secs(interval_minutes(&s) * 60);
                (s.name, every)
            }),
            now,
        )
    }

    pub fn due(&self, now: Instant) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.next_due <= now)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn mark_ran(&mut self, name: &str, now: Instant) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.name == name) {
            e.next_due = now + e.every;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sender half of the reload channel. Signals coalesce while one is pending.
#[derive(Debug, Clone)]
pub struct ReloadTrigger(mpsc::Sender<()>);

impl ReloadTrigger {
    /// False if the loop has gone away.
    pub fn trigger(&self) -> bool {
        match self.0.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

pub type ReloadReceiver = mpsc::Receiver<()>;

pub fn reload_channel() -> (ReloadTrigger, ReloadReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ReloadTrigger(tx), rx)
}

/// Poll `path`'s mtime every 2 s and signal on change.
pub fn spawn_config_watcher(path: PathBuf, trigger: ReloadTrigger) -> JoinHandle<()> {
    spawn_config_watcher_every(path, trigger, WATCH_POLL)
}

pub fn spawn_config_watcher_every(
    path: PathBuf,
    trigger: ReloadTrigger,
    poll: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        let mut last_mtime: Option<SystemTime> = None;
        loop {
            ticker.tick().await;
            let Ok(mtime) = std::fs::metadata(&path).and_then(|m| m.modified()) else {
                // File missing or unreadable; keep trying.
                continue;
            };
            let changed = match last_mtime {
                None => false,
                Some(prev) => mtime != prev,
            };
            last_mtime = Some(mtime);
            if changed {
                tracing::info!(path = %path.display(), "config changed");
                if !trigger.trigger() {
                    break;
                }
            }
        }
    })
}

/// Scheduled loop until Ctrl-C.
pub async fn run_scheduled(
    config: Config,
    config_path: &Path,
    registry: &SourceRegistry,
    fetcher: &Fetcher,
    output_root: &Path,
    reload: ReloadReceiver,
) -> Result<()> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    run_scheduled_until(config, config_path, registry, fetcher, output_root, reload, ctrl_c).await
}

/// Scheduled loop until `shutdown` resolves. Returns the error of a run that
/// could not write its output.
pub async fn run_scheduled_until<F>(
    mut config: Config,
    config_path: &Path,
    registry: &SourceRegistry,
    fetcher: &Fetcher,
    output_root: &Path,
    mut reload: ReloadReceiver,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    crate::ingest::run_once(&config, registry, fetcher, output_root).await?;
    let mut schedule = Schedule::from_config(&config, Instant::now());
    tracing::info!(sources = schedule.len(), "scheduler started");

    let mut ticker = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let due = schedule.due(Instant::now());
                if due.is_empty() {
                    continue;
                }
                tracing::info!(sources = ?due, "scheduled run");
                crate::ingest::run_selected(&config, registry, fetcher, output_root, &due).await?;
                counter!("pasture_scheduled_runs_total").increment(1);
                let now = Instant::now();
                for name in &due {
                    schedule.mark_ran(name, now);
                }
            }
            Some(()) = reload.recv() => {
                match Config::load_from(config_path) {
                    Ok(new_config) => {
                        config = new_config;
                        schedule = Schedule::from_config(&config, Instant::now());
                        tracing::info!(sources = schedule.len(), "config reloaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = ?e, "config reload failed, keeping previous config");
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("scheduler stopped");
                break;
            }
        }
    }
    Ok(())
}
