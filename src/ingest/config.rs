// src/ingest/config.rs
//! Source configuration.
//!
//! A document is a mapping of section name -> section. The `global` section
//! is merged into every other section. Sections keep file order.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::blacklist::merge_terms;
use crate::ingest::registry::{infer_kind, KIND_HACKERNEWS};
use crate::ingest::types::SourceSettings;

pub const ENV_CONFIG_PATH: &str = "PASTURE_CONFIG";
pub const GLOBAL_SECTION: &str = "global";
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;

const FALLBACK_PATHS: &[&str] = &["config/pasture.toml", "config/pasture.json", "config.toml"];

/// One validated section, before the global merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionConfig {
    pub url: Option<String>,
    pub kind: Option<String>,
    pub blacklist: Vec<String>,
    pub remove_tags: Vec<String>,
    pub interval: Option<u64>,
    pub max_age_days: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSection {
    pub name: String,
    pub section: SectionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub global: SectionConfig,
    pub sources: Vec<NamedSection>,
}

/// Either `["a", "b"]` or `"a, b"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListValue {
    List(Vec<String>),
    Csv(String),
}

impl ListValue {
    fn into_vec(self) -> Vec<String> {
        let raw = match self {
            ListValue::List(v) => v,
            ListValue::Csv(s) => s.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Either `30` or `"30"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSection {
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    blacklist: Option<ListValue>,
    remove_tags: Option<ListValue>,
    interval: Option<NumValue>,
    max_age_days: Option<NumValue>,
}

fn positive(field: &str, v: Option<NumValue>) -> Result<Option<u64>> {
    let n = match v {
        None => return Ok(None),
        Some(NumValue::Int(i)) => i,
        Some(NumValue::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(NumValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| anyhow!("{field} must be an integer, got '{s}'"))?,
    };
    if n <= 0 {
        bail!("{field} must be positive, got {n}");
    }
    Ok(Some(n as u64))
}

impl RawSection {
    fn validate(self, name: &str) -> Result<SectionConfig> {
        let section = SectionConfig {
            url: self.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            kind: self
                .kind
                .map(|k| k.trim().to_ascii_lowercase())
                .filter(|k| !k.is_empty()),
            blacklist: self.blacklist.map(ListValue::into_vec).unwrap_or_default(),
            remove_tags: self.remove_tags.map(ListValue::into_vec).unwrap_or_default(),
            interval: positive("interval", self.interval)?,
            max_age_days: positive("max_age_days", self.max_age_days)?,
        };
        if name != GLOBAL_SECTION
            && section.url.is_none()
            && section.kind.as_deref() != Some(KIND_HACKERNEWS)
        {
            bail!("missing required key 'url'");
        }
        Ok(section)
    }
}

impl Config {
    /// Build from an in-memory mapping, validating sources as given.
    pub fn from_sections<I>(sections: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, SectionConfig)>,
    {
        let mut cfg = Config::default();
        for (name, section) in sections {
            if name == GLOBAL_SECTION {
                cfg.global = section;
                continue;
            }
            if section.url.is_none() && section.kind.as_deref() != Some(KIND_HACKERNEWS) {
                bail!("section '{name}': missing required key 'url'");
            }
            if cfg.sources.iter().any(|s| s.name == name) {
                bail!("section '{name}' defined twice");
            }
            cfg.sources.push(NamedSection { name, section });
        }
        Ok(cfg)
    }

    fn from_raw(raw: Vec<(String, RawSection)>) -> Result<Self> {
        let mut sections = Vec::with_capacity(raw.len());
        for (name, r) in raw {
            let s = r
                .validate(&name)
                .with_context(|| format!("invalid section '{name}'"))?;
            sections.push((name, s));
        }
        Self::from_sections(sections)
    }

    /// Parse TOML (`[name]` tables) or JSON (`{"name": {...}}`).
    pub fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        match hint_ext {
            "toml" => Self::from_raw(parse_toml(s)?),
            "json" => Self::from_raw(parse_json(s)?),
            _ => match parse_toml(s) {
                Ok(raw) => Self::from_raw(raw),
                Err(_) => Self::from_raw(parse_json(s).context("unsupported config format")?),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, ext.as_str())
            .with_context(|| format!("loading config {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $PASTURE_CONFIG
    /// 2) config/pasture.toml
    /// 3) config/pasture.json
    /// 4) config.toml
    pub fn load_default() -> Result<(Self, PathBuf)> {
        let path = default_path()?;
        Ok((Self::load_from(&path)?, path))
    }

    /// Global section merged into every source, in file order.
    pub fn resolved_sources(&self) -> Vec<SourceSettings> {
        self.sources.iter().map(|s| self.resolve(s)).collect()
    }

    pub fn resolve(&self, named: &NamedSection) -> SourceSettings {
        let g = &self.global;
        let s = &named.section;
        // Feed URLs are per source; the global section never supplies one.
        let url = s.url.clone().unwrap_or_default();
        let explicit = s.kind.as_deref().or(g.kind.as_deref());
        SourceSettings {
            name: named.name.clone(),
            kind: infer_kind(explicit, &url),
            url,
            blacklist: merge_terms(&g.blacklist, &s.blacklist),
            remove_tags: merge_terms(&g.remove_tags, &s.remove_tags),
            interval_minutes: s.interval.or(g.interval),
            max_age_days: s.max_age_days.or(g.max_age_days),
        }
    }

    /// Scheduled mode is on when any section sets an interval.
    pub fn wants_schedule(&self) -> bool {
        self.global.interval.is_some() || self.sources.iter().any(|s| s.section.interval.is_some())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }
}

/// Effective interval in minutes for a resolved source.
pub fn interval_minutes(settings: &SourceSettings) -> u64 {
    settings.interval_minutes.unwrap_or(DEFAULT_INTERVAL_MINUTES)
}

pub fn default_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!("PASTURE_CONFIG points to non-existent path"));
    }
    FALLBACK_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("no config file found (tried {})", FALLBACK_PATHS.join(", ")))
}

fn parse_toml(s: &str) -> Result<Vec<(String, RawSection)>> {
    let table: toml::Table = toml::from_str(s).context("parsing toml")?;
    table
        .into_iter()
        .map(|(name, v)| {
            let raw: RawSection = v
                .try_into()
                .with_context(|| format!("invalid section '{name}'"))?;
            Ok((name, raw))
        })
        .collect()
}

fn parse_json(s: &str) -> Result<Vec<(String, RawSection)>> {
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(s).context("parsing json")?;
    map.into_iter()
        .map(|(name, v)| {
            let raw: RawSection = serde_json::from_value(v)
                .with_context(|| format!("invalid section '{name}'"))?;
            Ok((name, raw))
        })
        .collect()
}
