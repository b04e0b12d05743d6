// src/dedup.rs
//! Persisted set of normalized-URL hashes ("already archived").

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::url_hash;

pub const DEDUP_FILE_NAME: &str = "processed_urls.json";

#[derive(Debug, Default)]
pub struct DedupStore {
    path: PathBuf,
    hashes: HashSet<String>,
}

impl DedupStore {
    /// Empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hashes: HashSet::new(),
        }
    }

    /// Load hashes from `path`. A missing file is an empty set; a corrupt one
    /// is logged and also treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let hashes = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<Vec<String>>(&s) {
                Ok(v) => v.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt dedup file, starting empty");
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable dedup file, starting empty");
                HashSet::new()
            }
        };
        tracing::debug!(path = %path.display(), count = hashes.len(), "dedup set loaded");
        Self { path, hashes }
    }

    /// Store under `<output_root>/processed_urls.json`.
    pub fn load_in(output_root: &Path) -> Self {
        Self::load(output_root.join(DEDUP_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the backing file with the full set.
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.path)
    }

    /// Write the set as a sorted JSON array: temp file first, then rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating dedup dir {}", parent.display()))?;
        }
        let mut sorted: Vec<&String> = self.hashes.iter().collect();
        sorted.sort();
        let body = serde_json::to_vec(&sorted).context("serializing dedup set")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Returns true if the hash was not present before.
    pub fn add(&mut self, hash: impl Into<String>) -> bool {
        self.hashes.insert(hash.into())
    }

    /// False once any URL normalizing to the same hash has been marked.
    pub fn should_fetch(&self, url: &str) -> bool {
        !self.contains(&url_hash(url))
    }

    pub fn mark_processed(&mut self, url: &str) -> bool {
        self.add(url_hash(url))
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }
}
