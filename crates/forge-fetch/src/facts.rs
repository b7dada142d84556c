//! Fact cache
//!
//! A persistent key → string map used to memoize resolution results such as
//! `git-rev-to-tree-hash-<rev>`. Writes overwrite; there is no cross-key
//! atomicity. Each upsert re-reads the file first, so caches sharing a file
//! keep each other's keys and the last writer wins per key.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during fact cache operations
#[derive(Debug, Error)]
pub enum FactCacheError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Key/value store of memoized facts
pub trait FactCache: Send + Sync {
    fn query_fact(&self, key: &str) -> Option<String>;

    /// Insert or overwrite
    fn upsert_fact(&self, key: &str, value: &str) -> Result<(), FactCacheError>;
}

/// [`FactCache`] persisted as a single JSON object
#[derive(Debug)]
pub struct JsonFactCache {
    path: PathBuf,
    facts: Mutex<BTreeMap<String, String>>,
}

impl JsonFactCache {
    /// Load `path`, or start empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FactCacheError> {
        let path = path.into();
        let facts = read_facts(&path)?;
        Ok(Self {
            path,
            facts: Mutex::new(facts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.facts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.lock().is_empty()
    }

    fn persist(&self, facts: &BTreeMap<String, String>) -> Result<(), FactCacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(facts)?;

        // Write to a temporary file first, then move into place
        let tmp_path = self.path.with_extension(format!("tmp-{}", std::process::id()));
        let mut tmp_file = fs::File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn read_facts(path: &Path) -> Result<BTreeMap<String, String>, FactCacheError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

impl FactCache for JsonFactCache {
    fn query_fact(&self, key: &str) -> Option<String> {
        self.facts.lock().get(key).cloned()
    }

    fn upsert_fact(&self, key: &str, value: &str) -> Result<(), FactCacheError> {
        let mut facts = self.facts.lock();
        facts.extend(read_facts(&self.path)?);
        facts.insert(key.to_string(), value.to_string());
        self.persist(&facts)
    }
}
