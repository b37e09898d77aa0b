//! Configured list store
//! Owns the set of (name, playlist URL, guide URL) pairings and persists it
//! as a JSON array. The sync cycle reads snapshots; the HTTP layer appends
//! and updates. All access goes through this type, never a bare shared list.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Upper bound on list names; they become file name stems
const MAX_NAME_LEN: usize = 64;

/// One configured pairing of a playlist source and a guide source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Unique key, also the stem of the on-disk artifacts
    pub name: String,
    /// Playlist (M3U) source URL
    pub m3u: String,
    /// Guide (XMLTV) source URL
    pub epg: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid list name {0:?}: use 1-64 ASCII letters, digits, '-' or '_'")]
    InvalidName(String),
    #[error("invalid source URL {0:?}: must start with http:// or https://")]
    InvalidUrl(String),
    #[error("a list named {0:?} already exists")]
    Duplicate(String),
    #[error("no list named {0:?}")]
    NotFound(String),
    #[error("cannot persist list configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed list configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Synchronized, persistent collection of [`ListEntry`] records
pub struct ListStore {
    path: PathBuf,
    entries: RwLock<Vec<ListEntry>>,
}

impl ListStore {
    /// Load the store from `path`, or start empty when the file is absent.
    /// Every persisted entry is re-validated so a hand-edited file cannot
    /// smuggle in a name that would escape the data directory.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)?;
            let entries: Vec<ListEntry> = serde_json::from_str(&content)?;
            for entry in &entries {
                validate_entry(entry)?;
            }
            entries
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    /// Copy of the current entries, in configuration order. Cycles iterate
    /// the snapshot so concurrent edits never expose a half-written entry.
    pub fn snapshot(&self) -> Vec<ListEntry> {
        self.entries.read().clone()
    }

    /// Validate and add a new entry. The candidate list is persisted first;
    /// the in-memory set only changes once the file has, so a persistence
    /// failure never leaves an entry visible in memory but absent on disk.
    pub fn append(&self, entry: ListEntry) -> Result<(), StoreError> {
        validate_entry(&entry)?;

        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.name == entry.name) {
            return Err(StoreError::Duplicate(entry.name));
        }
        let mut candidate = entries.clone();
        candidate.push(entry);
        self.persist(&candidate)?;
        *entries = candidate;
        Ok(())
    }

    /// Replace both source URLs of an existing entry. Persist-then-commit,
    /// same as [`ListStore::append`].
    pub fn update(&self, name: &str, m3u: String, epg: String) -> Result<(), StoreError> {
        validate_url(&m3u)?;
        validate_url(&epg)?;

        let mut entries = self.entries.write();
        let position = entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let mut candidate = entries.clone();
        candidate[position].m3u = m3u;
        candidate[position].epg = epg;
        self.persist(&candidate)?;
        *entries = candidate;
        Ok(())
    }

    fn persist(&self, entries: &[ListEntry]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// List names become file name stems, so they are restricted to a safe
/// identifier alphabet. Anything else could traverse out of the data dir.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn validate_entry(entry: &ListEntry) -> Result<(), StoreError> {
    if !valid_name(&entry.name) {
        return Err(StoreError::InvalidName(entry.name.clone()));
    }
    validate_url(&entry.m3u)?;
    validate_url(&entry.epg)
}

fn validate_url(url: &str) -> Result<(), StoreError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(StoreError::InvalidUrl(url.to_string()))
    }
}
