use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the metadata file inside each logical name's directory.
pub const METADATA_FILE: &str = "file.json";

/// A logical, content-addressed file entry.
///
/// Created with `hash: None`; the hash is assigned exactly once from the
/// materialized content by [`ContentStore::set_hash`](super::local::ContentStore::set_hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwarmFile {
    /// Globally unique, path-like key (e.g. `apps/render.zip`).
    pub logical_name: String,
    pub created: DateTime<Utc>,
    /// Content file name inside the logical name's directory.
    pub file_name: String,
    pub hash: Option<String>,
}

impl SwarmFile {
    pub fn new(logical_name: &str, file_name: &str) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            created: Utc::now(),
            file_name: file_name.to_string(),
            hash: None,
        }
    }

    /// True when both sides carry a hash and the hashes differ, or when
    /// either side has none yet.
    pub fn differs_from(&self, other: &SwarmFile) -> bool {
        match (&self.hash, &other.hash) {
            (Some(a), Some(b)) => a != b,
            _ => true,
        }
    }
}

/// One result row of [`ContentStore::list`](super::local::ContentStore::list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    File(SwarmFile),
    /// A directory below the listed path that holds no metadata itself.
    Directory(String),
}

impl ListEntry {
    pub fn as_file(&self) -> Option<&SwarmFile> {
        match self {
            ListEntry::File(f) => Some(f),
            ListEntry::Directory(_) => None,
        }
    }
}
