//! Local Content Store
//!
//! Every logical name maps to one directory below the store root holding a
//! metadata file ([`METADATA_FILE`]) and exactly one content file.
//!
//! ## Responsibilities
//! - **Two-phase files**: `create` hands out a record without hash, `set_hash`
//!   assigns it once, `write` publishes the metadata.
//! - **No orphans**: publishing metadata deletes every other content file in
//!   the same directory.
//! - **Self-healing reads**: unparsable metadata is deleted and reported as
//!   absent.
//! - **Advisory locks**: one lock per logical name. The primitive operations
//!   do not lock; composite read-modify-write sequences (`ingest`,
//!   [`download_to_local`](super::sync::download_to_local)) hold the lock for
//!   their whole duration.

use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use super::hash::{Progress, hash_file};
use super::types::{ListEntry, METADATA_FILE, SwarmFile};
use crate::config::NodeConfig;
use crate::error::SwarmError;

pub struct ContentStore {
    root: PathBuf,
    locks: DashMap<String, ()>,
    hash_limit: u64,
    backoff_start: Duration,
    backoff_max: Duration,
}

/// Held advisory lock on one logical name. Released on drop.
pub struct StoreLock<'a> {
    store: &'a ContentStore,
    name: String,
}

impl Drop for StoreLock<'_> {
    fn drop(&mut self) {
        self.store.locks.remove(&self.name);
        tracing::trace!(name = %self.name, "Released swarm file lock");
    }
}

impl ContentStore {
    pub fn new(root: PathBuf, hash_limit: u64) -> Self {
        let defaults = NodeConfig::default();
        Self {
            root,
            locks: DashMap::new(),
            hash_limit,
            backoff_start: defaults.lock_backoff_start,
            backoff_max: defaults.lock_backoff_max,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            root: config.files_dir(),
            locks: DashMap::new(),
            hash_limit: config.hash_prefix_limit,
            backoff_start: config.lock_backoff_start,
            backoff_max: config.lock_backoff_max,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquires the advisory lock for `name`, retrying with exponential backoff.
    pub async fn lock(&self, name: &str) -> StoreLock<'_> {
        let mut delay = self.backoff_start;
        loop {
            if let dashmap::Entry::Vacant(slot) = self.locks.entry(name.to_string()) {
                slot.insert(());
                return StoreLock {
                    store: self,
                    name: name.to_string(),
                };
            }
            tracing::trace!(name, delay_ms = delay.as_millis() as u64, "Swarm file is locked, waiting");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.backoff_max);
        }
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.locks.contains_key(name)
    }

    /// Directory of a logical name. Absolute names and `..` are rejected.
    pub fn dir_for(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            bail!("Invalid swarm file name: {:?}", name);
        }
        Ok(self.root.join(relative))
    }

    fn metadata_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.dir_for(name)?.join(METADATA_FILE))
    }

    /// Path of `file`'s content. The content file name must be a single
    /// plain path component.
    pub fn content_path(&self, file: &SwarmFile) -> Result<PathBuf> {
        check_file_name(&file.file_name)?;
        Ok(self.dir_for(&file.logical_name)?.join(&file.file_name))
    }

    /// Starts a new record at `name`. Fails with [`SwarmError::Conflict`] if
    /// metadata already exists there.
    pub async fn create(&self, name: &str, file_name: &str) -> Result<SwarmFile> {
        let metadata = self.metadata_path(name)?;
        if tokio::fs::try_exists(&metadata).await? {
            return Err(SwarmError::Conflict(name.to_string()).into());
        }
        tokio::fs::create_dir_all(self.dir_for(name)?).await?;
        Ok(SwarmFile::new(name, file_name))
    }

    /// Assigns the content hash. A file's hash can be set only once.
    pub async fn set_hash(
        &self,
        file: &SwarmFile,
        progress: Option<Progress<'_>>,
    ) -> Result<SwarmFile> {
        if file.hash.is_some() {
            return Err(SwarmError::HashAlreadySet(file.logical_name.clone()).into());
        }
        let path = self.content_path(file)?;
        let hash = hash_file(&path, self.hash_limit, progress)
            .await
            .with_context(|| format!("hashing {}", path.display()))?;

        Ok(SwarmFile {
            hash: Some(hash),
            ..file.clone()
        })
    }

    /// Persists metadata, then removes every other content file at that name.
    pub async fn write(&self, file: &SwarmFile) -> Result<()> {
        let dir = self.dir_for(&file.logical_name)?;
        tokio::fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(dir.join(METADATA_FILE), json).await?;

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let entry_name = entry.file_name();
            if entry_name == METADATA_FILE || entry_name.as_os_str() == file.file_name.as_str() {
                continue;
            }
            tokio::fs::remove_file(entry.path()).await?;
            tracing::debug!(path = %entry.path().display(), "Deleted stale content file");
        }
        Ok(())
    }

    /// Reads metadata at `name`. Corrupt metadata is deleted and treated as absent.
    pub async fn read(&self, name: &str) -> Result<Option<SwarmFile>> {
        let path = self.metadata_path(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<SwarmFile>(&bytes) {
            Ok(file) => Ok(Some(file)),
            Err(e) => {
                tracing::warn!(
                    name,
                    error = %e,
                    "Corrupt swarm file metadata, deleting"
                );
                tokio::fs::remove_file(&path).await?;
                Ok(None)
            }
        }
    }

    pub async fn delete_metadata(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.metadata_path(name)?).await
    }

    /// Deletes metadata and content of `file`. Nested logical names below it
    /// are left alone.
    pub async fn delete(&self, file: &SwarmFile) -> Result<()> {
        self.delete_metadata(&file.logical_name).await?;
        remove_if_exists(&self.content_path(file)?).await?;
        tracing::info!(name = %file.logical_name, "Deleted swarm file");
        Ok(())
    }

    /// Enumerates entries below `path` (`""` for the root).
    ///
    /// Recursive mode returns every file at any depth. Non-recursive mode looks
    /// at immediate subdirectories only and reports those without metadata as
    /// [`ListEntry::Directory`].
    pub async fn list(&self, path: &str, recursive: bool) -> Result<Vec<ListEntry>> {
        let base = if path.is_empty() {
            self.root.clone()
        } else {
            self.dir_for(path)?
        };
        if !tokio::fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }

        let root = self.root.clone();
        let names = tokio::task::spawn_blocking(move || scan(&root, &base, recursive)).await??;

        let mut result = Vec::with_capacity(names.len());
        for (name, has_metadata) in names {
            if !has_metadata {
                result.push(ListEntry::Directory(name));
            } else if let Some(file) = self.read(&name).await? {
                result.push(ListEntry::File(file));
            }
        }
        Ok(result)
    }

    /// Every swarm file held by this node.
    pub async fn files(&self) -> Result<Vec<SwarmFile>> {
        Ok(self
            .list("", true)
            .await?
            .into_iter()
            .filter_map(|e| match e {
                ListEntry::File(f) => Some(f),
                ListEntry::Directory(_) => None,
            })
            .collect())
    }

    /// Copies a local file into the store under `name`.
    ///
    /// Returns `None` if the stored content already has the same hash.
    pub async fn ingest(&self, source: &Path, name: &str) -> Result<Option<SwarmFile>> {
        let _lock = self.lock(name).await;

        let source_hash = hash_file(source, self.hash_limit, None)
            .await
            .with_context(|| format!("reading {}", source.display()))?;

        if let Some(existing) = self.read(name).await? {
            if existing.hash.as_deref() == Some(source_hash.as_str()) {
                tracing::info!(name, source = %source.display(), "Skipping ingest, content unchanged");
                return Ok(None);
            }
            tracing::warn!(name, "Replacing swarm file with different content");
            self.delete_metadata(name).await?;
        }

        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .context("source path has no file name")?;

        let started = std::time::Instant::now();
        let file = self.create(name, file_name).await?;
        tokio::fs::copy(source, self.content_path(&file)?).await?;
        let file = self.set_hash(&file, None).await?;
        self.write(&file).await?;

        tracing::info!(
            name,
            hash = file.hash.as_deref().unwrap_or_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingested swarm file"
        );
        Ok(Some(file))
    }
}

/// Returns `(logical name, has metadata)` pairs below `base`.
fn scan(root: &Path, base: &Path, recursive: bool) -> Result<Vec<(String, bool)>> {
    let mut names = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(base).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name() == METADATA_FILE {
                if let Some(dir) = entry.path().parent() {
                    names.push((logical_name(root, dir)?, true));
                }
            }
        }
        return Ok(names);
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(base)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();

    for dir in dirs {
        let has_metadata = dir.join(METADATA_FILE).is_file();
        names.push((logical_name(root, &dir)?, has_metadata));
    }
    Ok(names)
}

fn logical_name(root: &Path, dir: &Path) -> Result<String> {
    let relative = dir.strip_prefix(root)?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

pub(crate) fn check_file_name(file_name: &str) -> Result<()> {
    let mut components = Path::new(file_name).components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && file_name != METADATA_FILE;
    if !valid {
        bail!("Invalid content file name: {:?}", file_name);
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
