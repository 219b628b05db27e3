//! Persistence and wire encoding for [`SwarmSecrets`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use super::types::SwarmSecrets;

/// Loads, saves and (de)serializes the secrets blob. The encoded string is
/// opaque to everything but the store that produced it.
#[async_trait]
pub trait SecretsStore: Send + Sync {
    async fn load(&self) -> Result<SwarmSecrets>;
    async fn save(&self, secrets: &SwarmSecrets) -> Result<()>;
    fn encode(&self, secrets: &SwarmSecrets) -> Result<String>;
    fn decode(&self, encoded: &str) -> Result<SwarmSecrets>;
}

/// JSON file on disk; hex-encoded JSON on the wire.
pub struct FileSecretsStore {
    path: PathBuf,
}

impl FileSecretsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SecretsStore for FileSecretsStore {
    async fn load(&self) -> Result<SwarmSecrets> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("invalid secrets file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No secrets file, starting empty");
                Ok(SwarmSecrets::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, secrets: &SwarmSecrets) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(secrets)?).await?;
        Ok(())
    }

    fn encode(&self, secrets: &SwarmSecrets) -> Result<String> {
        Ok(hex::encode(serde_json::to_vec(secrets)?))
    }

    fn decode(&self, encoded: &str) -> Result<SwarmSecrets> {
        let bytes = hex::decode(encoded).context("secrets blob is not hex")?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
