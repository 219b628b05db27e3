//! Secrets handlers. Writes go through the primary, which persists the new
//! revision and pushes it to every non-ephemeral peer.

use anyhow::Result;

use super::types::{SecretsUpdate, SwarmSecrets};
use crate::error::SwarmError;
use crate::rpc::protocol::{SwarmRequest, UpdateSecretsRequest};
use crate::swarm::Swarm;

impl Swarm {
    pub async fn secrets(&self) -> SwarmSecrets {
        self.secrets.lock().await.clone()
    }

    pub async fn handle_set_secret(&self, key: &str, value: &str) -> Result<()> {
        if !self.directory.is_primary() {
            let primary = self.directory.primary_node().ok_or(SwarmError::NoPrimary)?;
            return self.client_for(&primary).set_secret(key, value).await;
        }
        let updated = {
            let mut secrets = self.secrets.lock().await;
            *secrets = secrets.set(key, value);
            secrets.clone()
        };
        tracing::info!(key, revision = updated.revision, "Secret set");
        self.publish_secrets(&updated).await
    }

    pub async fn handle_remove_secret(&self, key: &str) -> Result<()> {
        if !self.directory.is_primary() {
            let primary = self.directory.primary_node().ok_or(SwarmError::NoPrimary)?;
            return self.client_for(&primary).remove_secret(key).await;
        }
        let updated = {
            let mut secrets = self.secrets.lock().await;
            *secrets = secrets.remove(key);
            secrets.clone()
        };
        tracing::info!(key, revision = updated.revision, "Secret removed");
        self.publish_secrets(&updated).await
    }

    pub async fn handle_list_secrets(&self) -> Vec<String> {
        self.secrets.lock().await.keys()
    }

    /// Stale blobs are logged and ignored; the call itself still succeeds.
    pub async fn handle_update_secrets(&self, encoded: &str) -> Result<()> {
        self.apply_encoded_secrets(encoded).await?;
        Ok(())
    }

    /// Applies the higher-revision rule to an incoming blob and persists it
    /// if adopted.
    pub async fn apply_encoded_secrets(&self, encoded: &str) -> Result<SecretsUpdate> {
        let incoming = self.secrets_store.decode(encoded)?;
        self.apply_secrets(incoming).await
    }

    pub async fn apply_secrets(&self, incoming: SwarmSecrets) -> Result<SecretsUpdate> {
        let mut current = self.secrets.lock().await;

        if incoming.revision == current.revision {
            return Ok(SecretsUpdate::Unchanged);
        }
        if incoming.revision < current.revision {
            let e = SwarmError::StaleSecrets {
                incoming: incoming.revision,
                current: current.revision,
            };
            tracing::warn!(error = %e, "Rejected secrets update");
            return Ok(SecretsUpdate::Rejected);
        }

        self.secrets_store.save(&incoming).await?;
        tracing::info!(
            from = current.revision,
            to = incoming.revision,
            "Adopted secrets revision"
        );
        *current = incoming;
        Ok(SecretsUpdate::Adopted)
    }

    async fn publish_secrets(&self, secrets: &SwarmSecrets) -> Result<()> {
        self.secrets_store.save(secrets).await?;
        let encoded = self.secrets_store.encode(secrets)?;
        let targets = self.broadcast_targets(&[]);
        self.send_each(
            &targets,
            SwarmRequest::UpdateSecrets(UpdateSecretsRequest { secrets: encoded }),
        )
        .await;
        Ok(())
    }
}
