//! Cross-node file transfer.
//!
//! Remote copies are pulled over the peer's static file endpoint. The fetched
//! metadata, not the caller's cached hint, is what lands locally.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWriteExt;

use super::local::{ContentStore, check_file_name};
use super::types::{METADATA_FILE, SwarmFile};
use crate::membership::types::Node;
use crate::rpc::protocol::ENDPOINT_STATIC;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Fetches a remote resource as a byte stream.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ByteStream>;
}

pub struct HttpFetcher {
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ByteStream> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed())
    }
}

/// URL of `file`'s content on `node`.
pub fn content_url(node: &Node, file: &SwarmFile) -> String {
    format!(
        "http://{}{}/files/{}/{}",
        node.connect_addr(),
        ENDPOINT_STATIC,
        file.logical_name,
        file.file_name
    )
}

/// URL of `file`'s metadata on `node`.
pub fn metadata_url(node: &Node, logical_name: &str) -> String {
    format!(
        "http://{}{}/files/{}/{}",
        node.connect_addr(),
        ENDPOINT_STATIC,
        logical_name,
        METADATA_FILE
    )
}

/// Pulls `file` from `from_node` into the local store, under the file's lock.
///
/// Local metadata is removed before new content lands so the metadata never
/// points at missing or partial content.
pub async fn download_to_local(
    store: &ContentStore,
    file: &SwarmFile,
    from_node: &Node,
    fetcher: &dyn FileFetcher,
) -> Result<SwarmFile> {
    let name = file.logical_name.as_str();
    let _lock = store.lock(name).await;

    let url = metadata_url(from_node, name);
    let mut metadata = Vec::new();
    let mut stream = fetcher.fetch(&url).await?;
    while let Some(chunk) = stream.next().await {
        metadata.extend_from_slice(&chunk?);
    }
    let remote: SwarmFile = serde_json::from_slice(&metadata)
        .with_context(|| format!("invalid metadata at {}", url))?;
    if remote.logical_name != name {
        bail!(
            "metadata at {} describes {:?}, expected {:?}",
            url,
            remote.logical_name,
            name
        );
    }
    check_file_name(&remote.file_name).with_context(|| format!("metadata at {}", url))?;

    store.delete_metadata(name).await?;

    let dir = store.dir_for(name)?;
    tokio::fs::create_dir_all(&dir).await?;
    let target = store.content_path(&remote)?;
    let mut out = tokio::fs::File::create(&target).await?;
    let mut bytes = 0u64;
    let mut stream = fetcher.fetch(&content_url(from_node, &remote)).await?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        bytes += chunk.len() as u64;
        out.write_all(&chunk).await?;
    }
    out.flush().await?;

    store.write(&remote).await?;

    tracing::info!(
        name,
        from = %from_node.id,
        bytes,
        "Downloaded swarm file"
    );
    Ok(remote)
}
