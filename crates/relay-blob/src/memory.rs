//! In-memory blob store for tests and local development.
//!
//! Blobs are streamed back in fixed-size chunks so consumers exercise the
//! same incremental path as a network download. Individual operations can be
//! made to fail, and downloads can be made to hang or to break mid-stream.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::{StreamExt, stream};

use crate::sas::{SAS_VERSION, sign_container_sas};
use crate::traits::{CreateContainer, DownloadBlob, GetDelegationKey, SignContainerToken};
use crate::types::{
    ByteStream, ContainerCreation, ContainerPermissions, DelegationKey, ValidityWindow,
};

pub const MEMORY_ACCOUNT: &str = "memoryaccount";
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug)]
pub struct MemoryBlobError(String);

impl fmt::Display for MemoryBlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryBlobStore error: {}", self.0)
    }
}

impl std::error::Error for MemoryBlobError {}

#[derive(Default)]
struct State {
    blobs: HashMap<(String, String), Bytes>,
    containers: HashSet<String>,
    chunk_size: Option<usize>,
    break_stream_after: Option<usize>,
    hang_downloads: bool,
    fail_download: bool,
    fail_create: bool,
    fail_delegation: bool,
    fail_signing: bool,
    download_calls: usize,
    create_calls: Vec<String>,
    delegation_calls: usize,
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<State>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob; its container is created implicitly.
    pub fn with_blob(self, container: &str, name: &str, content: impl Into<Bytes>) -> Self {
        {
            let mut state = self.inner.lock().unwrap();
            state.containers.insert(container.to_string());
            state
                .blobs
                .insert((container.to_string(), name.to_string()), content.into());
        }
        self
    }

    pub fn with_container(self, name: &str) -> Self {
        self.inner.lock().unwrap().containers.insert(name.to_string());
        self
    }

    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        self.inner.lock().unwrap().chunk_size = Some(chunk_size.max(1));
        self
    }

    /// Downloads yield `chunks` chunks, then an I/O error.
    pub fn break_stream_after(self, chunks: usize) -> Self {
        self.inner.lock().unwrap().break_stream_after = Some(chunks);
        self
    }

    /// Downloads never resolve.
    pub fn hang_downloads(self) -> Self {
        self.inner.lock().unwrap().hang_downloads = true;
        self
    }

    pub fn fail_downloads(self) -> Self {
        self.inner.lock().unwrap().fail_download = true;
        self
    }

    pub fn fail_container_creation(self) -> Self {
        self.inner.lock().unwrap().fail_create = true;
        self
    }

    pub fn fail_delegation_key(self) -> Self {
        self.inner.lock().unwrap().fail_delegation = true;
        self
    }

    pub fn fail_signing(self) -> Self {
        self.inner.lock().unwrap().fail_signing = true;
        self
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.inner.lock().unwrap().containers.contains(name)
    }

    pub fn download_calls(&self) -> usize {
        self.inner.lock().unwrap().download_calls
    }

    /// Names passed to `create_container_if_absent`, in call order.
    pub fn create_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().create_calls.clone()
    }

    pub fn delegation_calls(&self) -> usize {
        self.inner.lock().unwrap().delegation_calls
    }

    /// Total calls of any kind; zero means the store was never touched.
    pub fn total_calls(&self) -> usize {
        let state = self.inner.lock().unwrap();
        state.download_calls + state.create_calls.len() + state.delegation_calls
    }
}

fn chunked(content: Bytes, chunk_size: usize, break_after: Option<usize>) -> ByteStream {
    let mut chunks: Vec<io::Result<Bytes>> = Vec::new();
    let mut offset = 0;
    while offset < content.len() {
        let end = (offset + chunk_size).min(content.len());
        chunks.push(Ok(content.slice(offset..end)));
        offset = end;
    }
    if let Some(n) = break_after {
        chunks.truncate(n);
        chunks.push(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "download interrupted",
        )));
    }
    stream::iter(chunks).boxed()
}

impl DownloadBlob for MemoryBlobStore {
    type Error = MemoryBlobError;

    async fn download_stream(&self, container: &str, blob: &str) -> Result<ByteStream, Self::Error> {
        let (content, chunk_size, break_after, hang) = {
            let mut state = self.inner.lock().unwrap();
            state.download_calls += 1;
            if state.fail_download {
                return Err(MemoryBlobError("download failed".into()));
            }
            let content = state
                .blobs
                .get(&(container.to_string(), blob.to_string()))
                .cloned();
            (
                content,
                state.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
                state.break_stream_after,
                state.hang_downloads,
            )
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let content =
            content.ok_or_else(|| MemoryBlobError(format!("blob not found: {container}/{blob}")))?;
        Ok(chunked(content, chunk_size, break_after))
    }
}

impl CreateContainer for MemoryBlobStore {
    type Error = MemoryBlobError;

    async fn create_container_if_absent(&self, name: &str) -> Result<ContainerCreation, Self::Error> {
        let mut state = self.inner.lock().unwrap();
        state.create_calls.push(name.to_string());
        if state.fail_create {
            return Err(MemoryBlobError("container creation failed".into()));
        }
        if state.containers.insert(name.to_string()) {
            Ok(ContainerCreation::Created)
        } else {
            Ok(ContainerCreation::AlreadyExists)
        }
    }
}

impl GetDelegationKey for MemoryBlobStore {
    type Error = MemoryBlobError;

    async fn user_delegation_key(&self, window: &ValidityWindow) -> Result<DelegationKey, Self::Error> {
        let mut state = self.inner.lock().unwrap();
        state.delegation_calls += 1;
        if state.fail_delegation {
            return Err(MemoryBlobError("delegation key unavailable".into()));
        }
        Ok(DelegationKey {
            signed_oid: "00000000-0000-0000-0000-00000000000a".into(),
            signed_tid: "00000000-0000-0000-0000-00000000000b".into(),
            signed_start: window.start_str(),
            signed_expiry: window.expiry_str(),
            signed_service: "b".into(),
            signed_version: SAS_VERSION.into(),
            value: STANDARD.encode(b"memory-delegation-key"),
        })
    }
}

impl SignContainerToken for MemoryBlobStore {
    type Error = MemoryBlobError;

    fn container_url(&self, container: &str) -> String {
        format!("https://{MEMORY_ACCOUNT}.blob.core.windows.net/{container}")
    }

    fn sign_container_token(
        &self,
        key: &DelegationKey,
        container: &str,
        permissions: ContainerPermissions,
        window: &ValidityWindow,
    ) -> Result<String, Self::Error> {
        if self.inner.lock().unwrap().fail_signing {
            return Err(MemoryBlobError("signing failed".into()));
        }
        sign_container_sas(MEMORY_ACCOUNT, container, key, permissions, window)
            .map_err(|e| MemoryBlobError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn streams_blob_in_chunks() {
        let store = MemoryBlobStore::new()
            .with_blob("c1", "b1", vec![1u8; 100])
            .with_chunk_size(30);

        let chunks: Vec<Bytes> = store
            .download_stream("c1", "b1")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![30, 30, 30, 10]);
        assert_eq!(store.download_calls(), 1);
    }

    #[tokio::test]
    async fn missing_blob_fails() {
        let store = MemoryBlobStore::new();

        assert!(store.download_stream("c1", "nope").await.is_err());
    }

    #[tokio::test]
    async fn broken_stream_ends_with_error() {
        let store = MemoryBlobStore::new()
            .with_blob("c1", "b1", vec![0u8; 100])
            .with_chunk_size(10)
            .break_stream_after(2);

        let mut stream = store.download_stream("c1", "b1").await.unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = MemoryBlobStore::new();

        assert_eq!(
            store.create_container_if_absent("c2").await.unwrap(),
            ContainerCreation::Created
        );
        assert_eq!(
            store.create_container_if_absent("c2").await.unwrap(),
            ContainerCreation::AlreadyExists
        );
        assert_eq!(store.create_calls(), vec!["c2", "c2"]);
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let store = MemoryBlobStore::new()
            .fail_container_creation()
            .fail_delegation_key();
        let window = ValidityWindow::around(
            chrono::Utc::now(),
            chrono::Duration::seconds(10),
            chrono::Duration::hours(48),
        );

        assert!(store.create_container_if_absent("c").await.is_err());
        assert!(store.user_delegation_key(&window).await.is_err());
    }
}
