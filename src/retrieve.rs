// src/retrieve.rs
//! Retrieval pipeline: stream a resolved media URL into the retention dir.
//!
//! The artifact id and its paths are allocated before the request goes out.
//! Bytes land in `<id>.mp4.part`, guarded by [`PartialFile`]; only a complete
//! transfer is renamed to `<id>.mp4` and registered in the store. Any early
//! exit (HTTP error, stream fault, timeout, or the caller dropping the
//! future) removes the partial file.

use chrono::Utc;
use futures::StreamExt;
use metrics::{counter, histogram};
use reqwest::Client;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::resolve::types::MediaDescriptor;
use crate::retention::{Artifact, ArtifactId, RetentionError, RetentionStore};

pub const DEFAULT_MAX_TRANSFER: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("media host returned HTTP {0}")]
    Status(u16),
    #[error("transfer failed: {0}")]
    Network(String),
    #[error("transfer did not finish within {0:?}")]
    Timeout(Duration),
    #[error("media exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("media host returned an empty body")]
    EmptyBody,
    #[error("local write failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] RetentionError),
}

impl RetrievalError {
    /// Remote side misbehaved, as opposed to a local disk/store problem.
    pub fn is_upstream(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Store(_))
    }
}

/// Deletes the file on drop unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed partial download"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot remove partial download")
            }
        }
    }
}

/// Best-effort removal of a finished file the store refused to index.
async fn discard_unregistered(id: &ArtifactId, path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(artifact_id = %id, path = %path.display(), error = %e, "cannot remove unregistered artifact");
            false
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    client: Client,
    store: Arc<RetentionStore>,
    max_transfer: Duration,
    max_bytes: u64,
}

impl Retriever {
    pub fn new(client: Client, store: Arc<RetentionStore>) -> Self {
        Self {
            client,
            store,
            max_transfer: DEFAULT_MAX_TRANSFER,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_transfer(mut self, max_transfer: Duration) -> Self {
        self.max_transfer = max_transfer;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn store(&self) -> &Arc<RetentionStore> {
        &self.store
    }

    pub async fn retrieve(&self, descriptor: &MediaDescriptor) -> Result<Artifact, RetrievalError> {
        let alloc = self.store.allocate();
        let guard = PartialFile::new(alloc.part_path.clone());
        let t0 = Instant::now();

        let transfer = tokio::time::timeout(
            self.max_transfer,
            self.stream_to(&descriptor.playable_url, &alloc.part_path),
        )
        .await
        .unwrap_or(Err(RetrievalError::Timeout(self.max_transfer)));

        let written = match transfer {
            Ok(n) => n,
            Err(e) => {
                counter!("retrieval_failures_total").increment(1);
                tracing::warn!(
                    artifact_id = %alloc.id,
                    provider = descriptor.source_provider,
                    error = %e,
                    "retrieval failed"
                );
                return Err(e);
            }
        };

        tokio::fs::rename(&alloc.part_path, &alloc.final_path).await?;
        guard.disarm();

        let artifact = Artifact {
            id: alloc.id,
            file_path: alloc.final_path.clone(),
            created_at: Utc::now(),
            size_bytes: Some(written),
        };
        let stored = match self.store.put(artifact) {
            Ok(a) => a,
            Err(e) => {
                discard_unregistered(&alloc.id, &alloc.final_path).await;
                return Err(e.into());
            }
        };

        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("retrieval_ms").record(elapsed_ms);
        counter!("retrieval_bytes_total").increment(written);
        tracing::info!(
            artifact_id = %stored.id,
            provider = descriptor.source_provider,
            bytes = written,
            elapsed_ms,
            "artifact stored"
        );
        Ok(stored)
    }

    async fn stream_to(&self, url: &str, path: &Path) -> Result<u64, RetrievalError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrievalError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Status(status.as_u16()));
        }
        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(RetrievalError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut file = File::create(path).await?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RetrievalError::Network(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(RetrievalError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written == 0 {
            return Err(RetrievalError::EmptyBody);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_guard_removes_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("a.part");
        let kept = dir.path().join("b.part");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(PartialFile::new(dropped.clone()));
        PartialFile::new(kept.clone()).disarm();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn unregistered_file_is_discarded_and_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orphan.mp4");
        std::fs::write(&path, b"x").unwrap();
        let id = ArtifactId::new();

        assert!(discard_unregistered(&id, &path).await);
        assert!(!path.exists());
        assert!(!discard_unregistered(&id, &path).await);
    }

    #[tokio::test]
    async fn unreachable_host_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RetentionStore::new(dir.path()).unwrap());
        let retriever = Retriever::new(Client::new(), store.clone());
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let d = MediaDescriptor::new("t", format!("http://127.0.0.1:{port}/v.mp4"), None, None)
            .unwrap();

        let err = retriever.retrieve(&d).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Network(_)));
        assert!(store.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
