// src/retention/mod.rs
//! Retention store: in-memory index of retrieved files under one directory.
//!
//! The index is the only shared mutable state in the service. A single mutex
//! guards it; file I/O happens outside the lock because each artifact id maps
//! to its own file. On removal the index entry goes first and the file second,
//! so `get` never hands out an entry whose file the store already unlinked.

pub mod sweeper;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

pub const ARTIFACT_EXT: &str = "mp4";
pub const PART_EXT: &str = "part";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: Option<u64>,
}

impl Artifact {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Id plus the paths reserved for it, handed out before any network I/O.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub id: ArtifactId,
    pub final_path: PathBuf,
    pub part_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("artifact {0} not found")]
    NotFound(ArtifactId),
    #[error("artifact {0} already stored")]
    DuplicateId(ArtifactId),
    #[error("retention i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RetentionError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<ArtifactId, Artifact>,
    last_created: Option<DateTime<Utc>>,
}

/// Outcome of the startup directory scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub adopted: usize,
    pub partials_removed: usize,
    pub unmanaged: usize,
}

#[derive(Debug)]
pub struct RetentionStore {
    dir: PathBuf,
    inner: Mutex<Index>,
}

impl RetentionStore {
    /// Empty store over `dir`; the directory is created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RetentionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| RetentionError::io(&dir, e))?;
        Ok(Self {
            dir,
            inner: Mutex::new(Index::default()),
        })
    }

    /// Open `dir` and rebuild the index from what is already there.
    ///
    /// `<uuid>.mp4` files are adopted with their mtime as `created_at`,
    /// leftover `.part` files are deleted, anything else is left alone.
    pub fn open(dir: impl Into<PathBuf>) -> Result<(Self, RebuildReport), RetentionError> {
        let store = Self::new(dir)?;
        let report = store.rebuild()?;
        Ok((store, report))
    }

    fn rebuild(&self) -> Result<RebuildReport, RetentionError> {
        let mut report = RebuildReport::default();
        let mut found = Vec::new();

        let entries = fs::read_dir(&self.dir).map_err(|e| RetentionError::io(&self.dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }

            let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
            if ext == PART_EXT {
                match fs::remove_file(&path) {
                    Ok(()) => report.partials_removed += 1,
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove partial file"),
                }
                continue;
            }

            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ArtifactId>().ok());
            match id {
                Some(id) if ext == ARTIFACT_EXT => {
                    let created_at = meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    found.push(Artifact {
                        id,
                        file_path: path,
                        created_at,
                        size_bytes: Some(meta.len()),
                    });
                }
                _ => {
                    tracing::info!(path = %path.display(), "leaving unmanaged file in retention dir");
                    report.unmanaged += 1;
                }
            }
        }

        found.sort_by_key(|a| a.created_at);
        report.adopted = found.len();
        for artifact in found {
            self.put(artifact)?;
        }
        Ok(report)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn allocate(&self) -> Allocation {
        let id = ArtifactId::new();
        let final_path = self.dir.join(format!("{id}.{ARTIFACT_EXT}"));
        let part_path = self.dir.join(format!("{id}.{ARTIFACT_EXT}.{PART_EXT}"));
        Allocation {
            id,
            final_path,
            part_path,
        }
    }

    /// Register an artifact whose file is already on disk.
    ///
    /// `created_at` is clamped so it never goes backwards relative to earlier
    /// insertions; the stored value is returned.
    pub fn put(&self, mut artifact: Artifact) -> Result<Artifact, RetentionError> {
        let mut idx = self.inner.lock().expect("retention index mutex poisoned");
        if idx.entries.contains_key(&artifact.id) {
            return Err(RetentionError::DuplicateId(artifact.id));
        }
        if let Some(last) = idx.last_created {
            if artifact.created_at < last {
                artifact.created_at = last;
            }
        }
        idx.last_created = Some(artifact.created_at);
        idx.entries.insert(artifact.id, artifact.clone());
        gauge!("retention_artifacts").set(idx.entries.len() as f64);
        Ok(artifact)
    }

    pub fn get(&self, id: &ArtifactId) -> Result<Artifact, RetentionError> {
        let idx = self.inner.lock().expect("retention index mutex poisoned");
        idx.entries
            .get(id)
            .cloned()
            .ok_or(RetentionError::NotFound(*id))
    }

    /// Drop the entry, then unlink its file. `Ok(false)` if it was not present.
    pub fn remove(&self, id: &ArtifactId) -> Result<bool, RetentionError> {
        let removed = {
            let mut idx = self.inner.lock().expect("retention index mutex poisoned");
            let removed = idx.entries.remove(id);
            gauge!("retention_artifacts").set(idx.entries.len() as f64);
            removed
        };

        let Some(artifact) = removed else {
            return Ok(false);
        };

        match fs::remove_file(&artifact.file_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(artifact_id = %id, path = %artifact.file_path.display(), "artifact file already gone");
                Ok(true)
            }
            Err(e) => Err(RetentionError::io(&artifact.file_path, e)),
        }
    }

    /// Snapshot of all artifacts, oldest first.
    pub fn list_all(&self) -> Vec<Artifact> {
        let mut out: Vec<Artifact> = {
            let idx = self.inner.lock().expect("retention index mutex poisoned");
            idx.entries.values().cloned().collect()
        };
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("retention index mutex poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
