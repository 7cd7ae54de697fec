//! Ephemeral artifact store.
//!
//! Generated assets live here for a bounded retention window. The index
//! (`DashMap`) decides visibility; payload bytes live in a [`BlobStorage`]
//! backend. An artifact becomes visible only after its payload is fully
//! written, and whoever removes the index entry first (an explicit delete or
//! the reclamation sweep) owns the single physical deletion of its payload.

use crate::clock::Clock;
use crate::types::{OrchestratorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque 128-bit artifact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
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
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}

/// A readable artifact. The payload is immutable and shared, never copied.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: ArtifactId,
    pub payload: Bytes,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    Available { remaining: Duration },
    Expired,
    NotFound,
}

#[derive(Debug, Clone)]
struct ArtifactMeta {
    content_type: String,
    created_at: DateTime<Utc>,
    size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub retried: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub retention_secs: u64,
    pub max_artifacts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: 600,
            max_artifacts: 1024,
        }
    }
}

/// Where payload bytes physically live.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn write(&self, id: &ArtifactId, payload: Bytes) -> Result<()>;

    /// `Ok(None)` when the payload is gone.
    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>>;

    /// Removing an absent payload succeeds.
    async fn remove(&self, id: &ArtifactId) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: DashMap<ArtifactId, Bytes>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobs {
    async fn write(&self, id: &ArtifactId, payload: Bytes) -> Result<()> {
        self.blobs.insert(*id, payload);
        Ok(())
    }

    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>> {
        Ok(self.blobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, id: &ArtifactId) -> Result<()> {
        self.blobs.remove(id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Spools payloads to a directory. Writes go to a temp file and are renamed
/// into place, so a reader sees either the whole payload or nothing.
pub struct DirectoryBlobs {
    root: PathBuf,
}

impl DirectoryBlobs {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        // The index is not persisted, so anything a previous process left
        // behind can never be served or swept.
        let purged = Self::purge_stale(&root).await?;
        if purged > 0 {
            warn!("Removed {} stale artifact files from {}", purged, root.display());
        }

        info!("Spooling artifacts to {}", root.display());
        Ok(Self { root })
    }

    async fn purge_stale(root: &Path) -> Result<usize> {
        let mut purged = 0;
        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_spool_file(name) || !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => purged += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(purged)
    }

    fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(format!("{}.bin", id))
    }

    fn temp_path_for(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(format!(".{}.tmp", id))
    }
}

/// `<id>.bin` payloads and `.<id>.tmp` partial writes. Other files are left alone.
fn is_spool_file(name: &str) -> bool {
    let stem = name
        .strip_suffix(".bin")
        .or_else(|| name.strip_prefix('.').and_then(|n| n.strip_suffix(".tmp")));
    stem.map_or(false, |stem| stem.parse::<ArtifactId>().is_ok())
}

#[async_trait]
impl BlobStorage for DirectoryBlobs {
    async fn write(&self, id: &ArtifactId, payload: Bytes) -> Result<()> {
        let temp = self.temp_path_for(id);
        tokio::fs::write(&temp, &payload).await?;
        if let Err(e) = tokio::fs::rename(&temp, self.path_for(id)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &ArtifactId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "directory"
    }
}

pub struct ArtifactStore {
    index: DashMap<ArtifactId, ArtifactMeta>,
    blobs: Arc<dyn BlobStorage>,
    // Payloads whose index entry is gone but whose physical removal failed.
    pending_removals: DashSet<ArtifactId>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    max_artifacts: usize,
    occupied: AtomicUsize,
    closed: AtomicBool,
    reclaimer_claimed: AtomicBool,
}

impl ArtifactStore {
    pub fn new(config: StoreConfig, blobs: Arc<dyn BlobStorage>, clock: Arc<dyn Clock>) -> Self {
        info!(
            "Artifact store ready ({} backend, retention {}s, capacity {})",
            blobs.backend_name(),
            config.retention_secs,
            config.max_artifacts
        );

        Self {
            index: DashMap::new(),
            blobs,
            pending_removals: DashSet::new(),
            clock,
            retention: Duration::seconds(config.retention_secs as i64),
            max_artifacts: config.max_artifacts,
            occupied: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            reclaimer_claimed: AtomicBool::new(false),
        }
    }

    pub fn in_memory(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config, Arc::new(MemoryBlobs::new()), clock)
    }

    pub async fn put(&self, payload: impl Into<Bytes>, content_type: &str) -> Result<ArtifactId> {
        if self.closed.load(Ordering::Acquire) {
            return Err(OrchestratorError::StoreUnavailable("store is shut down".to_string()));
        }
        self.reserve_slot()?;

        // Write the payload before the index entry exists
        let id = ArtifactId::new();
        let payload = payload.into();
        let size = payload.len();

        if let Err(e) = self.blobs.write(&id, payload).await {
            self.release_slot();
            if let Err(cleanup) = self.blobs.remove(&id).await {
                debug!("Cleanup after failed write of {} also failed: {}", id, cleanup);
            }
            warn!("Failed to persist artifact {}: {}", id, e);
            return Err(OrchestratorError::StoreUnavailable(e.to_string()));
        }

        // The retention window starts when the artifact becomes visible.
        let created_at = self.clock.now();
        self.index.insert(
            id,
            ArtifactMeta {
                content_type: content_type.to_string(),
                created_at,
                size,
            },
        );

        debug!("Stored artifact {} ({} bytes, {})", id, size, content_type);
        Ok(id)
    }

    pub async fn get(&self, id: &ArtifactId) -> Result<Artifact> {
        let meta = self
            .index
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(OrchestratorError::ArtifactNotFound { id: *id })?;

        // Expiry is checked here too, so reads never depend on sweep timing
        if self.is_expired_at(&meta, self.clock.now()) {
            return Err(OrchestratorError::ArtifactExpired { id: *id });
        }

        match self.blobs.read(id).await {
            Ok(Some(payload)) => Ok(Artifact {
                id: *id,
                payload,
                content_type: meta.content_type,
                created_at: meta.created_at,
            }),
            // Lost a race with delete or reclamation.
            Ok(None) => Err(OrchestratorError::ArtifactNotFound { id: *id }),
            Err(e) => {
                warn!("Failed to read artifact {}: {}", id, e);
                Err(OrchestratorError::ArtifactNotFound { id: *id })
            }
        }
    }

    pub fn status(&self, id: &ArtifactId) -> ArtifactStatus {
        let Some(created_at) = self.index.get(id).map(|entry| entry.value().created_at) else {
            return ArtifactStatus::NotFound;
        };

        let age = self.clock.now().signed_duration_since(created_at);
        if age >= self.retention {
            ArtifactStatus::Expired
        } else {
            ArtifactStatus::Available {
                remaining: self.retention - age,
            }
        }
    }

    /// Idempotent. Returns whether this call removed the artifact.
    pub async fn delete(&self, id: &ArtifactId) -> bool {
        match self.index.remove(id) {
            Some(_) => {
                self.release_slot();
                self.remove_payload(id).await;
                debug!("Deleted artifact {}", id);
                true
            }
            None => false,
        }
    }

    /// Removes every artifact whose age at the start of this sweep has
    /// reached the retention window, and retries failed physical deletions.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        // Retry payloads left behind by earlier failures
        let pending: Vec<ArtifactId> = self.pending_removals.iter().map(|id| *id).collect();
        for id in pending {
            match self.blobs.remove(&id).await {
                Ok(()) => {
                    self.pending_removals.remove(&id);
                    report.retried += 1;
                }
                Err(e) => {
                    warn!("Retry of payload removal for {} failed: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        // Collect first; removing while iterating would deadlock the shard
        let candidates: Vec<ArtifactId> = self
            .index
            .iter()
            .filter(|entry| self.is_expired_at(entry.value(), now))
            .map(|entry| *entry.key())
            .collect();

        for id in candidates {
            // Re-checked under the shard lock; a concurrent delete may own it already.
            let removed = self
                .index
                .remove_if(&id, |_, meta| self.is_expired_at(meta, now))
                .is_some();
            if !removed {
                continue;
            }

            self.release_slot();
            if self.remove_payload(&id).await {
                report.reclaimed += 1;
            } else {
                report.failed += 1;
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn bytes_held(&self) -> usize {
        self.index.iter().map(|entry| entry.value().size).sum()
    }

    pub fn pending_removals(&self) -> usize {
        self.pending_removals.len()
    }

    /// Rejects further writes. Existing artifacts stay readable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Only one reclamation task may ever own a store.
    pub(crate) fn claim_reclaimer(&self) -> bool {
        self.reclaimer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_expired_at(&self, meta: &ArtifactMeta, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(meta.created_at) >= self.retention
    }

    fn reserve_slot(&self) -> Result<()> {
        let previous = self.occupied.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_artifacts {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
            return Err(OrchestratorError::StoreUnavailable(format!(
                "capacity of {} artifacts reached",
                self.max_artifacts
            )));
        }
        Ok(())
    }

    fn release_slot(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    async fn remove_payload(&self, id: &ArtifactId) -> bool {
        match self.blobs.remove(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Payload removal for {} failed, will retry next sweep: {}", id, e);
                self.pending_removals.insert(*id);
                false
            }
        }
    }
}
