//! Local artifact cache.
//!
//! [`ArtifactCache::resolve`] decides per call whether the file at a local path
//! can be used as is, must be discarded, or is missing, and fetches it from an
//! [`ArtifactSource`] when needed. Validity is a size heuristic only: a file
//! smaller than the caller's threshold is assumed to be a truncated download.
//! Nothing is persisted besides the file itself.

use crate::config::CacheConfig;
use crate::error::{DriveCacheError, Result};
use crate::gateway::{DownloadProgress, DriveGateway, ProgressCallback};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, info_span, Instrument, Span};

/// Fetches a remote artifact into a local file.
///
/// This is the only remote capability the cache depends on.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch(&self, remote_id: &str, destination: &Path) -> Result<()>;
}

#[async_trait]
impl ArtifactSource for DriveGateway {
    async fn fetch(&self, remote_id: &str, destination: &Path) -> Result<()> {
        let progress: ProgressCallback = Arc::new(|p: DownloadProgress| {
            debug!("Progress: {}% ({} bytes)", p.percent, p.bytes_downloaded);
        });
        self.download(remote_id, destination, Some(progress)).await?;
        Ok(())
    }
}

/// State of a local artifact at the moment it is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Missing,
    PresentValid,
    PresentCorrupt,
}

/// Snapshot of a local artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    /// Exists but is smaller than the validity threshold.
    pub corrupted: bool,
}

impl CacheEntry {
    /// Inspect `path` against `min_valid_size`.
    pub async fn inspect(path: &Path, min_valid_size: u64) -> Result<Self> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let size_bytes = meta.len();
                Ok(Self {
                    path: path.to_path_buf(),
                    exists: true,
                    size_bytes,
                    corrupted: size_bytes < min_valid_size,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self {
                path: path.to_path_buf(),
                exists: false,
                size_bytes: 0,
                corrupted: false,
            }),
            Err(e) => Err(DriveCacheError::io_with_path(e, path)),
        }
    }

    pub fn state(&self) -> CacheState {
        match (self.exists, self.corrupted) {
            (false, _) => CacheState::Missing,
            (true, true) => CacheState::PresentCorrupt,
            (true, false) => CacheState::PresentValid,
        }
    }
}

/// Resolves remote artifacts to usable local files.
///
/// Concurrent `resolve` calls for the same path within one process are
/// serialized; separate processes sharing a path are not coordinated.
pub struct ArtifactCache {
    source: Arc<dyn ArtifactSource>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    span: Span,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache").finish_non_exhaustive()
    }
}

impl ArtifactCache {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            locks: Mutex::new(HashMap::new()),
            span: info_span!("artifact_cache"),
        }
    }

    /// Span all cache logging is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Return a local path holding the artifact `remote_id`.
    ///
    /// - missing: fetch
    /// - present and at least `min_valid_size` bytes: return as is, unless
    ///   `force_refresh`
    /// - present but smaller, or `force_refresh`: delete, then fetch
    ///
    /// Fetch errors are returned unchanged. A failed fetch may leave a partial
    /// file, which the next call will see as corrupt.
    pub async fn resolve(
        &self,
        local_path: impl AsRef<Path>,
        remote_id: &str,
        min_valid_size: u64,
        force_refresh: bool,
    ) -> Result<PathBuf> {
        let path = local_path.as_ref().to_path_buf();
        let lease = self.lease(&path);
        let _guard = lease.lock.lock().await;
        self.resolve_locked(&path, remote_id, min_valid_size, force_refresh)
            .instrument(self.span.clone())
            .await
    }

    /// [`resolve`](Self::resolve) with the default threshold and no forced refresh.
    pub async fn get(&self, local_path: impl AsRef<Path>, remote_id: &str) -> Result<PathBuf> {
        self.resolve(local_path, remote_id, CacheConfig::DEFAULT_MIN_VALID_SIZE, false)
            .await
    }

    async fn resolve_locked(
        &self,
        path: &Path,
        remote_id: &str,
        min_valid_size: u64,
        force_refresh: bool,
    ) -> Result<PathBuf> {
        let entry = CacheEntry::inspect(path, min_valid_size).await?;
        let mut state = entry.state();

        if state == CacheState::PresentCorrupt || (force_refresh && state != CacheState::Missing) {
            let reason = if state == CacheState::PresentCorrupt {
                "file corrupted"
            } else {
                "forced refresh"
            };
            info!(
                "Cache invalidation ({}): removing {} ({} bytes)",
                reason,
                path.display(),
                entry.size_bytes
            );
            remove_if_present(path).await?;
            state = CacheState::Missing;
        }

        if state == CacheState::PresentValid {
            info!("Using cached file at {}", path.display());
            return Ok(path.to_path_buf());
        }

        info!("Resource missing or invalidated, fetching {}", remote_id);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DriveCacheError::io_with_path(e, parent))?;
        }
        self.source.fetch(remote_id, path).await?;

        Ok(path.to_path_buf())
    }

    fn lease(&self, path: &Path) -> PathLease<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(path.to_path_buf()).or_default().clone();
        PathLease {
            cache: self,
            path: path.to_path_buf(),
            lock,
        }
    }
}

/// Claim on a per-path lock. Dropping it, including when the owning `resolve`
/// future is cancelled, removes the map entry once nobody else holds it.
struct PathLease<'a> {
    cache: &'a ArtifactCache,
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for PathLease<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .cache
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Held only by the map and this lease.
        if locks
            .get(&self.path)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2)
        {
            locks.remove(&self.path);
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DriveCacheError::io_with_path(e, path)),
    }
}
