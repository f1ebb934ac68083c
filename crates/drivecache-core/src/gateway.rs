//! Remote object gateway.
//!
//! [`DriveGateway`] layers the higher-level operations the rest of the crate
//! needs on top of a [`RemoteStore`]:
//! - exhaustive paginated listing
//! - download with export/binary selection and progress reporting
//! - upload that overwrites by name or creates
//! - best-effort bulk deletion with client-side verification
//!
//! All operations are sequential. Namespace operations that check and then act
//! (upload-by-name, list-then-delete) are not atomic: two processes uploading the
//! same name into the same folder at the same time can both create a file.

use crate::config::{DriveConfig, NetworkConfig};
use crate::error::{DriveCacheError, Result};
use crate::remote::{DriveStore, PageCursor, Query, RemoteFile, RemoteStore};
use futures::StreamExt;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Progress of a single download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// Declared size, if the store reported one.
    pub total_bytes: Option<u64>,
    /// 0-100.
    pub percent: u8,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = match total_bytes {
            Some(0) => 100,
            Some(total) => ((bytes_downloaded.min(total) * 100) / total) as u8,
            None => 0,
        };
        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }

    fn complete(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
            percent: 100,
        }
    }
}

/// Callback invoked as a download advances.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync + 'static>;

/// Client-side filter applied to listing results before deletion.
pub type FilePredicate = Arc<dyn Fn(&RemoteFile) -> bool + Send + Sync + 'static>;

/// How [`DriveGateway::upload`] treats an existing file with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Replace the content of the existing file, keeping its id.
    #[default]
    OverwriteByName,
    /// Always create a new file, even if that produces a duplicate name.
    AlwaysCreate,
}

/// Files directly inside one container, narrowed by name clauses and an
/// optional client-side predicate.
///
/// The container is mandatory: every query carries `'<container>' in parents`
/// and `trashed = false`. Name clauses are re-checked locally before anything
/// is deleted, since the remote side may match more broadly (e.g. `startswith`
/// is sent as `contains`).
#[derive(Clone)]
pub struct DeletionQuery {
    container_id: String,
    filter: Query,
    predicate: Option<FilePredicate>,
}

impl std::fmt::Debug for DeletionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQuery")
            .field("container_id", &self.container_id)
            .field("filter", &self.filter.to_string())
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl DeletionQuery {
    /// Non-trashed files in `container_id` that also satisfy `names`.
    pub fn new(container_id: impl Into<String>, names: Query) -> Self {
        let container_id = container_id.into();
        let filter = names
            .clauses()
            .iter()
            .cloned()
            .fold(Query::children_of(container_id.clone()), Query::with);
        Self {
            container_id,
            filter,
            predicate: None,
        }
    }

    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&RemoteFile) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Files directly inside `container_id` whose name truly starts with `prefix`.
    pub fn prefix(prefix: &str, container_id: &str) -> Self {
        let expected = prefix.to_string();
        Self::new(container_id, Query::new().name_contains(prefix))
            .with_predicate(move |file| file.name.starts_with(&expected))
    }

    /// Everything directly inside `container_id`.
    pub fn container(container_id: &str) -> Self {
        Self::new(container_id, Query::new())
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn filter(&self) -> &Query {
        &self.filter
    }

    /// Whether a listed file should actually be deleted.
    pub fn accepts(&self, file: &RemoteFile) -> bool {
        self.filter.matches_name(&file.name)
            && self.predicate.as_ref().map_or(true, |p| p(file))
    }
}

/// Gateway over a remote object store.
pub struct DriveGateway {
    store: Arc<dyn RemoteStore>,
    default_folder_id: Option<String>,
    page_size: Option<u32>,
    span: Span,
}

impl std::fmt::Debug for DriveGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveGateway")
            .field("default_folder_id", &self.default_folder_id)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl DriveGateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            default_folder_id: None,
            page_size: None,
            span: info_span!("drive_gateway"),
        }
    }

    /// Build a gateway over the Drive HTTP backend.
    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        let store = DriveStore::new(config)?;
        let mut gateway = Self::new(Arc::new(store)).with_page_size(config.page_size);
        gateway.default_folder_id = config.default_folder_id.clone();
        Ok(gateway)
    }

    pub fn with_default_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.default_folder_id = Some(folder_id.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Span all gateway logging is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn default_folder_id(&self) -> Option<&str> {
        self.default_folder_id.as_deref()
    }

    /// Whether a non-trashed file named exactly `name` exists in `container_id`.
    pub async fn exists_by_name(&self, name: &str, container_id: &str) -> Result<bool> {
        let query = Query::exact(name, container_id);
        async {
            let page = self.store.search(&query, None, Some(1)).await?;
            Ok(!page.files.is_empty())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Every file matching `filter`, across all pages.
    ///
    /// Keeps requesting pages until the store returns no cursor. Ids already seen
    /// are skipped so a store that shifts pages between calls cannot duplicate
    /// entries.
    pub async fn list_all(&self, filter: &Query) -> Result<Vec<RemoteFile>> {
        async {
            let mut files = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            let mut cursor: Option<PageCursor> = None;
            let mut pages = 0usize;

            loop {
                let page = self
                    .store
                    .search(filter, cursor.as_ref(), self.page_size)
                    .await?;
                pages += 1;

                for file in page.files {
                    if seen.insert(file.id.clone()) {
                        files.push(file);
                    } else {
                        debug!("Skipping {} already returned by an earlier page", file.id);
                    }
                }

                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }

            debug!("Listed {} files over {} pages for [{}]", files.len(), pages, filter);
            Ok(files)
        }
        .instrument(self.span.clone())
        .await
    }

    /// First page of files in a container, capped at `limit`.
    ///
    /// Falls back to the default folder; with neither, lists across the drive.
    pub async fn list_files(&self, container_id: Option<&str>, limit: u32) -> Result<Vec<RemoteFile>> {
        let mut query = Query::new().not_trashed();
        if let Some(target) = container_id.or(self.default_folder_id.as_deref()) {
            query = query.in_parents(target);
        }
        async {
            let page = self.store.search(&query, None, Some(limit.max(1))).await?;
            Ok(page.files)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Download a file to `destination`, returning the number of bytes written.
    ///
    /// Native editor documents are exported to XLSX; everything else is fetched
    /// as raw content. The destination is written in place: an interrupted
    /// transfer leaves a truncated file behind.
    pub async fn download(
        &self,
        remote_id: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        async {
            let metadata = self.store.metadata(remote_id).await?;
            info!("Detected MIME type {} for {}", metadata.mime_type, metadata.name);

            let content = if metadata.is_native_document() {
                info!("Exporting editor document to {}", NetworkConfig::EXPORT_MIME_TYPE);
                self.store
                    .export(remote_id, NetworkConfig::EXPORT_MIME_TYPE)
                    .await?
            } else {
                info!("Downloading binary content");
                self.store.media(remote_id).await?
            };

            let total_bytes = content.total_bytes;
            let mut file = tokio::fs::File::create(destination)
                .await
                .map_err(|e| DriveCacheError::io_with_path(e, destination))?;
            let mut stream = content.stream;
            let mut downloaded: u64 = 0;
            let mut last_reported: Option<u8> = None;

            if let Some(ref report) = progress {
                report(DownloadProgress::new(0, total_bytes));
                last_reported = Some(0);
            }

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| DriveCacheError::io_with_path(e, destination))?;
                downloaded += chunk.len() as u64;

                if let Some(ref report) = progress {
                    let update = DownloadProgress::new(downloaded, total_bytes);
                    let advanced = last_reported.map_or(true, |last| {
                        update.percent >= last.saturating_add(NetworkConfig::DOWNLOAD_PROGRESS_STEP)
                    });
                    if total_bytes.is_some() && advanced && update.percent < 100 {
                        report(update);
                        last_reported = Some(update.percent);
                    }
                }
            }

            file.flush()
                .await
                .map_err(|e| DriveCacheError::io_with_path(e, destination))?;

            if let Some(ref report) = progress {
                report(DownloadProgress::complete(downloaded, total_bytes));
            }

            info!("Saved {} bytes to {}", downloaded, destination.display());
            Ok(downloaded)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Upload `local_path` into `container_id`, replacing a same-named file if one
    /// exists. Returns the remote id, which is unchanged on overwrite.
    pub async fn upload_overwrite_or_create(
        &self,
        local_path: &Path,
        container_id: &str,
    ) -> Result<String> {
        self.upload(local_path, container_id, UploadMode::OverwriteByName)
            .await
    }

    pub async fn upload(
        &self,
        local_path: &Path,
        container_id: &str,
        mode: UploadMode,
    ) -> Result<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DriveCacheError::Validation {
                field: "local_path".into(),
                message: format!("{} has no usable file name", local_path.display()),
            })?
            .to_string();

        async {
            let content = tokio::fs::read(local_path)
                .await
                .map_err(|e| DriveCacheError::io_with_path(e, local_path))?;

            if mode == UploadMode::OverwriteByName {
                let page = self
                    .store
                    .search(&Query::exact(&name, container_id), None, Some(1))
                    .await?;
                if let Some(existing) = page.files.into_iter().next() {
                    info!("Overwriting existing file {} ({})", name, existing.id);
                    return self.store.update(&existing.id, content.into()).await;
                }
            }

            info!("Uploading as a new file: {}", name);
            self.store.create(&name, container_id, content.into()).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// List everything matching the query's remote filter, keep what the query
    /// accepts, and delete the survivors one at a time.
    ///
    /// A failed delete is logged and skipped. The returned ids are exactly those
    /// confirmed deleted. A query without a container id is rejected before any
    /// remote call.
    pub async fn delete_by_query(&self, query: &DeletionQuery) -> Result<Vec<String>> {
        if query.container_id().trim().is_empty() {
            return Err(DriveCacheError::Validation {
                field: "container_id".into(),
                message: "bulk deletion requires a container".into(),
            });
        }
        let candidates = self.list_all(query.filter()).await?;

        async {
            let total = candidates.len();
            let targets: Vec<RemoteFile> = candidates
                .into_iter()
                .filter(|file| query.accepts(file))
                .collect();

            if targets.len() < total {
                debug!(
                    "Client-side filter discarded {} of {} listed files",
                    total - targets.len(),
                    total
                );
            }

            let mut deleted = Vec::with_capacity(targets.len());
            for file in targets {
                match self.store.delete(&file.id).await {
                    Ok(()) => {
                        info!("Deleted {} ({})", file.name, file.id);
                        deleted.push(file.id);
                    }
                    Err(e) => {
                        error!("Failed to delete {} ({}): {}", file.name, file.id, e);
                    }
                }
            }

            Ok(deleted)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Delete files in `container_id` whose names start with `prefix`.
    ///
    /// The remote search only supports substring matching, so a file such as
    /// `backup_test_file.csv` is listed for prefix `test_` and then dropped here.
    pub async fn delete_by_prefix(&self, prefix: &str, container_id: &str) -> Result<Vec<String>> {
        if prefix.is_empty() || container_id.is_empty() {
            warn!("Skipping deletion: container id or prefix missing");
            return Ok(Vec::new());
        }
        self.delete_by_query(&DeletionQuery::prefix(prefix, container_id))
            .await
    }

    /// Delete every file named exactly `name` in `container_id`.
    pub async fn delete_by_name(&self, name: &str, container_id: &str) -> Result<bool> {
        let deleted = self
            .delete_by_query(&DeletionQuery::new(
                container_id,
                Query::new().name_equals(name),
            ))
            .await?;
        Ok(!deleted.is_empty())
    }

    /// Delete everything directly inside `container_id`.
    pub async fn clear_container(&self, container_id: &str) -> Result<Vec<String>> {
        if container_id.is_empty() {
            warn!("Skipping clear: container id missing");
            return Ok(Vec::new());
        }
        self.delete_by_query(&DeletionQuery::container(container_id))
            .await
    }
}
