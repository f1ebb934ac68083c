//! In-process remote store.
//!
//! Behaves like the Drive backend where it matters to callers: ids are opaque,
//! search pages through a cursor, native documents must be exported rather than
//! fetched as media, and trashed objects stay visible to queries that do not
//! filter them out. Individual deletes can be made to fail.

use super::{FilePage, PageCursor, Query, RemoteContent, RemoteFile, RemoteStore};
use crate::error::{DriveCacheError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_CHUNK_SIZE: usize = 64;

/// Number of calls made against a [`MemoryStore`], per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub search: usize,
    pub metadata: usize,
    pub export: usize,
    pub media: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.search
            + self.metadata
            + self.export
            + self.media
            + self.create
            + self.update
            + self.delete
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    file: RemoteFile,
    content: Bytes,
    trashed: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Keyed by id; ids are allocated in increasing order so iteration follows creation.
    objects: BTreeMap<String, StoredObject>,
    next_id: u64,
    failing_deletes: HashSet<String>,
    calls: StoreCalls,
}

impl MemoryState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{:08}", self.next_id)
    }

    fn object(&self, id: &str, operation: &str) -> Result<&StoredObject> {
        self.objects.get(id).ok_or_else(|| not_found(operation, id))
    }
}

/// In-process [`RemoteStore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    page_size: usize,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Server-side page size used when the caller does not ask for one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Size of the chunks content is streamed in.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Seed an object. Returns its id.
    pub fn insert(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        content: impl Into<Bytes>,
    ) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        let object = StoredObject {
            file: RemoteFile {
                id: id.clone(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                parents: vec![parent_id.to_string()],
            },
            content: content.into(),
            trashed: false,
        };
        state.objects.insert(id.clone(), object);
        id
    }

    /// Move an object to the trash. Returns false if it does not exist.
    pub fn trash(&self, id: &str) -> bool {
        match self.lock().objects.get_mut(id) {
            Some(object) => {
                object.trashed = true;
                true
            }
            None => false,
        }
    }

    /// Make every delete of `id` fail with a server error.
    pub fn fail_deletes_of(&self, id: &str) {
        self.lock().failing_deletes.insert(id.to_string());
    }

    pub fn get(&self, id: &str) -> Option<RemoteFile> {
        self.lock().objects.get(id).map(|o| o.file.clone())
    }

    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.lock().objects.get(id).map(|o| o.content.clone())
    }

    /// Ids of non-trashed objects directly inside `parent_id`, in creation order.
    pub fn ids_in(&self, parent_id: &str) -> Vec<String> {
        let query = Query::children_of(parent_id);
        self.lock()
            .objects
            .values()
            .filter(|o| query.matches(&o.file, o.trashed))
            .map(|o| o.file.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stream(&self, content: Bytes) -> RemoteContent {
        let total = content.len() as u64;
        let chunk_size = self.chunk_size;
        let chunks: Vec<Result<Bytes>> = (0..content.len())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(content.len());
                Ok(content.slice(start..end))
            })
            .collect();
        RemoteContent {
            total_bytes: Some(total),
            stream: futures::stream::iter(chunks).boxed(),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn search(
        &self,
        query: &Query,
        cursor: Option<&PageCursor>,
        page_size: Option<u32>,
    ) -> Result<FilePage> {
        let page_size = page_size
            .map(|n| n.max(1) as usize)
            .unwrap_or(self.page_size);
        let mut state = self.lock();
        state.calls.search += 1;

        // The cursor is the last id handed out, so objects created or deleted
        // between pages never shift the window.
        let start = match cursor {
            Some(c) => Bound::Excluded(c.as_str().to_string()),
            None => Bound::Unbounded,
        };

        let mut matching = state
            .objects
            .range((start, Bound::Unbounded))
            .map(|(_, o)| o)
            .filter(|o| query.matches(&o.file, o.trashed));

        let files: Vec<RemoteFile> = matching
            .by_ref()
            .take(page_size)
            .map(|o| o.file.clone())
            .collect();
        let has_more = matching.next().is_some();

        let next_cursor = match (has_more, files.last()) {
            (true, Some(last)) => Some(PageCursor::new(last.id.clone())),
            _ => None,
        };

        Ok(FilePage { files, next_cursor })
    }

    async fn metadata(&self, id: &str) -> Result<RemoteFile> {
        let mut state = self.lock();
        state.calls.metadata += 1;
        Ok(state.object(id, "files.get")?.file.clone())
    }

    async fn export(&self, id: &str, mime_type: &str) -> Result<RemoteContent> {
        let content = {
            let mut state = self.lock();
            state.calls.export += 1;
            let object = state.object(id, "files.export")?;
            if !object.file.is_native_document() {
                return Err(DriveCacheError::RemoteApi {
                    operation: "files.export".into(),
                    status: 400,
                    body: format!("Export to {} is only supported for native documents", mime_type),
                });
            }
            object.content.clone()
        };
        Ok(self.stream(content))
    }

    async fn media(&self, id: &str) -> Result<RemoteContent> {
        let content = {
            let mut state = self.lock();
            state.calls.media += 1;
            let object = state.object(id, "files.get")?;
            if object.file.is_native_document() {
                return Err(DriveCacheError::RemoteApi {
                    operation: "files.get".into(),
                    status: 403,
                    body: "fileNotDownloadable: use export for native documents".into(),
                });
            }
            object.content.clone()
        };
        Ok(self.stream(content))
    }

    async fn create(&self, name: &str, parent_id: &str, content: Bytes) -> Result<String> {
        self.lock().calls.create += 1;
        Ok(self.insert(name, parent_id, "application/octet-stream", content))
    }

    async fn update(&self, id: &str, content: Bytes) -> Result<String> {
        let mut state = self.lock();
        state.calls.update += 1;
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| not_found("files.update", id))?;
        object.content = content;
        Ok(id.to_string())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.delete += 1;
        if state.failing_deletes.contains(id) {
            return Err(DriveCacheError::RemoteApi {
                operation: "files.delete".into(),
                status: 500,
                body: format!("Backend error deleting {}", id),
            });
        }
        state
            .objects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("files.delete", id))
    }
}

fn not_found(operation: &str, id: &str) -> DriveCacheError {
    DriveCacheError::RemoteApi {
        operation: operation.to_string(),
        status: 404,
        body: format!("File not found: {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    #[tokio::test]
    async fn test_search_pages_with_cursor() {
        let store = MemoryStore::new().with_page_size(2);
        for i in 0..5 {
            store.insert(&format!("f{}", i), "root", "text/plain", "x");
        }

        let query = Query::children_of("root");
        let first = store.search(&query, None, None).await.unwrap();
        assert_eq!(first.files.len(), 2);
        let cursor = first.next_cursor.expect("more pages");

        let second = store.search(&query, Some(&cursor), None).await.unwrap();
        assert_eq!(second.files.len(), 2);
        let third = store
            .search(&query, second.next_cursor.as_ref(), None)
            .await
            .unwrap();
        assert_eq!(third.files.len(), 1);
        assert!(third.next_cursor.is_none());
        assert_eq!(store.calls().search, 3);
    }

    #[tokio::test]
    async fn test_exact_final_page_has_no_cursor() {
        let store = MemoryStore::new().with_page_size(2);
        store.insert("a", "root", "text/plain", "x");
        store.insert("b", "root", "text/plain", "x");

        let page = store
            .search(&Query::children_of("root"), None, None)
            .await
            .unwrap();
        assert_eq!(page.files.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_trashed_objects_filtered_by_query() {
        let store = MemoryStore::new();
        let id = store.insert("old.csv", "root", "text/csv", "x");
        store.trash(&id);

        let visible = store
            .search(&Query::exact("old.csv", "root"), None, None)
            .await
            .unwrap();
        assert!(visible.files.is_empty());

        let all = store
            .search(&Query::new().name_equals("old.csv"), None, None)
            .await
            .unwrap();
        assert_eq!(all.files.len(), 1);
    }

    #[tokio::test]
    async fn test_native_documents_require_export() {
        let store = MemoryStore::new();
        let id = store.insert(
            "Sheet",
            "root",
            "application/vnd.google-apps.spreadsheet",
            "cells",
        );

        let err = store.media(&id).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(store.export(&id, NetworkConfig::EXPORT_MIME_TYPE).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_delete() {
        let store = MemoryStore::new();
        let id = store.insert("keep", "root", "text/plain", "x");
        store.fail_deletes_of(&id);

        let err = store.delete(&id).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let store = MemoryStore::new();
        let id = store.insert("a.txt", "root", "text/plain", "v1");
        let updated = store.update(&id, Bytes::from_static(b"v2")).await.unwrap();
        assert_eq!(updated, id);
        assert_eq!(store.content(&id).unwrap(), Bytes::from_static(b"v2"));
    }
}
