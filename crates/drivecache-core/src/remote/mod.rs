//! Remote object store abstraction.
//!
//! [`RemoteStore`] is the exact set of remote operations the gateway consumes:
//! search, metadata, export, binary fetch, create, update and delete. Two
//! implementations are provided:
//!
//! - [`DriveStore`] - Google Drive v3 over HTTP
//! - [`MemoryStore`] - in-process store for tests and offline runs

mod drive;
mod memory;
mod query;

pub use drive::DriveStore;
pub use memory::{MemoryStore, StoreCalls};
pub use query::{escape_literal, Clause, Query};

use crate::config::NetworkConfig;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A file or folder as described by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl RemoteFile {
    /// Documents that only exist inside the remote editors and must be exported.
    pub fn is_native_document(&self) -> bool {
        self.mime_type.starts_with(NetworkConfig::NATIVE_DOCUMENT_PREFIX)
    }
}

/// Opaque continuation token returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of search results. `next_cursor == None` ends the listing.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<RemoteFile>,
    pub next_cursor: Option<PageCursor>,
}

/// Streamed object content.
pub struct RemoteContent {
    /// Declared length, when the store reports one.
    pub total_bytes: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for RemoteContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContent")
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

/// Operations consumed from the remote object store.
///
/// Every method is one network round trip. Implementations must not retry.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One page of files matching `query`, starting at `cursor`.
    async fn search(
        &self,
        query: &Query,
        cursor: Option<&PageCursor>,
        page_size: Option<u32>,
    ) -> Result<FilePage>;

    async fn metadata(&self, id: &str) -> Result<RemoteFile>;

    /// Convert a native document to `mime_type` and stream the result.
    async fn export(&self, id: &str, mime_type: &str) -> Result<RemoteContent>;

    /// Stream the raw stored bytes.
    async fn media(&self, id: &str) -> Result<RemoteContent>;

    /// Create a new object and return its id.
    async fn create(&self, name: &str, parent_id: &str, content: Bytes) -> Result<String>;

    /// Replace the content of an existing object, keeping its id.
    async fn update(&self, id: &str, content: Bytes) -> Result<String>;

    async fn delete(&self, id: &str) -> Result<()>;
}
