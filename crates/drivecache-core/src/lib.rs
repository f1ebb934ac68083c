//! drivecache - local artifact cache and bulk object management over Google Drive.
//!
//! The crate has two halves:
//!
//! - [`ArtifactCache`] hands out local copies of remote artifacts, re-fetching
//!   them when they are missing, smaller than a validity threshold, or a refresh
//!   is forced.
//! - [`DriveGateway`] lists, downloads, uploads and deletes remote objects. Listing
//!   always walks every page; bulk deletes are best-effort and re-check matches
//!   locally before deleting anything.
//!
//! # Example
//!
//! ```rust,ignore
//! use drivecache::{ArtifactCache, DriveConfig, DriveGateway};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> drivecache::Result<()> {
//!     let config = DriveConfig::resolve(None, None, None)?;
//!     let gateway = Arc::new(DriveGateway::from_config(&config)?);
//!     let cache = ArtifactCache::new(gateway.clone());
//!
//!     let path = cache.resolve("data/raw/sales.xlsx", "1AbC...", 500, false).await?;
//!     println!("ready: {}", path.display());
//!
//!     let removed = gateway.delete_by_prefix("test_", "folder-id").await?;
//!     println!("removed {} files", removed.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod remote;

pub use auth::{StaticToken, TokenFile, TokenSource};
pub use cache::{ArtifactCache, ArtifactSource, CacheEntry, CacheState};
pub use config::{CacheConfig, DriveConfig, NetworkConfig};
pub use error::{DriveCacheError, Result};
pub use gateway::{
    DeletionQuery, DownloadProgress, DriveGateway, FilePredicate, ProgressCallback, UploadMode,
};
pub use remote::{
    Clause, DriveStore, FilePage, MemoryStore, PageCursor, Query, RemoteContent, RemoteFile,
    RemoteStore, StoreCalls,
};
