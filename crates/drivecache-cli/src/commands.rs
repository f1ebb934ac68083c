//! Subcommand implementations.
//!
//! Each command takes an already-built gateway or cache so it can run against
//! any [`drivecache::RemoteStore`].

use anyhow::{bail, Context, Result};
use drivecache::{ArtifactCache, DriveGateway, RemoteFile, UploadMode};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Pick the target folder: an explicit argument wins over the configured default.
pub fn resolve_folder(explicit: Option<&str>, gateway: &DriveGateway) -> Result<String> {
    match explicit
        .filter(|id| !id.is_empty())
        .or(gateway.default_folder_id())
    {
        Some(id) => Ok(id.to_string()),
        None => bail!("No folder given and OUTPUT_FOLDER_ID is not set"),
    }
}

pub async fn fetch(
    cache: &ArtifactCache,
    remote_id: &str,
    path: &Path,
    min_size: u64,
    force: bool,
) -> Result<PathBuf> {
    let resolved = cache
        .resolve(path, remote_id, min_size, force)
        .await
        .with_context(|| format!("Failed to fetch {} into {}", remote_id, path.display()))?;
    Ok(resolved)
}

pub async fn upload(
    gateway: &DriveGateway,
    path: &Path,
    folder: &str,
    always_create: bool,
) -> Result<String> {
    let mode = if always_create {
        UploadMode::AlwaysCreate
    } else {
        UploadMode::OverwriteByName
    };
    let id = gateway
        .upload(path, folder, mode)
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;
    info!("Uploaded {} as {}", path.display(), id);
    Ok(id)
}

pub async fn list(gateway: &DriveGateway, folder: Option<&str>, limit: u32) -> Result<Vec<RemoteFile>> {
    Ok(gateway.list_files(folder, limit).await?)
}

pub async fn delete_prefix(gateway: &DriveGateway, prefix: &str, folder: &str) -> Result<Vec<String>> {
    let deleted = gateway.delete_by_prefix(prefix, folder).await?;
    info!("Deleted {} files starting with '{}'", deleted.len(), prefix);
    Ok(deleted)
}

pub async fn clear(gateway: &DriveGateway, folder: &str) -> Result<Vec<String>> {
    let deleted = gateway.clear_container(folder).await?;
    info!("Cleared {} files from {}", deleted.len(), folder);
    Ok(deleted)
}

/// Connectivity check: list a single file from the default folder.
pub async fn check(gateway: &DriveGateway) -> Result<usize> {
    if gateway.default_folder_id().is_none() {
        warn!("No default folder configured, checking against the whole drive");
    }
    let files = gateway
        .list_files(None, 1)
        .await
        .context("Drive connectivity check failed")?;
    info!("Connection OK, {} file(s) visible", files.len());
    Ok(files.len())
}
