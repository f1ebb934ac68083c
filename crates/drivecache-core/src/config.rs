//! Centralized configuration for drivecache.
//!
//! Constants for network behaviour and cache validation, plus [`DriveConfig`],
//! which resolves credential locations from explicit arguments, the environment,
//! or the platform config directory (in that order).

use crate::error::{DriveCacheError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Longest silence tolerated on a transfer before it is abandoned.
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
    pub const SEARCH_PAGE_SIZE: u32 = 100;
    pub const DOWNLOAD_PROGRESS_STEP: u8 = 5;
    pub const USER_AGENT: &'static str = "drivecache/0.1";
    pub const DRIVE_API_BASE: &'static str = "https://www.googleapis.com/drive/v3";
    pub const DRIVE_UPLOAD_BASE: &'static str = "https://www.googleapis.com/upload/drive/v3";
    /// MIME prefix of documents that only exist inside the Google editors.
    pub const NATIVE_DOCUMENT_PREFIX: &'static str = "application/vnd.google-apps";
    /// Interchange format native documents are exported to (tabular consumers read XLSX).
    pub const EXPORT_MIME_TYPE: &'static str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
}

/// Cache validation defaults.
pub struct CacheConfig;

impl CacheConfig {
    /// Files smaller than this are treated as truncated downloads.
    pub const DEFAULT_MIN_VALID_SIZE: u64 = 500;
}

/// Environment variable names consumed by [`DriveConfig::resolve`].
pub struct EnvVars;

impl EnvVars {
    pub const CREDENTIALS_PATH: &'static str = "GDRIVE_CREDENTIALS_PATH";
    pub const TOKEN_PATH: &'static str = "GDRIVE_TOKEN_PATH";
    pub const OUTPUT_FOLDER_ID: &'static str = "OUTPUT_FOLDER_ID";
}

const CONFIG_DIR_NAME: &str = "drivecache";
const CREDENTIALS_FILENAME: &str = "credentials.json";
const TOKEN_FILENAME: &str = "token.json";

/// Connection settings for the Drive backend.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// OAuth client or service account material.
    pub credentials_path: PathBuf,
    /// Cached authorized-user token.
    pub token_path: PathBuf,
    /// Container used when a call does not name one.
    pub default_folder_id: Option<String>,
    pub api_base: String,
    pub upload_base: String,
    pub request_timeout: Duration,
    /// Per-read limit on content transfers, which have no total deadline.
    pub read_timeout: Duration,
    pub page_size: u32,
}

impl DriveConfig {
    /// Resolve configuration from explicit arguments, falling back to the process
    /// environment and then to the platform config directory.
    ///
    /// Fails with [`DriveCacheError::Config`] when the credentials file does not exist.
    pub fn resolve(
        credentials_path: Option<PathBuf>,
        token_path: Option<PathBuf>,
        default_folder_id: Option<String>,
    ) -> Result<Self> {
        Self::resolve_with(credentials_path, token_path, default_folder_id, |key| {
            std::env::var(key).ok()
        })
    }

    /// Same as [`resolve`](Self::resolve) with an injectable environment lookup.
    pub fn resolve_with(
        credentials_path: Option<PathBuf>,
        token_path: Option<PathBuf>,
        default_folder_id: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let base_dir = default_config_dir();

        let credentials_path = credentials_path
            .or_else(|| non_empty(EnvVars::CREDENTIALS_PATH).map(PathBuf::from))
            .unwrap_or_else(|| base_dir.join(CREDENTIALS_FILENAME));

        let token_path = token_path
            .or_else(|| non_empty(EnvVars::TOKEN_PATH).map(PathBuf::from))
            .unwrap_or_else(|| base_dir.join(TOKEN_FILENAME));

        let default_folder_id = default_folder_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| non_empty(EnvVars::OUTPUT_FOLDER_ID));

        if !credentials_path.is_file() {
            return Err(DriveCacheError::config(format!(
                "Credentials file missing at {}",
                credentials_path.display()
            )));
        }

        Ok(Self {
            credentials_path,
            token_path,
            default_folder_id,
            api_base: NetworkConfig::DRIVE_API_BASE.to_string(),
            upload_base: NetworkConfig::DRIVE_UPLOAD_BASE.to_string(),
            request_timeout: NetworkConfig::REQUEST_TIMEOUT,
            read_timeout: NetworkConfig::READ_TIMEOUT,
            page_size: NetworkConfig::SEARCH_PAGE_SIZE,
        })
    }

    /// Point both API endpoints at another host (used against local test servers).
    pub fn with_endpoint(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_base = format!("{}/drive/v3", base);
        self.upload_base = format!("{}/upload/drive/v3", base);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .unwrap_or_else(|| Path::new("data").to_path_buf())
}
