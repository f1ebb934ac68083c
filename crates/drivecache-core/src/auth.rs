//! Access token sources for the Drive backend.
//!
//! Token acquisition (consent flow, refresh) happens outside this crate; what is
//! consumed here is an already-issued bearer token, either passed in directly or
//! read from the cached authorized-user file.

use crate::error::{DriveCacheError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Supplies a bearer token for each remote call.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken").field(&"<redacted>").finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Authorized-user token file as written by the Google client libraries.
#[derive(Debug, Deserialize)]
struct CachedToken {
    token: Option<String>,
    access_token: Option<String>,
}

/// Reads the cached token file on every call so an external refresher can
/// rewrite it between requests.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenSource for TokenFile {
    async fn access_token(&self) -> Result<String> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DriveCacheError::config(format!(
                "Cannot read token file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        parse_token(&raw).ok_or_else(|| {
            DriveCacheError::config(format!(
                "Token file {} has no access token",
                self.path.display()
            ))
        })
    }
}

fn parse_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<CachedToken>(trimmed) {
        Ok(cached) => cached
            .token
            .or(cached.access_token)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        // A bare token string is accepted as well.
        Err(_) if !trimmed.starts_with('{') => Some(trimmed.to_string()),
        Err(_) => None,
    }
}
