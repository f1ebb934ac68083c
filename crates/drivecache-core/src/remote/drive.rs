//! Google Drive v3 backend over HTTP.
//!
//! Two reqwest clients are kept, as with any streaming downloader: one with a
//! total request timeout for API calls, and one for content transfers, which
//! may legitimately take longer than any fixed deadline. The transfer client
//! bounds connection setup and each read instead, so a stalled body fails.

use super::{FilePage, PageCursor, Query, RemoteContent, RemoteFile, RemoteStore};
use crate::auth::{TokenFile, TokenSource};
use crate::config::{DriveConfig, NetworkConfig};
use crate::error::{DriveCacheError, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const FILE_FIELDS: &str = "id, name, mimeType, parents";
const MULTIPART_BOUNDARY: &str = "drivecache-part-boundary-5c1f0e";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileIdResponse {
    id: String,
}

/// [`RemoteStore`] backed by the Drive v3 REST API.
pub struct DriveStore {
    client: Client,
    download_client: Client,
    token: Arc<dyn TokenSource>,
    api_base: String,
    upload_base: String,
}

impl std::fmt::Debug for DriveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveStore")
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DriveStore {
    /// Create a store that reads its bearer token from the configured token file.
    pub fn new(config: &DriveConfig) -> Result<Self> {
        Self::with_token_source(config, Arc::new(TokenFile::new(&config.token_path)))
    }

    pub fn with_token_source(config: &DriveConfig, token: Arc<dyn TokenSource>) -> Result<Self> {
        for base in [&config.api_base, &config.upload_base] {
            url::Url::parse(base).map_err(|e| {
                DriveCacheError::config(format!("Invalid endpoint URL {}: {}", base, e))
            })?;
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| {
                DriveCacheError::config(format!("Failed to create HTTP client: {}", e))
            })?;

        let download_client = Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .read_timeout(config.read_timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| {
                DriveCacheError::config(format!("Failed to create download HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            download_client,
            token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
        })
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_base, urlencoding::encode(id))
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let token = self.token.access_token().await?;
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            if e.is_timeout() {
                DriveCacheError::Timeout {
                    message: format!("{} timed out: {}", operation, e),
                }
            } else {
                DriveCacheError::Network {
                    message: format!("{} request failed: {}", operation, e),
                    source: Some(e),
                }
            }
        })?;
        ensure_success(response, operation).await
    }

    async fn content(&self, request: RequestBuilder, operation: &str) -> Result<RemoteContent> {
        let response = self.send(request, operation).await?;
        let total_bytes = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DriveCacheError::from))
            .boxed();
        Ok(RemoteContent {
            total_bytes,
            stream,
        })
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DriveCacheError::RemoteApi {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    response.json().await.map_err(|e| DriveCacheError::Json {
        message: format!("Failed to parse {} response: {}", operation, e),
        source: None,
    })
}

fn multipart_related(metadata: &serde_json::Value, content: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(content.len() + 512);
    body.put_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(metadata.to_string().as_bytes());
    body.put_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.put_slice(content);
    body.put_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.freeze()
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn search(
        &self,
        query: &Query,
        cursor: Option<&PageCursor>,
        page_size: Option<u32>,
    ) -> Result<FilePage> {
        let q = query.to_drive_query();
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut params: Vec<(&str, String)> = vec![
            ("q", q),
            ("fields", fields),
            ("spaces", "drive".to_string()),
        ];
        if let Some(size) = page_size {
            params.push(("pageSize", size.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("pageToken", cursor.as_str().to_string()));
        }

        let request = self
            .client
            .get(format!("{}/files", self.api_base))
            .query(&params);
        let response = self.send(request, "files.list").await?;
        let list: FileListResponse = parse_json(response, "files.list").await?;

        debug!(
            "files.list returned {} files (more: {})",
            list.files.len(),
            list.next_page_token.is_some()
        );

        Ok(FilePage {
            files: list.files,
            next_cursor: list
                .next_page_token
                .filter(|t| !t.is_empty())
                .map(PageCursor::new),
        })
    }

    async fn metadata(&self, id: &str) -> Result<RemoteFile> {
        let request = self
            .client
            .get(self.file_url(id))
            .query(&[("fields", FILE_FIELDS)]);
        let response = self.send(request, "files.get").await?;
        parse_json(response, "files.get").await
    }

    async fn export(&self, id: &str, mime_type: &str) -> Result<RemoteContent> {
        let request = self
            .download_client
            .get(format!("{}/export", self.file_url(id)))
            .query(&[("mimeType", mime_type)]);
        self.content(request, "files.export").await
    }

    async fn media(&self, id: &str) -> Result<RemoteContent> {
        let request = self
            .download_client
            .get(self.file_url(id))
            .query(&[("alt", "media")]);
        self.content(request, "files.get").await
    }

    async fn create(&self, name: &str, parent_id: &str, content: Bytes) -> Result<String> {
        let metadata = serde_json::json!({ "name": name, "parents": [parent_id] });
        let request = self
            .download_client
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(multipart_related(&metadata, &content));
        let response = self.send(request, "files.create").await?;
        let created: FileIdResponse = parse_json(response, "files.create").await?;
        Ok(created.id)
    }

    async fn update(&self, id: &str, content: Bytes) -> Result<String> {
        let request = self
            .download_client
            .patch(format!(
                "{}/files/{}",
                self.upload_base,
                urlencoding::encode(id)
            ))
            .query(&[("uploadType", "media"), ("fields", "id")])
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(content);
        let response = self.send(request, "files.update").await?;
        let updated: FileIdResponse = parse_json(response, "files.update").await?;
        Ok(updated.id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.delete(self.file_url(id));
        self.send(request, "files.delete").await?;
        Ok(())
    }
}
