// Copyright (c) 2025 - Cowboy AI, Inc.

//! Object store adapter over the filer HTTP API
//!
//! Provides tenant-scoped object read access for the storage workers and
//! directory listing for the polling watcher. All entry points validate
//! paths against the bucket grammar:
//!
//! ```text
//! /buckets/{tenant_id}/{category}/{file_path}
//! ```
//!
//! Paths outside `/buckets/` are rejected before any network call.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::errors::{PlatformError, PlatformResult};

/// Configuration for the object store connection
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Filer base URL (e.g., "http://localhost:8888")
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            timeout_secs: 30,
        }
    }
}

/// A validated tenant-scoped object path
///
/// # Examples
///
/// ```rust
/// use p8fs_core::object_store::ObjectPath;
///
/// let path = ObjectPath::parse("/buckets/t1/uploads/a.txt").unwrap();
/// assert_eq!(path.tenant_id(), "t1");
/// assert_eq!(path.category(), "uploads");
///
/// assert!(ObjectPath::parse("/tmp/a.txt").is_err());
/// assert!(ObjectPath::parse("/buckets/t 1/uploads/a.txt").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Parse and validate a full object path.
    ///
    /// # Invariants
    /// - Begins with `/buckets/`
    /// - Tenant segment is non-empty and URL-safe
    /// - A category and file path follow the tenant segment
    pub fn parse(path: &str) -> PlatformResult<Self> {
        let clean = path.trim_start_matches('/');
        let rest = clean
            .strip_prefix("buckets/")
            .ok_or_else(|| PlatformError::InvalidPath(format!("outside /buckets/: {path}")))?;

        let (tenant, remainder) = rest
            .split_once('/')
            .ok_or_else(|| PlatformError::InvalidPath(format!("missing tenant segment: {path}")))?;

        if tenant.is_empty() || !tenant.chars().all(is_url_safe) {
            return Err(PlatformError::InvalidPath(format!(
                "tenant segment not URL-safe: {tenant}"
            )));
        }

        let (category, file_path) = remainder
            .split_once('/')
            .ok_or_else(|| PlatformError::InvalidPath(format!("missing category: {path}")))?;

        if category.is_empty() || file_path.is_empty() {
            return Err(PlatformError::InvalidPath(format!(
                "missing category or file path: {path}"
            )));
        }

        Ok(Self(format!("/{clean}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tenant segment of the path
    pub fn tenant_id(&self) -> &str {
        self.0
            .trim_start_matches('/')
            .strip_prefix("buckets/")
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default()
    }

    /// Category segment of the path
    pub fn category(&self) -> &str {
        self.0
            .trim_start_matches('/')
            .split('/')
            .nth(2)
            .unwrap_or_default()
    }

    /// File extension, lowercase, without the dot
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_url_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')
}

/// A downloaded object
#[derive(Debug, Clone)]
pub struct DownloadedObject {
    pub content: Vec<u8>,
    pub size_bytes: u64,
}

/// Object metadata from a HEAD request
#[derive(Debug, Clone)]
pub struct ObjectStat {
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub mtime: Option<String>,
}

/// A directory listing entry
#[derive(Debug, Clone, Deserialize)]
pub struct DirEntry {
    #[serde(rename = "FullPath", default)]
    pub full_path: String,
    #[serde(rename = "Mtime", default)]
    pub mtime: Option<String>,
    #[serde(rename = "Mode", default)]
    pub mode: u32,
    #[serde(rename = "FileSize", default)]
    pub file_size: u64,
    #[serde(rename = "Mime", default)]
    pub mime: Option<String>,
    #[serde(rename = "chunks", default)]
    pub chunks: Option<serde_json::Value>,
}

impl DirEntry {
    /// The filer sets the high mode bit on directories; entries without
    /// chunks and content are directories on older filers.
    pub fn is_directory(&self) -> bool {
        self.mode & (1 << 31) != 0
            || (self.chunks.is_none() && self.file_size == 0 && self.mime.is_none())
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "Entries", default)]
    entries: Option<Vec<DirEntry>>,
}

/// Tenant-scoped object read access
///
/// [`ObjectStoreClient`] is the production implementation over the filer
/// HTTP API; tests substitute in-memory stores at this seam.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object's content; the path's tenant segment must match
    async fn download(
        &self,
        path: &ObjectPath,
        tenant_id: &str,
    ) -> PlatformResult<DownloadedObject>;

    /// Fetch object metadata without the body
    async fn head(&self, path: &ObjectPath, tenant_id: &str) -> PlatformResult<ObjectStat>;

    /// List a directory prefix; used by the polling watcher only
    async fn list(&self, prefix: &str) -> PlatformResult<Vec<DirEntry>>;
}

/// Object store client over the filer HTTP API
#[derive(Clone)]
pub struct ObjectStoreClient {
    client: Client,
    base_url: String,
}

impl ObjectStoreClient {
    /// Create a new client with the given configuration
    pub fn new(config: ObjectStoreConfig) -> PlatformResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlatformError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, path: &ObjectPath) -> String {
        // Encode each segment; the filer treats '/' as a separator.
        let encoded: Vec<String> = path
            .as_str()
            .trim_start_matches('/')
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }
}

#[async_trait::async_trait]
impl ObjectStore for ObjectStoreClient {
    async fn download(
        &self,
        path: &ObjectPath,
        tenant_id: &str,
    ) -> PlatformResult<DownloadedObject> {
        if path.tenant_id() != tenant_id {
            return Err(PlatformError::InvalidPath(format!(
                "path {path} does not belong to tenant {tenant_id}"
            )));
        }

        let url = self.object_url(path);
        debug!("Downloading object: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PlatformError::ObjectStore(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let content = response
                    .bytes()
                    .await
                    .map_err(|e| PlatformError::ObjectStore(e.to_string()))?
                    .to_vec();
                let size_bytes = content.len() as u64;
                Ok(DownloadedObject {
                    content,
                    size_bytes,
                })
            }
            StatusCode::NOT_FOUND => Err(PlatformError::ObjectNotFound(path.to_string())),
            status => Err(PlatformError::ObjectStore(format!(
                "download {path} failed: {status}"
            ))),
        }
    }

    async fn head(&self, path: &ObjectPath, tenant_id: &str) -> PlatformResult<ObjectStat> {
        if path.tenant_id() != tenant_id {
            return Err(PlatformError::InvalidPath(format!(
                "path {path} does not belong to tenant {tenant_id}"
            )));
        }

        let url = self.object_url(path);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| PlatformError::ObjectStore(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let headers = response.headers();
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                Ok(ObjectStat {
                    size: header("content-length")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    content_type: header("content-type"),
                    etag: header("etag"),
                    mtime: header("last-modified"),
                })
            }
            StatusCode::NOT_FOUND => Err(PlatformError::ObjectNotFound(path.to_string())),
            status => Err(PlatformError::ObjectStore(format!(
                "head {path} failed: {status}"
            ))),
        }
    }

    /// Missing directories yield an empty listing.
    async fn list(&self, prefix: &str) -> PlatformResult<Vec<DirEntry>> {
        let url = format!(
            "{}/{}",
            self.base_url,
            prefix.trim_start_matches('/').trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .query(&[("pretty", "1")])
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| PlatformError::ObjectStore(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let listing: ListResponse = response
                    .json()
                    .await
                    .map_err(|e| PlatformError::ObjectStore(e.to_string()))?;
                Ok(listing.entries.unwrap_or_default())
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status => Err(PlatformError::ObjectStore(format!(
                "list {prefix} failed: {status}"
            ))),
        }
    }
}
