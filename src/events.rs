// Copyright (c) 2025 - Cowboy AI, Inc.

//! Storage event wire model
//!
//! Events arrive from the source watcher as loosely-shaped JSON and are
//! validated into [`StorageEvent`] before any processing. Validation is
//! deliberately tolerant of producer variation: event types are normalized
//! from common aliases, paths and file sizes are extracted through fallback
//! chains, and unknown fields are ignored.
//!
//! The router enriches events with a [`RoutingInfo`] object before
//! republishing onto a tier subject.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PlatformError, PlatformResult};

/// Storage event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEventType {
    Create,
    Update,
    Delete,
    Rename,
}

impl StorageEventType {
    /// Normalize an event type string, accepting common producer aliases.
    pub fn normalize(raw: &str) -> PlatformResult<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "create" | "put" | "upload" => Ok(StorageEventType::Create),
            "update" | "modify" => Ok(StorageEventType::Update),
            "delete" | "remove" => Ok(StorageEventType::Delete),
            "rename" | "move" => Ok(StorageEventType::Rename),
            other => Err(PlatformError::BadMessage(format!(
                "unsupported event type: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEventType::Create => "create",
            StorageEventType::Update => "update",
            StorageEventType::Delete => "delete",
            StorageEventType::Rename => "rename",
        }
    }
}

/// Structured storage path information
///
/// Tenant paths follow `/buckets/{tenant_id}/{category}/{file_path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePathInfo {
    pub full_path: String,
    pub tenant_id: Option<String>,
    pub bucket: Option<String>,
    pub category: Option<String>,
    pub file_path: Option<String>,
    pub is_tenant_path: bool,
    pub is_directory: bool,
}

impl StoragePathInfo {
    /// Parse a full path into structured components.
    pub fn from_full_path(path: &str) -> Self {
        let clean = path.trim_start_matches('/');

        if let Some(rest) = clean.strip_prefix("buckets/") {
            if let Some((tenant_id, remaining)) = rest.split_once('/') {
                if !tenant_id.is_empty() {
                    let (category, file_path) = match remaining.split_once('/') {
                        Some((cat, fp)) if !fp.is_empty() => {
                            (Some(cat.to_string()), Some(fp.to_string()))
                        }
                        Some((cat, _)) => (Some(cat.to_string()), None),
                        None if !remaining.is_empty() => (Some(remaining.to_string()), None),
                        None => (None, None),
                    };

                    let is_directory = path.ends_with('/') || file_path.is_none();

                    return Self {
                        full_path: path.to_string(),
                        tenant_id: Some(tenant_id.to_string()),
                        bucket: Some("buckets".to_string()),
                        category,
                        file_path,
                        is_tenant_path: true,
                        is_directory,
                    };
                }
            }
        }

        Self {
            full_path: path.to_string(),
            tenant_id: None,
            bucket: None,
            category: None,
            file_path: None,
            is_tenant_path: false,
            is_directory: path.ends_with('/'),
        }
    }
}

/// Storage event metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageEventMetadata {
    pub file_size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub source: String,
}

/// Validated storage event with structured data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEvent {
    pub event_type: StorageEventType,
    pub path: String,
    pub path_info: StoragePathInfo,
    pub metadata: StorageEventMetadata,
    pub tenant_id: String,
    pub relative_path: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl StorageEvent {
    /// Validate a raw event into a [`StorageEvent`].
    ///
    /// Rejects non-tenant paths and directory events; tolerates unknown
    /// fields and producer-specific field names.
    pub fn from_raw(raw: &Value) -> PlatformResult<Self> {
        let event_type_str = raw
            .get("event_type")
            .or_else(|| raw.get("operation"))
            .or_else(|| raw.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let event_type = StorageEventType::normalize(event_type_str)?;

        let path = raw
            .get("path")
            .or_else(|| raw.get("key"))
            .or_else(|| raw.get("entry").and_then(|e| e.get("FullPath")))
            .and_then(Value::as_str)
            .unwrap_or("");
        if path.is_empty() {
            return Err(PlatformError::BadMessage("no path in event".into()));
        }

        let path_info = StoragePathInfo::from_full_path(path);
        if !path_info.is_tenant_path {
            return Err(PlatformError::BadMessage(format!(
                "non-tenant path: {path}"
            )));
        }
        if path_info.is_directory {
            return Err(PlatformError::BadMessage(format!(
                "directory event: {path}"
            )));
        }

        let Some(tenant_id) = path_info.tenant_id.clone() else {
            return Err(PlatformError::BadMessage(format!(
                "cannot extract tenant_id from path: {path}"
            )));
        };

        let relative_path = match (&path_info.category, &path_info.file_path) {
            (Some(cat), Some(fp)) => format!("{cat}/{fp}"),
            (Some(cat), None) => cat.clone(),
            _ => String::new(),
        };

        let metadata = StorageEventMetadata {
            file_size: extract_file_size(raw),
            content_type: raw
                .get("content_type")
                .or_else(|| raw.get("mime_type"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            last_modified: raw
                .get("last_modified")
                .or_else(|| raw.get("timestamp"))
                .and_then(Value::as_str)
                .map(str::to_string),
            etag: raw.get("etag").and_then(Value::as_str).map(str::to_string),
            source: raw
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("object-store")
                .to_string(),
        };

        let timestamp = raw
            .get("timestamp")
            .and_then(Value::as_f64)
            .unwrap_or_else(|| Utc::now().timestamp() as f64);

        Ok(Self {
            event_type,
            path: path.to_string(),
            path_info,
            metadata,
            tenant_id,
            relative_path,
            timestamp,
        })
    }

    /// Whether this event should reach a worker.
    ///
    /// Drops multipart-upload temporaries, non-tenant paths, directories,
    /// and anything other than create/update.
    pub fn should_process(&self) -> bool {
        if self.path.contains("uploadId=") {
            return false;
        }
        if !self.path_info.is_tenant_path || self.path_info.is_directory {
            return false;
        }
        matches!(
            self.event_type,
            StorageEventType::Create | StorageEventType::Update
        )
    }
}

/// Extract a file size from a raw event through the fallback chain:
/// `size`, `file_size`, `entry.attributes.file_size`. String digits are
/// coerced; anything else yields 0.
pub fn extract_file_size(raw: &Value) -> u64 {
    let candidates = [
        raw.get("size"),
        raw.get("file_size"),
        raw.get("entry")
            .and_then(|e| e.get("attributes"))
            .and_then(|a| a.get("file_size")),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Some(n) = candidate.as_u64() {
            if n > 0 {
                return n;
            }
        }
        if let Some(s) = candidate.as_str() {
            if let Ok(n) = s.parse::<u64>() {
                if n > 0 {
                    return n;
                }
            }
        }
    }

    0
}

/// Routing metadata injected by the tiered router before republish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub original_subject: String,
    pub target_subject: String,
    pub file_size_bytes: u64,
    pub router_id: String,
    pub message_count: u64,
    /// Seconds since the Unix epoch
    pub routing_timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_aliases() {
        assert_eq!(
            StorageEventType::normalize("put").unwrap(),
            StorageEventType::Create
        );
        assert_eq!(
            StorageEventType::normalize("modify").unwrap(),
            StorageEventType::Update
        );
        assert_eq!(
            StorageEventType::normalize("remove").unwrap(),
            StorageEventType::Delete
        );
        assert_eq!(
            StorageEventType::normalize("MOVE").unwrap(),
            StorageEventType::Rename
        );
        assert!(StorageEventType::normalize("unknown").is_err());
    }

    #[test]
    fn test_tenant_path_parsing() {
        let info = StoragePathInfo::from_full_path("/buckets/t1/uploads/2025/report.pdf");
        assert!(info.is_tenant_path);
        assert!(!info.is_directory);
        assert_eq!(info.tenant_id.as_deref(), Some("t1"));
        assert_eq!(info.category.as_deref(), Some("uploads"));
        assert_eq!(info.file_path.as_deref(), Some("2025/report.pdf"));
    }

    #[test]
    fn test_non_tenant_path() {
        let info = StoragePathInfo::from_full_path("/tmp/scratch.txt");
        assert!(!info.is_tenant_path);
        assert!(info.tenant_id.is_none());
    }

    #[test]
    fn test_directory_detection() {
        assert!(StoragePathInfo::from_full_path("/buckets/t1/uploads/").is_directory);
        assert!(StoragePathInfo::from_full_path("/buckets/t1/uploads").is_directory);
        assert!(!StoragePathInfo::from_full_path("/buckets/t1/uploads/a.txt").is_directory);
    }

    #[test]
    fn test_from_raw_happy_path() {
        let raw = json!({
            "event_type": "create",
            "path": "/buckets/t1/uploads/a.txt",
            "size": 100,
            "mime_type": "text/plain",
            "timestamp": 1700000000.0
        });
        let event = StorageEvent::from_raw(&raw).unwrap();
        assert_eq!(event.event_type, StorageEventType::Create);
        assert_eq!(event.tenant_id, "t1");
        assert_eq!(event.relative_path, "uploads/a.txt");
        assert_eq!(event.metadata.file_size, 100);
        assert_eq!(event.metadata.content_type.as_deref(), Some("text/plain"));
        assert!(event.should_process());
    }

    #[test]
    fn test_from_raw_rejects_non_tenant() {
        let raw = json!({"type": "create", "path": "/other/a.txt", "size": 10});
        assert!(StorageEvent::from_raw(&raw).is_err());
    }

    #[test]
    fn test_multipart_temporaries_not_processed() {
        let raw = json!({
            "event_type": "create",
            "path": "/buckets/t1/uploads/big.bin?uploadId=abc123",
            "size": 10
        });
        let event = StorageEvent::from_raw(&raw).unwrap();
        assert!(!event.should_process());
    }

    #[test]
    fn test_delete_not_processed_but_valid() {
        let raw = json!({
            "event_type": "delete",
            "path": "/buckets/t1/uploads/a.txt"
        });
        let event = StorageEvent::from_raw(&raw).unwrap();
        assert_eq!(event.event_type, StorageEventType::Delete);
        assert!(!event.should_process());
    }

    #[test]
    fn test_file_size_fallback_chain() {
        assert_eq!(extract_file_size(&json!({"size": 42})), 42);
        assert_eq!(extract_file_size(&json!({"file_size": 43})), 43);
        assert_eq!(
            extract_file_size(&json!({"entry": {"attributes": {"file_size": 44}}})),
            44
        );
        // String digits coerced
        assert_eq!(extract_file_size(&json!({"size": "45"})), 45);
        // First non-zero hit wins
        assert_eq!(extract_file_size(&json!({"size": 0, "file_size": 7})), 7);
        // Nothing found
        assert_eq!(extract_file_size(&json!({"other": true})), 0);
        assert_eq!(extract_file_size(&json!({"size": "not-a-number"})), 0);
    }
}
