// Copyright (c) 2025 - Cowboy AI, Inc.

//! File processing pipeline
//!
//! One file at a time: upsert the File row, download to a temp location,
//! dispatch to a structured-document processor or a content parser, upsert
//! the resulting chunks (embeddings recompute inside the repository), and
//! delete the temp file on every exit path.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{PlatformError, PlatformResult};
use crate::events::StorageEvent;
use crate::models::{ids, FileRecord, Resource};
use crate::object_store::{ObjectPath, ObjectStore};
use crate::repository::{Filter, TenantRepository};

use super::engram::DocumentProcessorRegistry;
use super::parser::ParserRegistry;
use std::sync::Arc;

/// Extensions that may carry Engram-shaped structured documents
const STRUCTURED_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Processes files and indexes content for one tenant scope
pub struct FileProcessor {
    object_store: Arc<dyn ObjectStore>,
    files: TenantRepository<FileRecord>,
    resources: TenantRepository<Resource>,
    parsers: Arc<ParserRegistry>,
    processors: Arc<DocumentProcessorRegistry>,
}

impl FileProcessor {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        files: TenantRepository<FileRecord>,
        resources: TenantRepository<Resource>,
        parsers: Arc<ParserRegistry>,
        processors: Arc<DocumentProcessorRegistry>,
    ) -> Self {
        Self {
            object_store,
            files,
            resources,
            parsers,
            processors,
        }
    }

    /// Process a create/update event end to end
    pub async fn process_file(&self, event: &StorageEvent) -> PlatformResult<()> {
        let started = Utc::now();
        let tenant_id = &event.tenant_id;
        let object_path = ObjectPath::parse(&event.path)?;
        let file_id = ids::file_id(tenant_id, &event.path);

        let file_timestamp = event_timestamp(event);

        // File row first so a parserless file still has its record
        let mut file = FileRecord::new(
            tenant_id,
            &event.path,
            event.metadata.file_size,
            event.metadata.content_type.clone(),
        );
        file.upload_timestamp = file_timestamp;
        file.metadata.insert("s3_key".into(), json!(event.path));
        file.metadata.insert(
            "name".into(),
            json!(event.path.rsplit('/').next().unwrap_or_default()),
        );
        self.files.upsert(&file).await?;

        info!(
            "Processing {} ({} bytes)",
            event.path, event.metadata.file_size
        );

        let object = self.object_store.download(&object_path, tenant_id).await?;

        // Temp file is removed on every exit path when this guard drops
        let extension = object_path.extension();
        let mut builder = tempfile::Builder::new();
        let suffix = extension.as_ref().map(|ext| format!(".{ext}"));
        if let Some(suffix) = &suffix {
            builder.suffix(suffix);
        }
        let mut temp_file = builder
            .tempfile()
            .map_err(|e| PlatformError::Generic(format!("temp file: {e}")))?;
        temp_file
            .write_all(&object.content)
            .map_err(|e| PlatformError::Generic(format!("temp write: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| PlatformError::Generic(format!("temp flush: {e}")))?;

        // Structured documents may be Engrams; a match skips default chunking
        if let Some(ext) = &extension {
            if STRUCTURED_EXTENSIONS.contains(&ext.as_str()) {
                if let Some(result) = self
                    .try_structured(&object.content, ext, tenant_id)
                    .await?
                {
                    if let Some(engram_id) = result.engram_id {
                        info!("Engram ID: {engram_id}");
                    }
                    return Ok(());
                }
            }
        }

        let chunks = self
            .extract_chunks(temp_file.path(), &event.path)
            .await?;

        let Some(chunks) = chunks else {
            // Absent parser: File row stays, no chunks
            return Ok(());
        };

        if chunks.is_empty() {
            warn!(
                "No chunks created for {} - file may be empty or processing failed",
                event.path
            );
        }

        let stem = file_stem(&event.path);
        let mut resources_created = 0usize;
        for chunk in &chunks {
            let resource_id = ids::resource_id(&file_id, chunk.ordinal);
            let mut resource = Resource {
                id: resource_id,
                tenant_id: tenant_id.clone(),
                name: format!("{stem}_chunk_{}", chunk.ordinal),
                category: Some("content_chunk".into()),
                content: chunk.content.clone(),
                summary: None,
                ordinal: chunk.ordinal,
                uri: format!("{}#chunk_{}", event.relative_path, chunk.ordinal),
                resource_timestamp: Some(file_timestamp),
                metadata: chunk.metadata.clone(),
                graph_paths: Vec::new(),
            };
            resource
                .metadata
                .insert("file_id".into(), json!(file_id.to_string()));
            resource
                .metadata
                .insert("chunk_index".into(), json!(chunk.ordinal));
            resource
                .metadata
                .insert("chunk_type".into(), json!(chunk.chunk_type));
            resource
                .metadata
                .insert("file_mtime".into(), json!(file_timestamp.to_rfc3339()));

            self.resources.upsert(&resource).await?;
            resources_created += 1;
        }

        let elapsed = Utc::now() - started;
        info!(
            "Created {resources_created} content resources for {} in {}ms",
            event.path,
            elapsed.num_milliseconds()
        );
        Ok(())
    }

    /// Delete a file row and every resource referencing it.
    ///
    /// Embedding rows owned by those resources are removed transitively by
    /// the repository cascade.
    pub async fn delete_file(&self, file_id: Uuid) -> PlatformResult<()> {
        let owned = self
            .resources
            .select(
                &[Filter::Contains(
                    "metadata".into(),
                    json!({"file_id": file_id.to_string()}),
                )],
                usize::MAX,
                0,
                None,
            )
            .await?;

        let resource_count = owned.len();
        for resource in owned {
            self.resources.delete(&resource.id.to_string()).await?;
        }
        self.files.delete(&file_id.to_string()).await?;

        info!("Deleted file {file_id} and {resource_count} associated resources");
        Ok(())
    }

    async fn try_structured(
        &self,
        content: &[u8],
        extension: &str,
        tenant_id: &str,
    ) -> PlatformResult<Option<super::engram::ProcessorResult>> {
        let Ok(text) = std::str::from_utf8(content) else {
            return Ok(None);
        };
        let content_type = if extension == "json" {
            "application/json"
        } else {
            "application/x-yaml"
        };
        self.processors
            .process_document(text, content_type, tenant_id)
            .await
    }

    /// Parse the local file into chunks; None when no parser is registered
    async fn extract_chunks(
        &self,
        local_path: &Path,
        source_path: &str,
    ) -> PlatformResult<Option<Vec<super::parser::Chunk>>> {
        let Some(parser) = self.parsers.get_parser(local_path) else {
            warn!("No content parser for {source_path}");
            return Ok(None);
        };

        debug!("Parsing {source_path} with {}", parser.name());
        let chunks = parser.parse(local_path).await?;
        Ok(Some(chunks))
    }
}

fn event_timestamp(event: &StorageEvent) -> DateTime<Utc> {
    let secs = event.timestamp as i64;
    let nanos = ((event.timestamp - secs as f64) * 1e9) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_else(Utc::now)
}

fn file_stem(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("/buckets/t1/docs/report.pdf"), "report");
        assert_eq!(file_stem("/buckets/t1/docs/noext"), "noext");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
    }

    #[test]
    fn test_event_timestamp_conversion() {
        let raw = serde_json::json!({
            "event_type": "create",
            "path": "/buckets/t1/u/a.txt",
            "timestamp": 1700000000.5
        });
        let event = StorageEvent::from_raw(&raw).unwrap();
        let ts = event_timestamp(&event);
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }
}
