//! Shared test fixtures

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use p8fs_core::embeddings::EmbeddingRegistry;
use p8fs_core::errors::{PlatformError, PlatformResult};
use p8fs_core::object_store::{DirEntry, DownloadedObject, ObjectPath, ObjectStat, ObjectStore};
use p8fs_core::repository::{EntityStore, MemoryStore, TenantRepository};
use p8fs_core::worker::{
    DocumentProcessorRegistry, EngramProcessor, FileProcessor, ParserRegistry, TextParser,
};

/// In-memory object store for pipeline tests
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.objects.insert(path.to_string(), content.into());
    }

    pub fn remove(&self, path: &str) {
        self.objects.remove(path);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(
        &self,
        path: &ObjectPath,
        tenant_id: &str,
    ) -> PlatformResult<DownloadedObject> {
        if path.tenant_id() != tenant_id {
            return Err(PlatformError::InvalidPath(path.to_string()));
        }
        match self.objects.get(path.as_str()) {
            Some(content) => Ok(DownloadedObject {
                size_bytes: content.len() as u64,
                content: content.clone(),
            }),
            None => Err(PlatformError::ObjectNotFound(path.to_string())),
        }
    }

    async fn head(&self, path: &ObjectPath, tenant_id: &str) -> PlatformResult<ObjectStat> {
        let object = self.download(path, tenant_id).await?;
        Ok(ObjectStat {
            size: object.size_bytes,
            content_type: None,
            etag: None,
            mtime: None,
        })
    }

    async fn list(&self, prefix: &str) -> PlatformResult<Vec<DirEntry>> {
        let normalized = format!("/{}", prefix.trim_matches('/'));
        let mut entries = Vec::new();
        for entry in self.objects.iter() {
            if let Some(rest) = entry.key().strip_prefix(&format!("{normalized}/")) {
                if !rest.contains('/') {
                    entries.push(DirEntry {
                        full_path: entry.key().clone(),
                        mtime: None,
                        mode: 0,
                        file_size: entry.value().len() as u64,
                        mime: Some("application/octet-stream".into()),
                        chunks: Some(serde_json::json!(1)),
                    });
                }
            }
        }
        Ok(entries)
    }
}

/// A file processor wired to in-memory backends, chunking every ~5 words
pub struct Fixture {
    pub processor: FileProcessor,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
}

pub fn fixture(tenant_id: &str) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let entity_store: Arc<dyn EntityStore> = store.clone();
    let objects = Arc::new(MemoryObjectStore::new());
    let embeddings = EmbeddingRegistry::with_local_default();

    let files = TenantRepository::new(entity_store.clone(), embeddings.clone(), tenant_id);
    let resources = TenantRepository::new(entity_store.clone(), embeddings.clone(), tenant_id);

    let parsers = ParserRegistry::new();
    parsers.register(Arc::new(TextParser::new(5)));

    let mut processors = DocumentProcessorRegistry::new();
    processors.register(Arc::new(EngramProcessor::new(resources.clone())));

    Fixture {
        processor: FileProcessor::new(
            objects.clone(),
            files,
            resources,
            Arc::new(parsers),
            Arc::new(processors),
        ),
        store,
        objects,
    }
}
