// Copyright (c) 2025 - Cowboy AI, Inc.

//! Embedding provider interface
//!
//! Embedding models are external collaborators; the core consumes them
//! through [`EmbeddingProvider`] and resolves providers by name through an
//! explicit [`EmbeddingRegistry`] populated at startup. The `default`
//! provider name resolves to whatever the registry was configured with.
//!
//! [`HashEmbeddingProvider`] is a deterministic local provider used for
//! embedded deployments and tests; it produces stable vectors from token
//! hashes so idempotence properties are observable without a model backend.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::errors::{PlatformError, PlatformResult};

/// A named embedding model
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier, e.g. `text-embedding-ada-002`
    fn name(&self) -> &str;

    /// Output vector dimension
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input
    async fn embed(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>>;
}

/// Process-wide embedding provider registry
#[derive(Clone)]
pub struct EmbeddingRegistry {
    providers: Arc<DashMap<String, Arc<dyn EmbeddingProvider>>>,
    default_provider: String,
}

impl EmbeddingRegistry {
    pub fn new(default_provider: &str) -> Self {
        Self {
            providers: Arc::new(DashMap::new()),
            default_provider: default_provider.to_string(),
        }
    }

    /// Registry with only the deterministic local provider installed
    pub fn with_local_default() -> Self {
        let registry = Self::new(HashEmbeddingProvider::NAME);
        registry.register(Arc::new(HashEmbeddingProvider::default()));
        registry
    }

    pub fn register(&self, provider: Arc<dyn EmbeddingProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Resolve a provider by name; `default` maps to the configured default
    pub fn get(&self, name: &str) -> PlatformResult<Arc<dyn EmbeddingProvider>> {
        let resolved = if name == "default" {
            self.default_provider.as_str()
        } else {
            name
        };
        self.providers
            .get(resolved)
            .map(|p| p.clone())
            .ok_or_else(|| PlatformError::EmbeddingUnavailable(format!("no provider {resolved}")))
    }

    /// The canonical name the `default` alias resolves to
    pub fn resolve_name(&self, name: &str) -> String {
        if name == "default" {
            self.default_provider.clone()
        } else {
            name.to_string()
        }
    }
}

/// Deterministic token-hash embedding provider
///
/// Vectors are L2-normalized bags of hashed tokens, so identical text yields
/// identical vectors and token overlap yields cosine similarity.
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub const NAME: &'static str = "hash-local";

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Cosine similarity between two vectors; 0 when dimensions differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_provider_is_deterministic() {
        let provider = HashEmbeddingProvider::default();
        let texts = vec!["the quick brown fox".to_string()];
        let a = provider.embed(&texts).await.unwrap();
        let b = provider.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 256);
    }

    #[tokio::test]
    async fn test_similar_text_scores_higher() {
        let provider = HashEmbeddingProvider::default();
        let texts = vec![
            "storage worker processes files".to_string(),
            "the storage worker processes small files".to_string(),
            "ed25519 signature verification".to_string(),
        ];
        let vectors = provider.embed(&texts).await.unwrap();
        let close = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(close > far);
    }

    #[test]
    fn test_registry_default_alias() {
        let registry = EmbeddingRegistry::with_local_default();
        let provider = registry.get("default").unwrap();
        assert_eq!(provider.name(), HashEmbeddingProvider::NAME);
        assert!(registry.get("missing-model").is_err());
        assert_eq!(registry.resolve_name("default"), HashEmbeddingProvider::NAME);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        let v = [0.6f32, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
