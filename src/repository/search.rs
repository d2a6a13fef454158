// Copyright (c) 2025 - Cowboy AI, Inc.

//! Semantic and lexical search over entity rows
//!
//! Semantic search embeds the query text with the model's configured
//! provider and scores it against the sidecar embedding rows; results above
//! the threshold come back ordered by score descending. The lexical path is
//! a term-overlap fallback for exact-phrase lookups.

use serde_json::Value;

use crate::embeddings::cosine_similarity;
use crate::errors::{PlatformError, PlatformResult};
use crate::models::Entity;

use super::TenantRepository;

/// Search strategy hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryHint {
    Semantic,
    Lexical,
}

/// An entity with its search score
#[derive(Debug, Clone)]
pub struct ScoredEntity<M> {
    pub entity: M,
    pub score: f32,
}

impl<M: Entity> TenantRepository<M> {
    /// Score the query against this model's embedding fields.
    ///
    /// Returns entities whose best field score is at least `threshold`,
    /// ordered by score descending, at most `limit`.
    pub async fn semantic_search(
        &self,
        query_text: &str,
        limit: usize,
        threshold: f32,
    ) -> PlatformResult<Vec<ScoredEntity<M>>> {
        let tenant = self.tenant_predicate()?.map(str::to_string);
        let schema = M::model_schema();

        if schema.embedding_fields.is_empty() {
            return Ok(Vec::new());
        }

        let embedding_rows = self.store().scan("embeddings").await?;
        let mut scored: Vec<(String, f32)> = Vec::new();

        for embedding_field in &schema.embedding_fields {
            let provider = self.embeddings().get(embedding_field.provider)?;
            let provider_name = provider.name().to_string();

            let query_vectors = provider.embed(&[query_text.to_string()]).await?;
            let Some(query_vector) = query_vectors.first() else {
                continue;
            };

            for row in &embedding_rows {
                if row.get("field_name").and_then(Value::as_str) != Some(embedding_field.field) {
                    continue;
                }
                if row.get("embedding_provider").and_then(Value::as_str)
                    != Some(provider_name.as_str())
                {
                    continue;
                }
                if let Some(tenant) = tenant.as_deref() {
                    if row.get("tenant_id").and_then(Value::as_str) != Some(tenant) {
                        continue;
                    }
                }

                let Some(entity_id) = row.get("entity_id").and_then(Value::as_str) else {
                    continue;
                };
                let Some(vector) = row.get("embedding_vector").and_then(Value::as_array) else {
                    continue;
                };
                let vector: Vec<f32> = vector
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();

                let score = cosine_similarity(query_vector, &vector);
                if score >= threshold {
                    match scored.iter_mut().find(|(id, _)| id.as_str() == entity_id) {
                        Some((_, best)) => *best = best.max(score),
                        None => scored.push((entity_id.to_string(), score)),
                    }
                }
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for (entity_id, score) in scored {
            if let Some(entity) = self.get(&entity_id).await? {
                results.push(ScoredEntity { entity, score });
            }
        }
        Ok(results)
    }

    /// Convenience wrapper dispatching on the strategy hint
    pub async fn query(
        &self,
        query_text: &str,
        hint: QueryHint,
        limit: usize,
        threshold: f32,
    ) -> PlatformResult<Vec<ScoredEntity<M>>> {
        match hint {
            QueryHint::Semantic => self.semantic_search(query_text, limit, threshold).await,
            QueryHint::Lexical => self.lexical_search(query_text, limit).await,
        }
    }

    /// Term-overlap search over the embedding-bearing text fields
    async fn lexical_search(
        &self,
        query_text: &str,
        limit: usize,
    ) -> PlatformResult<Vec<ScoredEntity<M>>> {
        let tenant = self.tenant_predicate()?.map(str::to_string);
        let schema = M::model_schema();

        let terms: Vec<String> = query_text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.store().scan(schema.table_name).await?;
        let mut scored: Vec<(Value, f32)> = Vec::new();

        for row in rows {
            if let Some(tenant) = tenant.as_deref() {
                if row.get("tenant_id").and_then(Value::as_str) != Some(tenant) {
                    continue;
                }
            }

            let mut hits = 0usize;
            for field in &schema.embedding_fields {
                if let Some(text) = row.get(field.field).and_then(Value::as_str) {
                    let haystack = text.to_lowercase();
                    hits += terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                }
            }
            if hits > 0 {
                scored.push((row, hits as f32 / terms.len() as f32));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(row, score)| {
                serde_json::from_value(row)
                    .map(|entity| ScoredEntity { entity, score })
                    .map_err(|e| PlatformError::Deserialization(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingRegistry;
    use crate::models::Resource;
    use crate::repository::MemoryStore;
    use std::sync::Arc;

    async fn seeded_repo() -> TenantRepository<Resource> {
        let repo: TenantRepository<Resource> = TenantRepository::new(
            Arc::new(MemoryStore::new()),
            EmbeddingRegistry::with_local_default(),
            "t1",
        );
        let docs = [
            ("meeting notes about storage tiers and routing", 0u32),
            ("device authorization flow with mobile approval", 1),
            ("quarterly budget spreadsheet details", 2),
        ];
        for (content, ordinal) in docs {
            let r = Resource::new(
                "t1",
                &format!("doc-{ordinal}"),
                "chunk",
                content,
                ordinal,
                "/buckets/t1/docs/corpus.txt",
            );
            repo.upsert(&r).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_semantic_search_orders_by_score() {
        let repo = seeded_repo().await;
        let results = repo
            .semantic_search("storage tier routing", 10, 0.05)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].entity.ordinal, 0);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_threshold_filters_everything() {
        let repo = seeded_repo().await;
        let results = repo
            .semantic_search("completely unrelated xyzzy", 10, 0.99)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_lexical_query_hint() {
        let repo = seeded_repo().await;
        let results = repo
            .query("mobile approval", QueryHint::Lexical, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.ordinal, 1);
    }
}
