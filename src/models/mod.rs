// Copyright (c) 2025 - Cowboy AI, Inc.

//! Platform Entity Models
//!
//! Tenant-scoped entities with self-describing schemas. Every model exposes
//! a [`ModelSchema`] through the [`Entity`] trait so the repository can plan
//! upserts (which fields carry embeddings, which key identifies a row) and
//! enforce tenant isolation without knowing concrete types.
//!
//! Identifiers are stable UUIDv5 values derived from a namespace hash of
//! `(tenant_id, natural_key)` so that re-ingesting the same logical artifact
//! is idempotent (see [`ids`]).
//!
//! # Models
//!
//! - [`Tenant`] - global tenant record with an Ed25519 public key
//! - [`Device`] - enrolled device with monotonic trust level
//! - [`FileRecord`] - one row per ingested object-store file
//! - [`Resource`] - a content chunk with inline graph edges
//! - [`Moment`] - a time-bounded resource with presence metadata
//! - [`InlineEdge`] - a label-keyed graph edge embedded on its source
//! - [`EmbeddingRecord`] - sidecar embedding row per (entity, field, provider)
//! - [`PendingDeviceRequest`] - ephemeral device-flow state (KV, TTL)

pub mod content;
pub mod device_auth;
pub mod ids;
pub mod schema;
pub mod tenant;

pub use content::{EmbeddingRecord, FileRecord, InlineEdge, Moment, Resource};
pub use device_auth::{DeviceAuthStatus, PendingDeviceRequest};
pub use ids::{derived_device_id, derived_tenant_id, embedding_id, file_id, resource_id};
pub use schema::{EmbeddingField, Entity, FieldType, ModelRegistry, ModelSchema};
pub use tenant::{Device, Tenant, TrustLevel};

/// Register every platform model into a fresh registry.
///
/// Called once at process start; the registry is then shared read-only.
pub fn register_models() -> ModelRegistry {
    let registry = ModelRegistry::new();
    registry.register::<Tenant>();
    registry.register::<Device>();
    registry.register::<FileRecord>();
    registry.register::<Resource>();
    registry.register::<Moment>();
    registry.register::<EmbeddingRecord>();
    registry
}
