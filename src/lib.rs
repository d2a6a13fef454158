//! Core infrastructure for the P8FS multi-tenant content indexing platform
//!
//! This library provides the three tightly coupled subsystems of the P8FS
//! core:
//!
//! - **Tiered Storage Event Routing**: file-change events from the object
//!   store are normalized, published onto a main subject, and fanned out to
//!   size-partitioned work queues with strict delivery guarantees
//! - **Storage Workers**: per-tier consumers that download, parse, chunk,
//!   embed, and persist file content plus graph edges, idempotently
//! - **Authorization Core**: OAuth 2.1 device flow with mobile-approved
//!   enrollment, PKCE, short-lived signed tokens, and session-bound MCP
//!   tool invocations
//!
//! # Data Flow
//!
//! ```text
//! Ingest:  watcher → p8fs.storage.events → router → tier subject → worker
//!                                                                    │
//!                                              object store ◄────────┤
//!                                              repository  ◄─────────┘
//!
//! Auth:    client → device code → mobile approval (Ed25519) → tokens
//!                 → MCP gateway → tenant-scoped tools
//! ```
//!
//! # Modules
//!
//! - [`nats`] - event bus adapter (streams, durable pull consumers, ack/nak)
//! - [`subjects`] - subject/stream/consumer names and size tiers
//! - [`events`] - storage event wire model
//! - [`object_store`] - filer HTTP adapter with the bucket path grammar
//! - [`watcher`] - source watcher strategies (streaming, polling)
//! - [`router`] - tiered event router
//! - [`worker`] - per-tier storage workers, parsers, Engram processing
//! - [`models`] - entity models with self-describing schemas
//! - [`repository`] - tenant-scoped CRUD, search, and TTL KV storage
//! - [`embeddings`] - embedding provider interface
//! - [`auth`] - OAuth 2.1 authorization core
//! - [`mcp`] - session-bound MCP tool gateway
//! - [`errors`] - error types

// Core modules
pub mod auth;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod events;
pub mod mcp;
pub mod models;
pub mod nats;
pub mod object_store;
pub mod repository;
pub mod router;
pub mod subjects;
pub mod watcher;
pub mod worker;

// Re-export commonly used types
pub use auth::{AuthCore, AuthError, DeviceAuthService, TokenService};
pub use config::PlatformConfig;
pub use errors::{PlatformError, PlatformResult};
pub use events::{StorageEvent, StorageEventType, StoragePathInfo};
pub use models::{Entity, ModelRegistry};
pub use nats::{NatsClient, NatsConfig};
pub use object_store::{ObjectPath, ObjectStore, ObjectStoreClient};
pub use repository::{TenantRepository, Filter};
pub use router::TieredStorageRouter;
pub use subjects::Tier;
pub use worker::StorageEventWorker;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
