// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject, stream, and consumer names for storage event queues
//!
//! Storage events flow through one main subject and three size-partitioned
//! tier subjects:
//!
//! ```text
//! p8fs.storage.events ──router──→ p8fs.storage.events.{small,medium,large}
//! ```
//!
//! Each subject is bound to its own work-queue stream so that the router and
//! the per-tier workers can consume independently with explicit-ack pull
//! consumers.
//!
//! # Examples
//!
//! ```rust
//! use p8fs_core::subjects::Tier;
//!
//! assert_eq!(Tier::for_size(100), Tier::Small);
//! assert_eq!(Tier::Small.subject(), "p8fs.storage.events.small");
//! assert_eq!(Tier::Large.stream(), "P8FS_STORAGE_EVENTS_LARGE");
//! ```

use std::fmt;
use std::time::Duration;

/// Main subject carrying normalized storage events from the source watcher
pub const STORAGE_EVENTS_SUBJECT: &str = "p8fs.storage.events";

/// Main stream bound to [`STORAGE_EVENTS_SUBJECT`]
pub const STORAGE_EVENTS_STREAM: &str = "P8FS_STORAGE_EVENTS";

/// Shared durable consumer name used by every router instance.
///
/// On work-queue streams multiple instances can share one consumer and NATS
/// load-balances messages between them. Router identity appears only in logs
/// and routing metadata.
pub const ROUTER_CONSUMER: &str = "tiered-storage-router";

/// Consumer names from previous router deployments, force-deleted at startup.
/// A crashed predecessor's consumer state can stall redelivery indefinitely.
pub const LEGACY_ROUTER_CONSUMERS: &[&str] = &["simple-tiered-router", "router-consumer"];

/// File size tiers used to partition processing work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Files up to 100 MiB
    Small,
    /// Files over 100 MiB up to 1 GiB
    Medium,
    /// Files over 1 GiB
    Large,
}

impl Tier {
    /// Upper bound of the small tier (100 MiB)
    pub const SMALL_MAX: u64 = 100 * 1024 * 1024;

    /// Upper bound of the medium tier (1 GiB)
    pub const MEDIUM_MAX: u64 = 1024 * 1024 * 1024;

    /// All tiers, small to large
    pub const ALL: [Tier; 3] = [Tier::Small, Tier::Medium, Tier::Large];

    /// Choose the tier for a file size in bytes
    pub fn for_size(file_size_bytes: u64) -> Self {
        if file_size_bytes <= Self::SMALL_MAX {
            Tier::Small
        } else if file_size_bytes <= Self::MEDIUM_MAX {
            Tier::Medium
        } else {
            Tier::Large
        }
    }

    /// Tier subject, e.g. `p8fs.storage.events.small`
    pub fn subject(&self) -> String {
        format!("{}.{}", STORAGE_EVENTS_SUBJECT, self)
    }

    /// Tier stream name, e.g. `P8FS_STORAGE_EVENTS_SMALL`
    pub fn stream(&self) -> String {
        format!("{}_{}", STORAGE_EVENTS_STREAM, self.to_string().to_uppercase())
    }

    /// Durable consumer name for this tier's workers
    pub fn consumer(&self) -> &'static str {
        match self {
            Tier::Small => "small-workers",
            Tier::Medium => "medium-workers",
            Tier::Large => "large-workers",
        }
    }

    /// Worker configuration for this tier
    pub fn worker_config(&self) -> WorkerTierConfig {
        match self {
            Tier::Small => WorkerTierConfig {
                processing_timeout: Duration::from_secs(300),
                batch_size: 10,
                max_ack_pending: 100,
                max_deliver: 3,
            },
            Tier::Medium => WorkerTierConfig {
                processing_timeout: Duration::from_secs(600),
                batch_size: 5,
                max_ack_pending: 50,
                max_deliver: 3,
            },
            Tier::Large => WorkerTierConfig {
                processing_timeout: Duration::from_secs(1800),
                batch_size: 1,
                max_ack_pending: 10,
                max_deliver: 3,
            },
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Small => write!(f, "small"),
            Tier::Medium => write!(f, "medium"),
            Tier::Large => write!(f, "large"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(Tier::Small),
            "medium" => Ok(Tier::Medium),
            "large" => Ok(Tier::Large),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Per-tier worker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTierConfig {
    /// Per-message processing budget; also the consumer ack_wait
    pub processing_timeout: Duration,

    /// Messages fetched per pull
    pub batch_size: usize,

    /// Bound on in-flight unacknowledged messages
    pub max_ack_pending: i64,

    /// Redeliveries before the bus gives up on a message
    pub max_deliver: i64,
}

/// Router processing configuration
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Single-message fetch timeout
    pub fetch_timeout: Duration,

    /// Consecutive processing errors before the router fails hard
    pub max_consecutive_errors: u32,

    /// Ack wait on the shared router consumer
    pub ack_wait: Duration,

    /// Redeliveries for routing (more generous than workers)
    pub max_deliver: i64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            max_consecutive_errors: 3,
            ack_wait: Duration::from_secs(60),
            max_deliver: 5,
        }
    }
}
