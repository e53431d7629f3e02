//! Distributed key-value store abstraction
//!
//! The claims cache only needs single-key reads and writes with a per-key
//! absolute expiration. Replication and consistency are the backend's concern.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process store for tests and single-node deployments
//! - `RedisStore` - Redis backend (feature `redis-store`)

mod memory;
#[cfg(feature = "redis-store")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Byte-oriented store with per-key absolute expiration
///
/// Entries past their expiration must read as absent.
#[async_trait]
pub trait DistributedStore: Send + Sync + std::fmt::Debug {
    /// Read the bytes stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` until `expires_at`, replacing any existing entry
    async fn set(&self, key: &str, value: Vec<u8>, expires_at: DateTime<Utc>) -> Result<()>;

    /// Remove the entry under `key`, if any
    async fn remove(&self, key: &str) -> Result<()>;
}
