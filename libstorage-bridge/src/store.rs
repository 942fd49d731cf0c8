//! Durable key-value collaborator.
//!
//! Registries keep their canonical state in memory and write every change
//! through to a [`KvStore`] when one is configured.  The bridge only needs
//! point reads, writes and deletes; how a store persists them is up to the
//! implementation.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::BridgeError;

/// Minimal key-value interface consumed by the registries.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BridgeError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BridgeError>;

    /// Remove `key`.  Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BridgeError>;
}

/// In-process [`KvStore`], used by tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BridgeError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BridgeError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BridgeError> {
        self.entries.remove(key);
        Ok(())
    }
}
