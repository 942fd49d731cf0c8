//! Resource services implemented on top of the storage engine.
//!
//! [`StorageBridge`] owns one [`ResourceRegistry`] per kind, the shared
//! keyed locks and pagination tokens, and the composition stacks.  It
//! implements every service trait, plus one [`Provisioner`] per kind that
//! the registries call back into.
//!
//! [`Provisioner`]: crate::registry::Provisioner

mod controller;
mod encrypted;
mod identity;
mod path;
mod qos;
mod volume;

use std::sync::Arc;

use tracing::info;

use crate::config::{BRIDGE_CONFIG, BridgeConfig};
use crate::engine::{BDEV_GET_IOSTAT, IoStatResult, NameParams};
use crate::error::BridgeError;
use crate::pagination::PageTokenStore;
use crate::registry::{KeyedLocks, ResourceRegistry};
use crate::stack::{SharedStack, StackArena, StackId};
use crate::store::KvStore;
use crate::transport::{CallContext, EngineClient, JsonRpcClient, call_as};
use crate::types::{
    EncryptedVolume, Path, QosVolume, RemoteController, Resource, Volume, VolumeStats,
};

pub use identity::{PLUGIN_NAME, PLUGIN_VERSION};

/// Storage bridge backed by a JSON-RPC storage engine.
///
/// # Thread safety
///
/// All state sits behind concurrent maps and per-name or per-lineage locks,
/// so one bridge can be shared across tasks behind an [`Arc`].
pub struct StorageBridge {
    engine: Arc<dyn EngineClient>,
    stacks: StackArena,
    volumes: ResourceRegistry<Volume>,
    controllers: ResourceRegistry<RemoteController>,
    paths: ResourceRegistry<Path>,
    encrypted: ResourceRegistry<EncryptedVolume>,
    qos: ResourceRegistry<QosVolume>,
}

impl StorageBridge {
    /// Create a bridge talking to `engine`.
    pub fn new(engine: Arc<dyn EngineClient>, config: &BridgeConfig) -> Self {
        Self::build(engine, config, None)
    }

    /// Create a bridge whose registries write through to `store`.
    pub fn with_store(
        engine: Arc<dyn EngineClient>,
        config: &BridgeConfig,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self::build(engine, config, Some(store))
    }

    /// Create a bridge connected to the engine socket named in `config`.
    pub fn connect(config: &BridgeConfig) -> Self {
        info!(engine = %config.engine_addr, "storage bridge configured");
        Self::new(Arc::new(JsonRpcClient::from_config(config)), config)
    }

    /// Create a bridge from the process-wide [`BRIDGE_CONFIG`].
    pub fn from_env() -> Self {
        Self::connect(&BRIDGE_CONFIG)
    }

    fn build(
        engine: Arc<dyn EngineClient>,
        config: &BridgeConfig,
        store: Option<Arc<dyn KvStore>>,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let tokens = Arc::new(PageTokenStore::new(config.page_token_capacity));
        Self {
            engine,
            stacks: StackArena::new(),
            volumes: registry(&locks, &tokens, &store),
            controllers: registry(&locks, &tokens, &store),
            paths: registry(&locks, &tokens, &store),
            encrypted: registry(&locks, &tokens, &store),
            qos: registry(&locks, &tokens, &store),
        }
    }

    /// The composition stacks of all lineages.
    pub fn stacks(&self) -> &StackArena {
        &self.stacks
    }

    fn engine(&self) -> &dyn EngineClient {
        self.engine.as_ref()
    }

    /// Lineage that the volume named `volume` belongs to.
    fn lineage(&self, volume: &str) -> Result<(StackId, SharedStack), BridgeError> {
        self.stacks
            .lineage_of(volume)
            .ok_or_else(|| BridgeError::not_found(format!("volume {volume} not found")))
    }

    /// Engine device exposed by the stack node of `resource`.
    async fn node_bdev(&self, resource: &str) -> Option<String> {
        let (_, stack) = self.stacks.lineage_of(resource)?;
        let stack = stack.lock().await;
        stack
            .nodes()
            .iter()
            .find(|n| n.resource_name == resource)
            .map(|n| n.bdev_name.clone())
    }

    /// I/O counters of the engine device `bdev`.
    async fn iostat(&self, ctx: &CallContext, bdev: &str) -> Result<VolumeStats, BridgeError> {
        let result: IoStatResult =
            call_as(self.engine(), ctx, BDEV_GET_IOSTAT, &NameParams::new(bdev)).await?;
        result
            .bdevs
            .iter()
            .find(|s| s.name == bdev)
            .map(VolumeStats::from)
            .ok_or_else(|| BridgeError::not_found(format!("no statistics reported for {bdev}")))
    }
}

fn registry<T: Resource>(
    locks: &Arc<KeyedLocks>,
    tokens: &Arc<PageTokenStore>,
    store: &Option<Arc<dyn KvStore>>,
) -> ResourceRegistry<T> {
    let registry = ResourceRegistry::new(Arc::clone(locks), Arc::clone(tokens));
    match store {
        Some(store) => registry.with_store(Arc::clone(store)),
        None => registry,
    }
}
