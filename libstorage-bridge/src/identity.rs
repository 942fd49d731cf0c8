//! Identity service trait.
//!
//! Lets callers discover the bridge and check that the engine behind it
//! answers.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::transport::CallContext;
use crate::types::PluginInfo;

/// Identity service: bridge metadata and health.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Return the bridge name and version, plus the engine version when the
    /// engine is reachable.
    async fn get_plugin_info(&self, ctx: &CallContext) -> Result<PluginInfo, BridgeError>;

    /// Liveness probe.  Returns `true` when the engine answers
    /// `spdk_get_version`.
    async fn probe(&self, ctx: &CallContext) -> Result<bool, BridgeError>;
}
