use async_trait::async_trait;
use tracing::warn;

use crate::engine::{SPDK_GET_VERSION, VersionResult};
use crate::error::{AdapterError, BridgeError};
use crate::identity::IdentityService;
use crate::transport::{CallContext, call_as};
use crate::types::PluginInfo;

use super::StorageBridge;

/// Name reported by [`IdentityService::get_plugin_info`].
pub const PLUGIN_NAME: &str = "rk8s.storage.bridge";
/// Version reported by [`IdentityService::get_plugin_info`].
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

impl StorageBridge {
    async fn engine_version(&self, ctx: &CallContext) -> Result<String, AdapterError> {
        let version: VersionResult = call_as(self.engine(), ctx, SPDK_GET_VERSION, &()).await?;
        Ok(version.version)
    }
}

#[async_trait]
impl IdentityService for StorageBridge {
    async fn get_plugin_info(&self, ctx: &CallContext) -> Result<PluginInfo, BridgeError> {
        let engine_version = match self.engine_version(ctx).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "engine version unavailable");
                None
            }
        };
        Ok(PluginInfo {
            name: PLUGIN_NAME.to_owned(),
            vendor_version: PLUGIN_VERSION.to_owned(),
            engine_version,
        })
    }

    async fn probe(&self, ctx: &CallContext) -> Result<bool, BridgeError> {
        match self.engine_version(ctx).await {
            Ok(_) => Ok(true),
            Err(e @ (AdapterError::Cancelled { .. } | AdapterError::DeadlineExceeded { .. })) => {
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "engine probe failed");
                Ok(false)
            }
        }
    }
}
