//! Remote controller service trait.
//!
//! A remote controller describes how to reach an NVMe-oF subsystem: its
//! transport, multipath policy, digests and optional TLS key.  It has no
//! engine device of its own; the engine only learns about it when paths are
//! attached, see [`crate::path`].

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::transport::CallContext;
use crate::types::{
    CreateRequest, DeleteRequest, GetRequest, ListRequest, ListResponse, RemoteController,
    StatsRequest, UpdateRequest, VolumeStats,
};

/// Remote controller service.
#[async_trait]
pub trait RemoteControllerService: Send + Sync {
    async fn create_remote_controller(
        &self,
        ctx: &CallContext,
        req: CreateRequest<RemoteController>,
    ) -> Result<RemoteController, BridgeError>;

    async fn get_remote_controller(
        &self,
        ctx: &CallContext,
        req: GetRequest,
    ) -> Result<RemoteController, BridgeError>;

    /// Changes apply to paths created afterwards.
    async fn update_remote_controller(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<RemoteController>,
    ) -> Result<RemoteController, BridgeError>;

    /// Fails with `FailedPrecondition` while any path references the
    /// controller.
    async fn delete_remote_controller(
        &self,
        ctx: &CallContext,
        req: DeleteRequest,
    ) -> Result<(), BridgeError>;

    async fn list_remote_controllers(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<RemoteController>, BridgeError>;

    /// Controllers have no engine telemetry; every counter is `-1`.
    async fn stats_remote_controller(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError>;
}
