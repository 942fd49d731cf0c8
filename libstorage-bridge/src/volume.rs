//! Volume service trait.
//!
//! Backend volumes are block devices created directly in the engine (AIO
//! file-backed, null, malloc).  Each one is the bottom of its own
//! composition stack, see [`crate::stack`].

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::transport::CallContext;
use crate::types::{
    CreateRequest, DeleteRequest, GetRequest, ListRequest, ListResponse, StatsRequest,
    UpdateRequest, Volume, VolumeStats,
};

/// Volume service: backend device lifecycle.
#[async_trait]
pub trait VolumeService: Send + Sync {
    /// Create a backend device.  Creating an existing name returns the
    /// stored volume without touching the engine.
    async fn create_volume(
        &self,
        ctx: &CallContext,
        req: CreateRequest<Volume>,
    ) -> Result<Volume, BridgeError>;

    /// Fetch a volume, refreshed from the engine.
    async fn get_volume(&self, ctx: &CallContext, req: GetRequest) -> Result<Volume, BridgeError>;

    /// Recreate a volume with the masked fields changed.
    ///
    /// Fails with `FailedPrecondition` while overlays sit on top of it.
    async fn update_volume(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<Volume>,
    ) -> Result<Volume, BridgeError>;

    /// Destroy a backend device.
    ///
    /// Fails with `FailedPrecondition` while overlays sit on top of it.
    async fn delete_volume(&self, ctx: &CallContext, req: DeleteRequest) -> Result<(), BridgeError>;

    /// List backend devices known to the engine.
    async fn list_volumes(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<Volume>, BridgeError>;

    async fn stats_volume(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError>;
}
