//! Path service trait.
//!
//! A path attaches one transport address of a remote controller in the
//! engine.  Paths are scoped under their controller:
//! `<controller name>/paths/<id>`.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::transport::CallContext;
use crate::types::{
    CreateRequest, DeleteRequest, GetRequest, ListRequest, ListResponse, Path, StatsRequest,
    UpdateRequest, VolumeStats,
};

/// Path service.
#[async_trait]
pub trait PathService: Send + Sync {
    /// Attach a path.  `req.parent` names the controller, either by full
    /// resource name or by id.
    ///
    /// Fails with `NotFound` when the controller does not exist and with
    /// `InvalidArgument` when the path's transport does not fit the
    /// controller's.
    async fn create_path(&self, ctx: &CallContext, req: CreateRequest<Path>) -> Result<Path, BridgeError>;

    async fn get_path(&self, ctx: &CallContext, req: GetRequest) -> Result<Path, BridgeError>;

    async fn update_path(&self, ctx: &CallContext, req: UpdateRequest<Path>) -> Result<Path, BridgeError>;

    async fn delete_path(&self, ctx: &CallContext, req: DeleteRequest) -> Result<(), BridgeError>;

    /// List the paths of the controller named by `req.parent`.
    async fn list_paths(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<Path>, BridgeError>;

    /// Paths have no engine telemetry; every counter is `-1`.
    async fn stats_path(&self, ctx: &CallContext, req: StatsRequest) -> Result<VolumeStats, BridgeError>;
}
