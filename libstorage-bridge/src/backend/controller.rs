//! Remote controllers.  Registry-only: the engine learns about a controller
//! through the paths attached to it.

use async_trait::async_trait;
use tracing::debug;

use crate::controller::RemoteControllerService;
use crate::error::BridgeError;
use crate::integrity::check_no_paths;
use crate::naming::collection_parent;
use crate::registry::Provisioner;
use crate::transport::CallContext;
use crate::types::*;

use super::StorageBridge;

fn controllers_parent() -> String {
    collection_parent(ResourceKind::RemoteController.collection())
}

#[async_trait]
impl Provisioner<RemoteController> for StorageBridge {
    async fn provision(
        &self,
        _ctx: &CallContext,
        controller: &mut RemoteController,
    ) -> Result<(), BridgeError> {
        debug!(name = %controller.name, transport = ?controller.transport, "controller recorded");
        Ok(())
    }

    async fn deprovision(
        &self,
        _ctx: &CallContext,
        controller: &RemoteController,
        _allow_missing: bool,
    ) -> Result<(), BridgeError> {
        debug!(name = %controller.name, "controller released");
        Ok(())
    }

    async fn check_delete(&self, controller: &RemoteController) -> Result<(), BridgeError> {
        let paths = self
            .paths
            .count_where(|p| p.controller_name_ref == controller.name);
        check_no_paths(&controller.name, paths)
    }
}

#[async_trait]
impl RemoteControllerService for StorageBridge {
    async fn create_remote_controller(
        &self,
        ctx: &CallContext,
        req: CreateRequest<RemoteController>,
    ) -> Result<RemoteController, BridgeError> {
        self.controllers
            .create(ctx, self, &controllers_parent(), &req.id, req.resource)
            .await
    }

    async fn get_remote_controller(
        &self,
        ctx: &CallContext,
        req: GetRequest,
    ) -> Result<RemoteController, BridgeError> {
        self.controllers.get(ctx, self, &req.name).await
    }

    async fn update_remote_controller(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<RemoteController>,
    ) -> Result<RemoteController, BridgeError> {
        self.controllers
            .update(ctx, self, &controllers_parent(), req.resource, &req.update_mask, req.allow_missing)
            .await
    }

    async fn delete_remote_controller(
        &self,
        ctx: &CallContext,
        req: DeleteRequest,
    ) -> Result<(), BridgeError> {
        self.controllers
            .delete(ctx, self, &req.name, req.allow_missing)
            .await
    }

    async fn list_remote_controllers(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<RemoteController>, BridgeError> {
        self.controllers
            .list(ctx, self, &req, &controllers_parent())
            .await
    }

    async fn stats_remote_controller(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError> {
        self.controllers.stats(ctx, self, &req.name).await
    }
}
