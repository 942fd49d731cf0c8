//! Paths: NVMe-oF attachments of a remote controller.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::engine::*;
use crate::error::BridgeError;
use crate::integrity::{
    PskFile, check_transport, controller_name, multipath_param, owning_controller, paths_parent,
};
use crate::naming::resolve_system_id;
use crate::path::PathService;
use crate::registry::{Provisioner, check_destroyed};
use crate::transport::{CallContext, call_as};
use crate::types::*;

use super::StorageBridge;

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

fn detach_params(path: &Path) -> NvmeDetachParams {
    let network = path.transport.channel() == Channel::Network;
    NvmeDetachParams {
        name: resolve_system_id(&path.controller_name_ref).to_owned(),
        trtype: path.transport.engine_name().to_owned(),
        traddr: path.traddr.clone(),
        adrfam: path.adrfam.map(|a| a.engine_name().to_owned()),
        trsvcid: path.trsvcid.filter(|_| network).map(|p| p.to_string()),
        subnqn: non_empty(&path.subnqn).filter(|_| network),
    }
}

#[async_trait]
impl Provisioner<Path> for StorageBridge {
    /// Paths hold their controller's lock so the controller cannot vanish
    /// and the path count stays put while the engine call runs.
    fn dependencies(&self, path: &Path) -> Vec<String> {
        vec![path.controller_name_ref.clone()]
    }

    #[instrument(skip_all, fields(name = %path.name, controller = %path.controller_name_ref))]
    async fn provision(&self, ctx: &CallContext, path: &mut Path) -> Result<(), BridgeError> {
        let controller = self
            .controllers
            .lookup(&path.controller_name_ref)
            .ok_or_else(|| {
                BridgeError::not_found(format!(
                    "remote controller {} not found",
                    path.controller_name_ref
                ))
            })?;
        check_transport(&controller, path)?;

        let existing = self.paths.count_where(|p| {
            p.controller_name_ref == controller.name && p.name != path.name
        });
        let multipath = multipath_param(&controller, existing);
        let psk = controller.psk.as_deref().map(PskFile::write).transpose()?;

        let network = path.transport.channel() == Channel::Network;
        let params = NvmeAttachParams {
            name: controller.system_id().to_owned(),
            trtype: path.transport.engine_name().to_owned(),
            traddr: path.traddr.clone(),
            adrfam: path.adrfam.map(|a| a.engine_name().to_owned()),
            trsvcid: path.trsvcid.filter(|_| network).map(|p| p.to_string()),
            subnqn: non_empty(&path.subnqn).filter(|_| network),
            hostnqn: non_empty(&path.hostnqn),
            hdgst: controller.hdgst,
            ddgst: controller.ddgst,
            psk: psk.as_ref().map(PskFile::path_string),
            multipath,
        };
        let bdevs: Vec<String> =
            call_as(self.engine(), ctx, BDEV_NVME_ATTACH_CONTROLLER, &params).await?;
        drop(psk);
        debug!(?bdevs, existing, "path attached");
        Ok(())
    }

    #[instrument(skip_all, fields(name = %path.name))]
    async fn deprovision(
        &self,
        ctx: &CallContext,
        path: &Path,
        allow_missing: bool,
    ) -> Result<(), BridgeError> {
        let result = call_as(
            self.engine(),
            ctx,
            BDEV_NVME_DETACH_CONTROLLER,
            &detach_params(path),
        )
        .await;
        check_destroyed(path.system_id(), result, allow_missing)
    }
}

#[async_trait]
impl PathService for StorageBridge {
    async fn create_path(&self, ctx: &CallContext, req: CreateRequest<Path>) -> Result<Path, BridgeError> {
        if req.parent.is_empty() {
            return Err(BridgeError::validation("missing required field: parent"));
        }
        let controller = controller_name(&req.parent);
        let mut path = req.resource;
        path.controller_name_ref.clone_from(&controller);
        self.paths
            .create(ctx, self, &paths_parent(&controller), &req.id, path)
            .await
    }

    async fn get_path(&self, ctx: &CallContext, req: GetRequest) -> Result<Path, BridgeError> {
        self.paths.get(ctx, self, &req.name).await
    }

    async fn update_path(&self, ctx: &CallContext, req: UpdateRequest<Path>) -> Result<Path, BridgeError> {
        let mut path = req.resource;
        if path.controller_name_ref.is_empty() {
            let owner = owning_controller(&path.name).ok_or_else(|| {
                BridgeError::validation(format!("{} is not a path name", path.name))
            })?;
            path.controller_name_ref = owner.to_owned();
        }
        let parent = paths_parent(&path.controller_name_ref);
        self.paths
            .update(ctx, self, &parent, path, &req.update_mask, req.allow_missing)
            .await
    }

    async fn delete_path(&self, ctx: &CallContext, req: DeleteRequest) -> Result<(), BridgeError> {
        self.paths
            .delete(ctx, self, &req.name, req.allow_missing)
            .await
    }

    async fn list_paths(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<Path>, BridgeError> {
        let scope = paths_parent(&controller_name(&req.parent));
        self.paths.list(ctx, self, &req, &scope).await
    }

    async fn stats_path(&self, ctx: &CallContext, req: StatsRequest) -> Result<VolumeStats, BridgeError> {
        self.paths.stats(ctx, self, &req.name).await
    }
}
