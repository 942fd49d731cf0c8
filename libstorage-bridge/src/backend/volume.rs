//! Backend volumes: AIO, null and malloc devices.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::engine::*;
use crate::error::BridgeError;
use crate::naming::{build_resource_name, collection_parent};
use crate::registry::{Provisioner, check_destroyed};
use crate::stack::{BackendKind, VolumeNode};
use crate::transport::{CallContext, call_as};
use crate::types::*;
use crate::volume::VolumeService;

use super::StorageBridge;

fn volumes_parent() -> String {
    collection_parent(ResourceKind::Volume.collection())
}

fn delete_method(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Aio => BDEV_AIO_DELETE,
        BackendKind::Null => BDEV_NULL_DELETE,
        BackendKind::Malloc => BDEV_MALLOC_DELETE,
    }
}

/// Volume spec for an engine device, `None` for non-backend products.
fn spec_from_bdev(info: &BdevInfo) -> Option<VolumeSpec> {
    let block_size = info.block_size;
    let blocks_count = info.num_blocks;
    match info.product_name.as_str() {
        PRODUCT_AIO => Some(VolumeSpec::Aio {
            filename: String::new(),
            block_size,
            blocks_count,
        }),
        PRODUCT_NULL => Some(VolumeSpec::Null {
            block_size,
            blocks_count,
        }),
        PRODUCT_MALLOC => Some(VolumeSpec::Malloc {
            block_size,
            blocks_count,
        }),
        _ => None,
    }
}

/// Copy the engine's view of size and identity into `vol`.
fn merge_bdev(vol: &mut Volume, info: &BdevInfo) {
    match &mut vol.spec {
        VolumeSpec::Aio {
            block_size,
            blocks_count,
            ..
        }
        | VolumeSpec::Null {
            block_size,
            blocks_count,
        }
        | VolumeSpec::Malloc {
            block_size,
            blocks_count,
        } => {
            if info.block_size > 0 {
                *block_size = info.block_size;
            }
            *blocks_count = info.num_blocks;
        }
    }
    if info.uuid.is_some() {
        vol.uuid.clone_from(&info.uuid);
    }
}

impl StorageBridge {
    async fn query_bdev(&self, ctx: &CallContext, bdev: &str) -> Result<BdevInfo, BridgeError> {
        let found: Vec<BdevInfo> =
            call_as(self.engine(), ctx, BDEV_GET_BDEVS, &NameParams::new(bdev)).await?;
        found
            .into_iter()
            .find(|b| b.name == bdev)
            .ok_or_else(|| BridgeError::not_found(format!("device {bdev} not found in engine")))
    }
}

#[async_trait]
impl Provisioner<Volume> for StorageBridge {
    #[instrument(skip_all, fields(name = %vol.name))]
    async fn provision(&self, ctx: &CallContext, vol: &mut Volume) -> Result<(), BridgeError> {
        let bdev = vol.system_id().to_owned();
        if self.stacks.lineage_of(&vol.name).is_some() {
            return Err(BridgeError::conflict(format!(
                "{} already belongs to a volume stack",
                vol.name
            )));
        }

        let created: String = match &vol.spec {
            VolumeSpec::Aio {
                filename,
                block_size,
                ..
            } => {
                let params = AioCreateParams {
                    name: bdev.clone(),
                    filename: filename.clone(),
                    block_size: *block_size,
                };
                call_as(self.engine(), ctx, BDEV_AIO_CREATE, &params).await?
            }
            VolumeSpec::Null {
                block_size,
                blocks_count,
            } => {
                let params = SizedCreateParams {
                    name: bdev.clone(),
                    block_size: *block_size,
                    num_blocks: *blocks_count,
                };
                call_as(self.engine(), ctx, BDEV_NULL_CREATE, &params).await?
            }
            VolumeSpec::Malloc {
                block_size,
                blocks_count,
            } => {
                let params = SizedCreateParams {
                    name: bdev.clone(),
                    block_size: *block_size,
                    num_blocks: *blocks_count,
                };
                call_as(self.engine(), ctx, BDEV_MALLOC_CREATE, &params).await?
            }
        };
        if created != bdev {
            return Err(BridgeError::validation(format!("could not create {bdev}")));
        }

        let kind = vol.spec.backend_kind();
        self.stacks
            .create(VolumeNode::backend(vol.name.clone(), bdev.clone(), kind))?;

        match self.query_bdev(ctx, &bdev).await {
            Ok(info) => merge_bdev(vol, &info),
            Err(e) => debug!(%bdev, error = %e, "device details unavailable after create"),
        }
        Ok(())
    }

    #[instrument(skip_all, fields(name = %vol.name))]
    async fn deprovision(
        &self,
        ctx: &CallContext,
        vol: &Volume,
        allow_missing: bool,
    ) -> Result<(), BridgeError> {
        let bdev = vol.system_id();
        let method = delete_method(vol.spec.backend_kind());

        let Some((id, stack)) = self.stacks.lineage_of(&vol.name) else {
            warn!(%bdev, "volume has no stack, deleting device only");
            let result = call_as(self.engine(), ctx, method, &NameParams::new(bdev)).await;
            return check_destroyed(bdev, result, allow_missing);
        };

        let mut stack = stack.lock().await;
        stack.check_pop(&vol.name)?;
        let result = call_as(self.engine(), ctx, method, &NameParams::new(bdev)).await;
        check_destroyed(bdev, result, allow_missing)?;
        stack.pop(&vol.name)?;
        drop(stack);
        self.stacks.release(id);
        Ok(())
    }

    async fn refresh(&self, ctx: &CallContext, mut vol: Volume) -> Result<Volume, BridgeError> {
        let info = self.query_bdev(ctx, vol.system_id()).await.map_err(|e| {
            if e.is_no_device() {
                BridgeError::not_found(format!("device {} not found in engine", vol.system_id()))
            } else {
                e
            }
        })?;
        merge_bdev(&mut vol, &info);
        Ok(vol)
    }

    /// Every backend device in the engine, named after the stored volume
    /// when there is one.
    async fn gather(
        &self,
        ctx: &CallContext,
        parent: &str,
        stored: Vec<Volume>,
    ) -> Result<Vec<Volume>, BridgeError> {
        let bdevs: Vec<BdevInfo> = call_as(self.engine(), ctx, BDEV_GET_BDEVS, &()).await?;
        let mut by_bdev: HashMap<String, Volume> = stored
            .into_iter()
            .map(|v| (v.system_id().to_owned(), v))
            .collect();

        let volumes = bdevs
            .iter()
            .filter_map(|info| match by_bdev.remove(&info.name) {
                Some(mut vol) => {
                    merge_bdev(&mut vol, info);
                    Some(vol)
                }
                None => spec_from_bdev(info).map(|spec| Volume {
                    name: build_resource_name(parent, &info.name),
                    spec,
                    uuid: info.uuid.clone(),
                }),
            })
            .collect();
        Ok(volumes)
    }

    async fn stats(&self, ctx: &CallContext, vol: &Volume) -> Result<VolumeStats, BridgeError> {
        self.iostat(ctx, vol.system_id()).await
    }
}

#[async_trait]
impl VolumeService for StorageBridge {
    async fn create_volume(
        &self,
        ctx: &CallContext,
        req: CreateRequest<Volume>,
    ) -> Result<Volume, BridgeError> {
        self.volumes
            .create(ctx, self, &volumes_parent(), &req.id, req.resource)
            .await
    }

    async fn get_volume(&self, ctx: &CallContext, req: GetRequest) -> Result<Volume, BridgeError> {
        self.volumes.get(ctx, self, &req.name).await
    }

    async fn update_volume(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<Volume>,
    ) -> Result<Volume, BridgeError> {
        self.volumes
            .update(ctx, self, &volumes_parent(), req.resource, &req.update_mask, req.allow_missing)
            .await
    }

    async fn delete_volume(&self, ctx: &CallContext, req: DeleteRequest) -> Result<(), BridgeError> {
        self.volumes
            .delete(ctx, self, &req.name, req.allow_missing)
            .await
    }

    async fn list_volumes(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<Volume>, BridgeError> {
        self.volumes.list(ctx, self, &req, &volumes_parent()).await
    }

    async fn stats_volume(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError> {
        self.volumes.stats(ctx, self, &req.name).await
    }
}
