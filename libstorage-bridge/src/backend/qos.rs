//! QoS volumes: rate limits applied to the device beneath, no device of
//! their own.

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::engine::*;
use crate::error::BridgeError;
use crate::naming::collection_parent;
use crate::overlay::QosVolumeService;
use crate::registry::{Provisioner, check_destroyed};
use crate::stack::{OverlayKind, VolumeNode};
use crate::transport::{CallContext, call_as};
use crate::types::*;

use super::StorageBridge;

fn qos_parent() -> String {
    collection_parent(ResourceKind::QosVolume.collection())
}

fn limit_params(bdev: &str, limit: &QosLimit) -> QosLimitParams {
    QosLimitParams {
        name: bdev.to_owned(),
        rw_ios_per_sec: limit.rw_iops_kiops.saturating_mul(1000),
        rw_mbytes_per_sec: limit.rw_bandwidth_mbs,
        r_mbytes_per_sec: limit.rd_bandwidth_mbs,
        w_mbytes_per_sec: limit.wr_bandwidth_mbs,
    }
}

#[async_trait]
impl Provisioner<QosVolume> for StorageBridge {
    fn dependencies(&self, qos: &QosVolume) -> Vec<String> {
        vec![qos.volume_name_ref.clone()]
    }

    #[instrument(skip_all, fields(name = %qos.name, volume = %qos.volume_name_ref))]
    async fn provision(&self, ctx: &CallContext, qos: &mut QosVolume) -> Result<(), BridgeError> {
        let (id, stack) = self.lineage(&qos.volume_name_ref)?;
        let mut stack = stack.lock().await;
        let bdev = stack
            .top()
            .map(|n| n.bdev_name.clone())
            .ok_or_else(|| BridgeError::not_found(format!("volume {} not found", qos.volume_name_ref)))?;
        let node = VolumeNode::overlay(qos.name.clone(), bdev.clone(), OverlayKind::Qos);
        stack.check_push(&node)?;

        let applied: bool = call_as(
            self.engine(),
            ctx,
            BDEV_SET_QOS_LIMIT,
            &limit_params(&bdev, &qos.max_limit),
        )
        .await?;
        if !applied {
            return Err(BridgeError::validation(format!(
                "could not set qos limits on {bdev}"
            )));
        }

        stack.push(node)?;
        drop(stack);
        self.stacks.attach(&qos.name, id);
        Ok(())
    }

    #[instrument(skip_all, fields(name = %qos.name))]
    async fn deprovision(
        &self,
        ctx: &CallContext,
        qos: &QosVolume,
        allow_missing: bool,
    ) -> Result<(), BridgeError> {
        let Some((_, stack)) = self.stacks.lineage_of(&qos.name) else {
            warn!("qos volume has no stack, nothing to reset");
            return Ok(());
        };
        let mut stack = stack.lock().await;
        stack.check_pop(&qos.name)?;
        let Some(bdev) = stack.top().map(|n| n.bdev_name.clone()) else {
            return Ok(());
        };

        let reset = QosLimitParams {
            name: bdev.clone(),
            ..Default::default()
        };
        let result = call_as(self.engine(), ctx, BDEV_SET_QOS_LIMIT, &reset).await;
        check_destroyed(qos.system_id(), result, allow_missing)?;

        stack.pop(&qos.name)?;
        drop(stack);
        self.stacks.detach(&qos.name);
        Ok(())
    }

    async fn stats(&self, ctx: &CallContext, qos: &QosVolume) -> Result<VolumeStats, BridgeError> {
        let bdev = self.node_bdev(&qos.name).await.ok_or_else(|| {
            BridgeError::not_found(format!("qos volume {} has no device", qos.name))
        })?;
        self.iostat(ctx, &bdev).await
    }
}

#[async_trait]
impl QosVolumeService for StorageBridge {
    async fn create_qos_volume(
        &self,
        ctx: &CallContext,
        req: CreateRequest<QosVolume>,
    ) -> Result<QosVolume, BridgeError> {
        self.qos
            .create(ctx, self, &qos_parent(), &req.id, req.resource)
            .await
    }

    async fn get_qos_volume(&self, ctx: &CallContext, req: GetRequest) -> Result<QosVolume, BridgeError> {
        self.qos.get(ctx, self, &req.name).await
    }

    async fn update_qos_volume(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<QosVolume>,
    ) -> Result<QosVolume, BridgeError> {
        self.qos
            .update(ctx, self, &qos_parent(), req.resource, &req.update_mask, req.allow_missing)
            .await
    }

    async fn delete_qos_volume(&self, ctx: &CallContext, req: DeleteRequest) -> Result<(), BridgeError> {
        self.qos.delete(ctx, self, &req.name, req.allow_missing).await
    }

    async fn list_qos_volumes(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<QosVolume>, BridgeError> {
        self.qos.list(ctx, self, &req, &qos_parent()).await
    }

    async fn stats_qos_volume(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError> {
        self.qos.stats(ctx, self, &req.name).await
    }
}
