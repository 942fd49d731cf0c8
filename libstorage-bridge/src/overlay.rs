//! Overlay volume service traits.
//!
//! Overlays are transforms layered on top of an existing volume's device.
//! At most one overlay of each kind may sit on a lineage, and only the
//! topmost one may be deleted or updated.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::transport::CallContext;
use crate::types::{
    CreateRequest, DeleteRequest, EncryptedVolume, GetRequest, ListRequest, ListResponse,
    QosVolume, StatsRequest, UpdateRequest, VolumeStats,
};

/// Encrypted volume service.
///
/// Each encrypted volume owns a crypto device in the engine named after its
/// id, stacked on the device currently on top of the referenced volume.
/// Keys are accepted on create and update but never returned.
#[async_trait]
pub trait EncryptedVolumeService: Send + Sync {
    async fn create_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: CreateRequest<EncryptedVolume>,
    ) -> Result<EncryptedVolume, BridgeError>;

    async fn get_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: GetRequest,
    ) -> Result<EncryptedVolume, BridgeError>;

    async fn update_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<EncryptedVolume>,
    ) -> Result<EncryptedVolume, BridgeError>;

    async fn delete_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: DeleteRequest,
    ) -> Result<(), BridgeError>;

    async fn list_encrypted_volumes(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<EncryptedVolume>, BridgeError>;

    async fn stats_encrypted_volume(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError>;
}

/// QoS volume service.
///
/// A QoS volume creates no device: it applies rate limits to the device
/// currently on top of the referenced volume.
#[async_trait]
pub trait QosVolumeService: Send + Sync {
    async fn create_qos_volume(
        &self,
        ctx: &CallContext,
        req: CreateRequest<QosVolume>,
    ) -> Result<QosVolume, BridgeError>;

    async fn get_qos_volume(&self, ctx: &CallContext, req: GetRequest) -> Result<QosVolume, BridgeError>;

    async fn update_qos_volume(
        &self,
        ctx: &CallContext,
        req: UpdateRequest<QosVolume>,
    ) -> Result<QosVolume, BridgeError>;

    async fn delete_qos_volume(&self, ctx: &CallContext, req: DeleteRequest) -> Result<(), BridgeError>;

    async fn list_qos_volumes(
        &self,
        ctx: &CallContext,
        req: ListRequest,
    ) -> Result<ListResponse<QosVolume>, BridgeError>;

    async fn stats_qos_volume(
        &self,
        ctx: &CallContext,
        req: StatsRequest,
    ) -> Result<VolumeStats, BridgeError>;
}
