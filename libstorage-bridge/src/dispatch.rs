//! Routes [`BridgeMessage`] requests to the service traits.

use tracing::{debug, instrument, warn};

use crate::controller::RemoteControllerService;
use crate::error::BridgeError;
use crate::identity::IdentityService;
use crate::message::BridgeMessage;
use crate::overlay::{EncryptedVolumeService, QosVolumeService};
use crate::path::PathService;
use crate::status::{Code, Status};
use crate::transport::CallContext;
use crate::types::AnyResource;
use crate::volume::VolumeService;

/// Everything [`dispatch`] needs from a handler.
pub trait BridgeHandler:
    IdentityService
    + VolumeService
    + RemoteControllerService
    + PathService
    + EncryptedVolumeService
    + QosVolumeService
{
}

impl<T> BridgeHandler for T where
    T: IdentityService
        + VolumeService
        + RemoteControllerService
        + PathService
        + EncryptedVolumeService
        + QosVolumeService
{
}

fn reply<R>(result: Result<R, BridgeError>, ok: impl FnOnce(R) -> BridgeMessage) -> BridgeMessage {
    match result {
        Ok(r) => ok(r),
        Err(e) => {
            debug!(error = %e, "request failed");
            BridgeMessage::Error(Status::from(e))
        }
    }
}

fn resource<R: Into<AnyResource>>(r: R) -> BridgeMessage {
    BridgeMessage::Resource(r.into())
}

fn done(_: ()) -> BridgeMessage {
    BridgeMessage::Ok
}

/// Map a request to the matching service call and wrap the outcome in a
/// response message.
pub async fn dispatch<T>(handler: &T, ctx: &CallContext, request: BridgeMessage) -> BridgeMessage
where
    T: BridgeHandler + ?Sized,
{
    use BridgeMessage as M;

    match request {
        // --- Identity -------------------------------------------------------
        M::Probe => reply(handler.probe(ctx).await, M::ProbeResult),
        M::GetPluginInfo => reply(handler.get_plugin_info(ctx).await, M::PluginInfo),

        // --- Volumes --------------------------------------------------------
        M::CreateVolume(req) => reply(handler.create_volume(ctx, req).await, resource),
        M::GetVolume(req) => reply(handler.get_volume(ctx, req).await, resource),
        M::UpdateVolume(req) => reply(handler.update_volume(ctx, req).await, resource),
        M::DeleteVolume(req) => reply(handler.delete_volume(ctx, req).await, done),
        M::ListVolumes(req) => reply(handler.list_volumes(ctx, req).await, M::from),
        M::StatsVolume(req) => reply(handler.stats_volume(ctx, req).await, M::Stats),

        // --- Remote controllers ---------------------------------------------
        M::CreateRemoteController(req) => {
            reply(handler.create_remote_controller(ctx, req).await, resource)
        }
        M::GetRemoteController(req) => {
            reply(handler.get_remote_controller(ctx, req).await, resource)
        }
        M::UpdateRemoteController(req) => {
            reply(handler.update_remote_controller(ctx, req).await, resource)
        }
        M::DeleteRemoteController(req) => {
            reply(handler.delete_remote_controller(ctx, req).await, done)
        }
        M::ListRemoteControllers(req) => {
            reply(handler.list_remote_controllers(ctx, req).await, M::from)
        }
        M::StatsRemoteController(req) => {
            reply(handler.stats_remote_controller(ctx, req).await, M::Stats)
        }

        // --- Paths ----------------------------------------------------------
        M::CreatePath(req) => reply(handler.create_path(ctx, req).await, resource),
        M::GetPath(req) => reply(handler.get_path(ctx, req).await, resource),
        M::UpdatePath(req) => reply(handler.update_path(ctx, req).await, resource),
        M::DeletePath(req) => reply(handler.delete_path(ctx, req).await, done),
        M::ListPaths(req) => reply(handler.list_paths(ctx, req).await, M::from),
        M::StatsPath(req) => reply(handler.stats_path(ctx, req).await, M::Stats),

        // --- Encrypted volumes ----------------------------------------------
        M::CreateEncryptedVolume(req) => {
            reply(handler.create_encrypted_volume(ctx, req).await, resource)
        }
        M::GetEncryptedVolume(req) => reply(handler.get_encrypted_volume(ctx, req).await, resource),
        M::UpdateEncryptedVolume(req) => {
            reply(handler.update_encrypted_volume(ctx, req).await, resource)
        }
        M::DeleteEncryptedVolume(req) => reply(handler.delete_encrypted_volume(ctx, req).await, done),
        M::ListEncryptedVolumes(req) => {
            reply(handler.list_encrypted_volumes(ctx, req).await, M::from)
        }
        M::StatsEncryptedVolume(req) => {
            reply(handler.stats_encrypted_volume(ctx, req).await, M::Stats)
        }

        // --- QoS volumes ----------------------------------------------------
        M::CreateQosVolume(req) => reply(handler.create_qos_volume(ctx, req).await, resource),
        M::GetQosVolume(req) => reply(handler.get_qos_volume(ctx, req).await, resource),
        M::UpdateQosVolume(req) => reply(handler.update_qos_volume(ctx, req).await, resource),
        M::DeleteQosVolume(req) => reply(handler.delete_qos_volume(ctx, req).await, done),
        M::ListQosVolumes(req) => reply(handler.list_qos_volumes(ctx, req).await, M::from),
        M::StatsQosVolume(req) => reply(handler.stats_qos_volume(ctx, req).await, M::Stats),

        // --- Response variants should never arrive as requests --------------
        other => {
            warn!(msg = %other, "unexpected message variant received as request");
            M::Error(Status::new(
                Code::InvalidArgument,
                format!("unexpected message: {other}"),
            ))
        }
    }
}

/// Decode one JSON request, dispatch it and encode the response.
///
/// A request that does not parse is answered with an `InvalidArgument`
/// error message rather than failing the exchange.
#[instrument(skip_all, fields(len = payload.len()))]
pub async fn handle_json<T>(
    handler: &T,
    ctx: &CallContext,
    payload: &[u8],
) -> Result<Vec<u8>, BridgeError>
where
    T: BridgeHandler + ?Sized,
{
    let response = match serde_json::from_slice::<BridgeMessage>(payload) {
        Ok(request) => {
            debug!(%request, "bridge request received");
            dispatch(handler, ctx, request).await
        }
        Err(e) => BridgeMessage::Error(Status::new(
            Code::InvalidArgument,
            format!("malformed request: {e}"),
        )),
    };
    serde_json::to_vec(&response).map_err(BridgeError::infrastructure)
}
