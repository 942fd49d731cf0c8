//! Front API messages.
//!
//! [`BridgeMessage`] is the envelope for every request and response variant
//! exchanged with the bridge.  A caller sends one *request* variant and gets
//! back the matching *response* variant, or [`BridgeMessage::Error`].  See
//! [`crate::dispatch::dispatch`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::Status;
use crate::types::*;

/// Top-level message envelope for the front API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeMessage {
    // ----- Volumes ---------------------------------------------------------
    CreateVolume(CreateRequest<Volume>),
    GetVolume(GetRequest),
    UpdateVolume(UpdateRequest<Volume>),
    DeleteVolume(DeleteRequest),
    ListVolumes(ListRequest),
    StatsVolume(StatsRequest),

    // ----- Remote controllers ----------------------------------------------
    CreateRemoteController(CreateRequest<RemoteController>),
    GetRemoteController(GetRequest),
    UpdateRemoteController(UpdateRequest<RemoteController>),
    DeleteRemoteController(DeleteRequest),
    ListRemoteControllers(ListRequest),
    StatsRemoteController(StatsRequest),

    // ----- Paths -----------------------------------------------------------
    CreatePath(CreateRequest<Path>),
    GetPath(GetRequest),
    UpdatePath(UpdateRequest<Path>),
    DeletePath(DeleteRequest),
    ListPaths(ListRequest),
    StatsPath(StatsRequest),

    // ----- Encrypted volumes -----------------------------------------------
    CreateEncryptedVolume(CreateRequest<EncryptedVolume>),
    GetEncryptedVolume(GetRequest),
    UpdateEncryptedVolume(UpdateRequest<EncryptedVolume>),
    DeleteEncryptedVolume(DeleteRequest),
    ListEncryptedVolumes(ListRequest),
    StatsEncryptedVolume(StatsRequest),

    // ----- QoS volumes -----------------------------------------------------
    CreateQosVolume(CreateRequest<QosVolume>),
    GetQosVolume(GetRequest),
    UpdateQosVolume(UpdateRequest<QosVolume>),
    DeleteQosVolume(DeleteRequest),
    ListQosVolumes(ListRequest),
    StatsQosVolume(StatsRequest),

    // ----- Identity --------------------------------------------------------
    /// Health probe.
    Probe,
    /// Query bridge and engine versions.
    GetPluginInfo,

    // ----- Responses -------------------------------------------------------
    /// A single resource (create, get, update).
    Resource(AnyResource),
    /// One page of resources.
    ResourceList {
        items: Vec<AnyResource>,
        #[serde(default)]
        next_page_token: String,
    },
    /// I/O counters.
    Stats(VolumeStats),
    /// Bridge information.
    PluginInfo(PluginInfo),
    /// Probe result.
    ProbeResult(bool),
    /// Generic success acknowledgement (no payload).
    Ok,
    /// The request failed.
    Error(Status),
}

impl BridgeMessage {
    /// Whether this is a response variant.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::Resource(_)
                | Self::ResourceList { .. }
                | Self::Stats(_)
                | Self::PluginInfo(_)
                | Self::ProbeResult(_)
                | Self::Ok
                | Self::Error(_)
        )
    }
}

impl<T: Into<AnyResource>> From<ListResponse<T>> for BridgeMessage {
    fn from(page: ListResponse<T>) -> Self {
        Self::ResourceList {
            items: page.items.into_iter().map(Into::into).collect(),
            next_page_token: page.next_page_token,
        }
    }
}

fn create_label<T>(f: &mut fmt::Formatter<'_>, op: &str, req: &CreateRequest<T>) -> fmt::Result {
    if req.parent.is_empty() {
        write!(f, "{op}(id={})", req.id)
    } else {
        write!(f, "{op}(parent={}, id={})", req.parent, req.id)
    }
}

fn list_label(f: &mut fmt::Formatter<'_>, op: &str, req: &ListRequest) -> fmt::Result {
    write!(f, "{op}(parent={}, page_size={})", req.parent, req.page_size)
}

impl fmt::Display for BridgeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateVolume(req) => create_label(f, "CreateVolume", req),
            Self::GetVolume(req) => write!(f, "GetVolume({})", req.name),
            Self::UpdateVolume(req) => write!(f, "UpdateVolume({})", req.resource.name),
            Self::DeleteVolume(req) => write!(f, "DeleteVolume({})", req.name),
            Self::ListVolumes(req) => list_label(f, "ListVolumes", req),
            Self::StatsVolume(req) => write!(f, "StatsVolume({})", req.name),

            Self::CreateRemoteController(req) => create_label(f, "CreateRemoteController", req),
            Self::GetRemoteController(req) => write!(f, "GetRemoteController({})", req.name),
            Self::UpdateRemoteController(req) => {
                write!(f, "UpdateRemoteController({})", req.resource.name)
            }
            Self::DeleteRemoteController(req) => write!(f, "DeleteRemoteController({})", req.name),
            Self::ListRemoteControllers(req) => list_label(f, "ListRemoteControllers", req),
            Self::StatsRemoteController(req) => write!(f, "StatsRemoteController({})", req.name),

            Self::CreatePath(req) => create_label(f, "CreatePath", req),
            Self::GetPath(req) => write!(f, "GetPath({})", req.name),
            Self::UpdatePath(req) => write!(f, "UpdatePath({})", req.resource.name),
            Self::DeletePath(req) => write!(f, "DeletePath({})", req.name),
            Self::ListPaths(req) => list_label(f, "ListPaths", req),
            Self::StatsPath(req) => write!(f, "StatsPath({})", req.name),

            Self::CreateEncryptedVolume(req) => create_label(f, "CreateEncryptedVolume", req),
            Self::GetEncryptedVolume(req) => write!(f, "GetEncryptedVolume({})", req.name),
            Self::UpdateEncryptedVolume(req) => {
                write!(f, "UpdateEncryptedVolume({})", req.resource.name)
            }
            Self::DeleteEncryptedVolume(req) => write!(f, "DeleteEncryptedVolume({})", req.name),
            Self::ListEncryptedVolumes(req) => list_label(f, "ListEncryptedVolumes", req),
            Self::StatsEncryptedVolume(req) => write!(f, "StatsEncryptedVolume({})", req.name),

            Self::CreateQosVolume(req) => create_label(f, "CreateQosVolume", req),
            Self::GetQosVolume(req) => write!(f, "GetQosVolume({})", req.name),
            Self::UpdateQosVolume(req) => write!(f, "UpdateQosVolume({})", req.resource.name),
            Self::DeleteQosVolume(req) => write!(f, "DeleteQosVolume({})", req.name),
            Self::ListQosVolumes(req) => list_label(f, "ListQosVolumes", req),
            Self::StatsQosVolume(req) => write!(f, "StatsQosVolume({})", req.name),

            Self::Probe => f.write_str("Probe"),
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),

            Self::Resource(r) => write!(f, "Resource({})", r.name()),
            Self::ResourceList { items, .. } => write!(f, "ResourceList(count={})", items.len()),
            Self::Stats(_) => f.write_str("Stats"),
            Self::PluginInfo(info) => write!(f, "PluginInfo(name={})", info.name),
            Self::ProbeResult(ok) => write!(f, "ProbeResult({ok})"),
            Self::Ok => f.write_str("Ok"),
            Self::Error(status) => write!(f, "Error({status})"),
        }
    }
}
