//! Resource data model: volumes, remote controllers, paths, overlays, and
//! the request/response shapes shared by every resource service.
//!
//! All types are [`Serialize`]/[`Deserialize`] so they can travel inside a
//! [`crate::message::BridgeMessage`] as JSON and be written to a
//! [`crate::store::KvStore`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::BdevIoStat;
use crate::error::BridgeError;
use crate::naming::{FieldMask, resolve_system_id};
use crate::stack::BackendKind;

/// Block size used when a volume request leaves it at zero.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

// ---------------------------------------------------------------------------
// Resource trait
// ---------------------------------------------------------------------------

/// Every resource kind served by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Volume,
    RemoteController,
    Path,
    EncryptedVolume,
    QosVolume,
}

impl ResourceKind {
    /// Collection segment used when building names of this kind.
    pub const fn collection(&self) -> &'static str {
        match self {
            Self::Volume => "volumes",
            Self::RemoteController => "remoteControllers",
            Self::Path => "paths",
            Self::EncryptedVolume => "encryptedVolumes",
            Self::QosVolume => "qosVolumes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Volume => "volume",
            Self::RemoteController => "remote controller",
            Self::Path => "path",
            Self::EncryptedVolume => "encrypted volume",
            Self::QosVolume => "qos volume",
        };
        f.write_str(label)
    }
}

/// Behaviour shared by all resource payloads.
pub trait Resource:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: ResourceKind;

    /// Fields an update mask may name.
    const MUTABLE_FIELDS: &'static [&'static str];

    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    /// Check required fields and field-level constraints.
    fn validate(&self) -> Result<(), BridgeError>;

    /// Copy the fields selected by `mask` from `update` into `self`.
    fn apply_mask(&mut self, update: &Self, mask: &FieldMask);

    /// Fill in defaults before the resource is provisioned.
    fn normalize(&mut self) {}

    /// Copy handed to callers.  Secrets are stripped here.
    fn redacted(&self) -> Self {
        self.clone()
    }

    /// Identifier the engine knows this resource by.
    fn system_id(&self) -> &str {
        resolve_system_id(self.name())
    }
}

fn required(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.is_empty() {
        return Err(BridgeError::validation(format!(
            "missing required field: {field}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Volumes
// ---------------------------------------------------------------------------

/// Backend device definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeSpec {
    /// File or block-device backed through Linux AIO.
    Aio {
        filename: String,
        #[serde(default)]
        block_size: u32,
        #[serde(default)]
        blocks_count: u64,
    },
    /// Discards writes, reads zeroes.
    Null {
        #[serde(default)]
        block_size: u32,
        blocks_count: u64,
    },
    /// RAM backed.
    Malloc {
        #[serde(default)]
        block_size: u32,
        blocks_count: u64,
    },
}

impl VolumeSpec {
    pub fn backend_kind(&self) -> BackendKind {
        match self {
            Self::Aio { .. } => BackendKind::Aio,
            Self::Null { .. } => BackendKind::Null,
            Self::Malloc { .. } => BackendKind::Malloc,
        }
    }

    pub fn block_size(&self) -> u32 {
        match self {
            Self::Aio { block_size, .. }
            | Self::Null { block_size, .. }
            | Self::Malloc { block_size, .. } => *block_size,
        }
    }

    pub fn blocks_count(&self) -> u64 {
        match self {
            Self::Aio { blocks_count, .. }
            | Self::Null { blocks_count, .. }
            | Self::Malloc { blocks_count, .. } => *blocks_count,
        }
    }

    fn block_size_mut(&mut self) -> &mut u32 {
        match self {
            Self::Aio { block_size, .. }
            | Self::Null { block_size, .. }
            | Self::Malloc { block_size, .. } => block_size,
        }
    }

    fn blocks_count_mut(&mut self) -> &mut u64 {
        match self {
            Self::Aio { blocks_count, .. }
            | Self::Null { blocks_count, .. }
            | Self::Malloc { blocks_count, .. } => blocks_count,
        }
    }
}

/// A backend volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub name: String,
    pub spec: VolumeSpec,
    /// Device uuid as reported by the engine.
    #[serde(default)]
    pub uuid: Option<String>,
}

impl Resource for Volume {
    const KIND: ResourceKind = ResourceKind::Volume;
    const MUTABLE_FIELDS: &'static [&'static str] =
        &["spec", "filename", "block_size", "blocks_count"];

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn validate(&self) -> Result<(), BridgeError> {
        match &self.spec {
            VolumeSpec::Aio { filename, .. } => required("filename", filename)?,
            VolumeSpec::Null { blocks_count, .. } | VolumeSpec::Malloc { blocks_count, .. } => {
                if *blocks_count == 0 {
                    return Err(BridgeError::validation("blocks_count must be positive"));
                }
            }
        }
        let block_size = self.spec.block_size();
        if block_size != 0 && block_size % DEFAULT_BLOCK_SIZE != 0 {
            return Err(BridgeError::validation(format!(
                "block_size {block_size} is not a multiple of {DEFAULT_BLOCK_SIZE}"
            )));
        }
        Ok(())
    }

    fn apply_mask(&mut self, update: &Self, mask: &FieldMask) {
        if mask.selects("spec") {
            self.spec = update.spec.clone();
            return;
        }
        if mask.selects("filename")
            && let (VolumeSpec::Aio { filename, .. }, VolumeSpec::Aio { filename: new, .. }) =
                (&mut self.spec, &update.spec)
        {
            filename.clone_from(new);
        }
        if mask.selects("block_size") {
            *self.spec.block_size_mut() = update.spec.block_size();
        }
        if mask.selects("blocks_count") {
            *self.spec.blocks_count_mut() = update.spec.blocks_count();
        }
    }

    fn normalize(&mut self) {
        let block_size = self.spec.block_size_mut();
        if *block_size == 0 {
            *block_size = DEFAULT_BLOCK_SIZE;
        }
    }
}

// ---------------------------------------------------------------------------
// Remote controllers and paths
// ---------------------------------------------------------------------------

/// Fabric a controller or path talks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Tcp,
    Rdma,
    Pcie,
}

/// Broad class of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Network,
    Bus,
}

impl TransportKind {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Tcp | Self::Rdma => Channel::Network,
            Self::Pcie => Channel::Bus,
        }
    }

    /// Engine `trtype` value.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Rdma => "RDMA",
            Self::Pcie => "PCIe",
        }
    }
}

/// How the engine treats a second path to the same controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipathPolicy {
    #[default]
    Disable,
    Failover,
    Multipath,
}

impl MultipathPolicy {
    /// Engine `multipath` value.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Failover => "failover",
            Self::Multipath => "multipath",
        }
    }
}

/// A connection to a remote NVMe controller.
///
/// The controller itself has no engine device; its paths do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteController {
    #[serde(default)]
    pub name: String,
    pub transport: TransportKind,
    #[serde(default)]
    pub multipath: MultipathPolicy,
    /// TLS pre-shared key in interchange format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<Vec<u8>>,
    #[serde(default)]
    pub hdgst: bool,
    #[serde(default)]
    pub ddgst: bool,
}

impl Resource for RemoteController {
    const KIND: ResourceKind = ResourceKind::RemoteController;
    const MUTABLE_FIELDS: &'static [&'static str] = &["multipath", "psk", "hdgst", "ddgst"];

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if (self.hdgst || self.ddgst) && self.transport != TransportKind::Tcp {
            return Err(BridgeError::validation(
                "header and data digests are only supported over TCP",
            ));
        }
        if self.psk.is_some() && self.transport != TransportKind::Tcp {
            return Err(BridgeError::validation(
                "a pre-shared key is only supported over TCP",
            ));
        }
        if self.psk.as_ref().is_some_and(|k| k.is_empty()) {
            return Err(BridgeError::validation("psk must not be empty when set"));
        }
        Ok(())
    }

    fn apply_mask(&mut self, update: &Self, mask: &FieldMask) {
        if mask.selects("multipath") {
            self.multipath = update.multipath;
        }
        if mask.selects_secret("psk", update.psk.is_some()) {
            self.psk.clone_from(&update.psk);
        }
        if mask.selects("hdgst") {
            self.hdgst = update.hdgst;
        }
        if mask.selects("ddgst") {
            self.ddgst = update.ddgst;
        }
    }

    fn redacted(&self) -> Self {
        Self {
            psk: None,
            ..self.clone()
        }
    }
}

/// IP address family of a network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
        }
    }
}

/// One attachment point of a remote controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    #[serde(default)]
    pub name: String,
    /// Resource name of the owning controller.
    #[serde(default)]
    pub controller_name_ref: String,
    pub transport: TransportKind,
    /// IP address for network transports, PCI BDF for the bus.
    pub traddr: String,
    /// Service id (port) for network transports.
    #[serde(default)]
    pub trsvcid: Option<u16>,
    #[serde(default)]
    pub adrfam: Option<AddressFamily>,
    #[serde(default)]
    pub subnqn: String,
    #[serde(default)]
    pub hostnqn: String,
}

impl Resource for Path {
    const KIND: ResourceKind = ResourceKind::Path;
    const MUTABLE_FIELDS: &'static [&'static str] =
        &["traddr", "trsvcid", "adrfam", "subnqn", "hostnqn"];

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn validate(&self) -> Result<(), BridgeError> {
        required("controller_name_ref", &self.controller_name_ref)?;
        required("traddr", &self.traddr)?;
        if self.transport.channel() == Channel::Network {
            if self.trsvcid.is_none() {
                return Err(BridgeError::validation("missing required field: trsvcid"));
            }
            required("subnqn", &self.subnqn)?;
        }
        Ok(())
    }

    fn apply_mask(&mut self, update: &Self, mask: &FieldMask) {
        if mask.selects("traddr") {
            self.traddr.clone_from(&update.traddr);
        }
        if mask.selects("trsvcid") {
            self.trsvcid = update.trsvcid;
        }
        if mask.selects("adrfam") {
            self.adrfam = update.adrfam;
        }
        if mask.selects("subnqn") {
            self.subnqn.clone_from(&update.subnqn);
        }
        if mask.selects("hostnqn") {
            self.hostnqn.clone_from(&update.hostnqn);
        }
    }
}

// ---------------------------------------------------------------------------
// Overlay volumes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cipher {
    AesCbc,
    AesXts,
}

impl Cipher {
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::AesCbc => "AES_CBC",
            Self::AesXts => "AES_XTS",
        }
    }
}

/// Encryption layered on top of another volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVolume {
    #[serde(default)]
    pub name: String,
    /// Resource name of the volume underneath.
    pub volume_name_ref: String,
    pub cipher: Cipher,
    #[serde(default, with = "hex::serde")]
    pub key: Vec<u8>,
    /// Tweak key, AES-XTS only.
    #[serde(default, with = "hex::serde")]
    pub key2: Vec<u8>,
}

impl Resource for EncryptedVolume {
    const KIND: ResourceKind = ResourceKind::EncryptedVolume;
    const MUTABLE_FIELDS: &'static [&'static str] = &["cipher", "key", "key2"];

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn validate(&self) -> Result<(), BridgeError> {
        required("volume_name_ref", &self.volume_name_ref)?;
        if !matches!(self.key.len(), 16 | 32) {
            return Err(BridgeError::validation(format!(
                "key must be 16 or 32 bytes, got {}",
                self.key.len()
            )));
        }
        match self.cipher {
            Cipher::AesCbc if !self.key2.is_empty() => Err(BridgeError::validation(
                "key2 is only used with AES-XTS",
            )),
            Cipher::AesXts if self.key2.len() != self.key.len() => Err(BridgeError::validation(
                "AES-XTS needs key2 of the same length as key",
            )),
            Cipher::AesXts if self.key2 == self.key => Err(BridgeError::validation(
                "AES-XTS key2 must differ from key",
            )),
            _ => Ok(()),
        }
    }

    fn apply_mask(&mut self, update: &Self, mask: &FieldMask) {
        if mask.selects("cipher") {
            self.cipher = update.cipher;
        }
        // key and key2 travel together under the wildcard.
        let supplied = !update.key.is_empty() || !update.key2.is_empty();
        if mask.selects_secret("key", supplied) {
            self.key.clone_from(&update.key);
        }
        if mask.selects_secret("key2", supplied) {
            self.key2.clone_from(&update.key2);
        }
    }

    fn redacted(&self) -> Self {
        Self {
            key: Vec::new(),
            key2: Vec::new(),
            ..self.clone()
        }
    }
}

/// Upper limits applied by a QoS volume.  Zero means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosLimit {
    #[serde(default)]
    pub rw_iops_kiops: i64,
    #[serde(default)]
    pub rd_iops_kiops: i64,
    #[serde(default)]
    pub wr_iops_kiops: i64,
    #[serde(default)]
    pub rw_bandwidth_mbs: i64,
    #[serde(default)]
    pub rd_bandwidth_mbs: i64,
    #[serde(default)]
    pub wr_bandwidth_mbs: i64,
}

/// Rate limits applied to another volume's device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosVolume {
    #[serde(default)]
    pub name: String,
    /// Resource name of the volume underneath.
    pub volume_name_ref: String,
    #[serde(default)]
    pub max_limit: QosLimit,
}

impl Resource for QosVolume {
    const KIND: ResourceKind = ResourceKind::QosVolume;
    const MUTABLE_FIELDS: &'static [&'static str] = &["max_limit"];

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn validate(&self) -> Result<(), BridgeError> {
        required("volume_name_ref", &self.volume_name_ref)?;
        let l = &self.max_limit;
        let all = [
            l.rw_iops_kiops,
            l.rd_iops_kiops,
            l.wr_iops_kiops,
            l.rw_bandwidth_mbs,
            l.rd_bandwidth_mbs,
            l.wr_bandwidth_mbs,
        ];
        if all.iter().any(|v| *v < 0) {
            return Err(BridgeError::validation("qos limits must not be negative"));
        }
        if l.rd_iops_kiops != 0 || l.wr_iops_kiops != 0 {
            return Err(BridgeError::validation(
                "per-direction iops limits are not supported",
            ));
        }
        if all.iter().all(|v| *v == 0) {
            return Err(BridgeError::validation("at least one max limit must be set"));
        }
        Ok(())
    }

    fn apply_mask(&mut self, update: &Self, mask: &FieldMask) {
        if mask.selects("max_limit") {
            self.max_limit = update.max_limit;
        }
    }
}

// ---------------------------------------------------------------------------
// Tagged union over all kinds
// ---------------------------------------------------------------------------

/// Any resource, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "resource")]
pub enum AnyResource {
    Volume(Volume),
    RemoteController(RemoteController),
    Path(Path),
    EncryptedVolume(EncryptedVolume),
    QosVolume(QosVolume),
}

impl AnyResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Volume(_) => ResourceKind::Volume,
            Self::RemoteController(_) => ResourceKind::RemoteController,
            Self::Path(_) => ResourceKind::Path,
            Self::EncryptedVolume(_) => ResourceKind::EncryptedVolume,
            Self::QosVolume(_) => ResourceKind::QosVolume,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Volume(r) => r.name(),
            Self::RemoteController(r) => r.name(),
            Self::Path(r) => r.name(),
            Self::EncryptedVolume(r) => r.name(),
            Self::QosVolume(r) => r.name(),
        }
    }
}

macro_rules! any_resource_from {
    ($($variant:ident),*) => {
        $(impl From<$variant> for AnyResource {
            fn from(r: $variant) -> Self {
                Self::$variant(r)
            }
        })*
    };
}

any_resource_from!(Volume, RemoteController, Path, EncryptedVolume, QosVolume);

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// I/O counters of a device.  Kinds without telemetry report `-1` everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub read_bytes: i64,
    pub read_ops: i64,
    pub write_bytes: i64,
    pub write_ops: i64,
    pub read_latency_ticks: i64,
    pub write_latency_ticks: i64,
}

impl VolumeStats {
    /// Reported by kinds that have no engine telemetry.
    pub const UNAVAILABLE: Self = Self {
        read_bytes: -1,
        read_ops: -1,
        write_bytes: -1,
        write_ops: -1,
        read_latency_ticks: -1,
        write_latency_ticks: -1,
    };
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl From<&BdevIoStat> for VolumeStats {
    fn from(s: &BdevIoStat) -> Self {
        Self {
            read_bytes: saturating_i64(s.bytes_read),
            read_ops: saturating_i64(s.num_read_ops),
            write_bytes: saturating_i64(s.bytes_written),
            write_ops: saturating_i64(s.num_write_ops),
            read_latency_ticks: saturating_i64(s.read_latency_ticks),
            write_latency_ticks: saturating_i64(s.write_latency_ticks),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Create a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest<T> {
    /// Scoping parent.  Required for paths (the controller name), ignored
    /// for top-level kinds.
    #[serde(default)]
    pub parent: String,
    /// User-supplied id; empty lets the bridge allocate one.
    #[serde(default)]
    pub id: String,
    pub resource: T,
}

impl<T> CreateRequest<T> {
    pub fn new(id: impl Into<String>, resource: T) -> Self {
        Self {
            parent: String::new(),
            id: id.into(),
            resource,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub name: String,
}

impl GetRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Update a resource under a field mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest<T> {
    /// New field values; `name` selects the resource.
    pub resource: T,
    #[serde(default)]
    pub update_mask: FieldMask,
    /// Create the resource when it does not exist.
    #[serde(default)]
    pub allow_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub name: String,
    /// Treat a missing resource as already deleted.
    #[serde(default)]
    pub allow_missing: bool,
}

impl DeleteRequest {
    pub fn new(name: impl Into<String>, allow_missing: bool) -> Self {
        Self {
            name: name.into(),
            allow_missing,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    pub parent: String,
    #[serde(default)]
    pub page_size: i32,
    #[serde(default)]
    pub page_token: String,
}

impl ListRequest {
    pub fn new(parent: impl Into<String>, page_size: i32, page_token: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            page_size,
            page_token: page_token.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    /// Empty when this is the last page.
    #[serde(default)]
    pub next_page_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub name: String,
}

impl StatsRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Information about the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginInfo {
    /// Bridge name, e.g. `"rk8s.storage.bridge"`.
    pub name: String,
    /// Bridge version.
    pub vendor_version: String,
    /// Version reported by the engine, when reachable.
    #[serde(default)]
    pub engine_version: Option<String>,
}
