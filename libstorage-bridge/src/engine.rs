//! Engine method vocabulary.
//!
//! Method names follow the engine's `verb_object` convention.  Parameter and
//! result structs mirror the engine's JSON shapes field for field.

use serde::{Deserialize, Serialize};

pub const BDEV_AIO_CREATE: &str = "bdev_aio_create";
pub const BDEV_AIO_DELETE: &str = "bdev_aio_delete";
pub const BDEV_NULL_CREATE: &str = "bdev_null_create";
pub const BDEV_NULL_DELETE: &str = "bdev_null_delete";
pub const BDEV_MALLOC_CREATE: &str = "bdev_malloc_create";
pub const BDEV_MALLOC_DELETE: &str = "bdev_malloc_delete";
pub const BDEV_GET_BDEVS: &str = "bdev_get_bdevs";
pub const BDEV_GET_IOSTAT: &str = "bdev_get_iostat";
pub const BDEV_NVME_ATTACH_CONTROLLER: &str = "bdev_nvme_attach_controller";
pub const BDEV_NVME_DETACH_CONTROLLER: &str = "bdev_nvme_detach_controller";
pub const ACCEL_CRYPTO_KEY_CREATE: &str = "accel_crypto_key_create";
pub const ACCEL_CRYPTO_KEY_DESTROY: &str = "accel_crypto_key_destroy";
pub const BDEV_CRYPTO_CREATE: &str = "bdev_crypto_create";
pub const BDEV_CRYPTO_DELETE: &str = "bdev_crypto_delete";
pub const BDEV_SET_QOS_LIMIT: &str = "bdev_set_qos_limit";
pub const SPDK_GET_VERSION: &str = "spdk_get_version";

/// Product names reported by `bdev_get_bdevs` for backend devices.
pub const PRODUCT_AIO: &str = "AIO disk";
pub const PRODUCT_NULL: &str = "Null disk";
pub const PRODUCT_MALLOC: &str = "Malloc disk";

/// Parameters naming a single device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameParams {
    pub name: String,
}

impl NameParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AioCreateParams {
    pub name: String,
    pub filename: String,
    pub block_size: u32,
}

/// Shared by `bdev_null_create` and `bdev_malloc_create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizedCreateParams {
    pub name: String,
    pub block_size: u32,
    pub num_blocks: u64,
}

/// One entry of the `bdev_get_bdevs` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BdevInfo {
    pub name: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub block_size: u32,
    #[serde(default)]
    pub num_blocks: u64,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IoStatResult {
    #[serde(default)]
    pub tick_rate: u64,
    #[serde(default)]
    pub bdevs: Vec<BdevIoStat>,
}

/// Per-device counters from `bdev_get_iostat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BdevIoStat {
    pub name: String,
    #[serde(default)]
    pub bytes_read: u64,
    #[serde(default)]
    pub num_read_ops: u64,
    #[serde(default)]
    pub bytes_written: u64,
    #[serde(default)]
    pub num_write_ops: u64,
    #[serde(default)]
    pub read_latency_ticks: u64,
    #[serde(default)]
    pub write_latency_ticks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NvmeAttachParams {
    pub name: String,
    pub trtype: String,
    pub traddr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adrfam: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trsvcid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnqn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostnqn: Option<String>,
    pub hdgst: bool,
    pub ddgst: bool,
    /// Path of a key file, never the key itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    /// Omitted for the first path of a controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multipath: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NvmeDetachParams {
    pub name: String,
    pub trtype: String,
    pub traddr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adrfam: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trsvcid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnqn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoKeyCreateParams {
    pub cipher: String,
    pub name: String,
    /// Hex encoded.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key2: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoKeyDestroyParams {
    pub key_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoCreateParams {
    pub base_bdev_name: String,
    pub name: String,
    pub key_name: String,
}

/// `bdev_set_qos_limit` parameters.  Zero removes a limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QosLimitParams {
    pub name: String,
    pub rw_ios_per_sec: i64,
    pub rw_mbytes_per_sec: i64,
    pub r_mbytes_per_sec: i64,
    pub w_mbytes_per_sec: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionResult {
    pub version: String,
}
