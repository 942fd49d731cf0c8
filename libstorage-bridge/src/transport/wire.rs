//! JSON-RPC 2.0 envelopes exchanged with the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version tag written on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single engine request.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Correlation id, echoed by the engine.
    pub id: u64,
    /// Engine method, `verb_object` style (e.g. `bdev_aio_create`).
    pub method: &'a str,
    /// Method parameters; omitted when the method takes none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> RpcRequest<'a> {
    /// Build a request for `method`.
    pub fn new(id: u64, method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcErrorObject {
    /// Engine error code (negative errno for most engine failures).
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// A single engine response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed correlation id. `0` when the engine sent `null`.
    #[serde(default, deserialize_with = "nullable_id")]
    pub id: u64,
    /// Method result on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error object on failure.
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

fn nullable_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}
