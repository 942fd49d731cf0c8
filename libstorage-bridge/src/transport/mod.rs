//! Engine control-channel adapter.
//!
//! The storage engine speaks JSON-RPC 2.0 over a local byte stream.  This
//! module provides the [`EngineClient`] seam used by every resource service,
//! the production [`JsonRpcClient`] implementation, and the per-call
//! [`CallContext`] carrying cancellation and deadline.

pub mod client;
pub mod context;
pub mod wire;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AdapterError;

pub use client::JsonRpcClient;
pub use context::{CallContext, Interruption};

/// Address of the engine's control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAddr {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// TCP endpoint, used by test rigs and remote engines.
    Tcp(SocketAddr),
}

impl EngineAddr {
    /// Interpret `s` as a TCP endpoint if it parses as `host:port`, otherwise
    /// as a Unix socket path.
    pub fn parse(s: &str) -> Self {
        match s.parse::<SocketAddr>() {
            Ok(addr) => Self::Tcp(addr),
            Err(_) => Self::Unix(PathBuf::from(s)),
        }
    }
}

impl fmt::Display for EngineAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// A peer able to execute engine methods.
///
/// Implementations must honour `ctx`: once it is cancelled or its deadline
/// passes, `call` returns [`AdapterError::Cancelled`] or
/// [`AdapterError::DeadlineExceeded`] without waiting for the engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Invoke `method` with optional `params` and return the raw `result`.
    async fn call(
        &self,
        ctx: &CallContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, AdapterError>;
}

/// Invoke `method` with serializable `params` and decode the result as `R`.
pub async fn call_as<E, P, R>(
    engine: &E,
    ctx: &CallContext,
    method: &str,
    params: &P,
) -> Result<R, AdapterError>
where
    E: EngineClient + ?Sized,
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let params = serde_json::to_value(params).map_err(|e| AdapterError::codec(method, e))?;
    let params = match params {
        Value::Null => None,
        other => Some(other),
    };
    let result = engine.call(ctx, method, params).await?;
    serde_json::from_value(result).map_err(|e| AdapterError::codec(method, e))
}
