//! JSON-RPC client for the engine control socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tracing::{debug, instrument, warn};

use crate::config::BridgeConfig;
use crate::error::AdapterError;

use super::context::CallContext;
use super::wire::{RpcRequest, RpcResponse};
use super::{EngineAddr, EngineClient};

/// Upper bound for a single response.
const MAX_RESPONSE_LEN: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Engine client that opens one control connection per call.
///
/// Each call is carried out by a spawned task.  The caller waits on that
/// task *or* on its [`CallContext`]; when the context wins, the task is
/// aborted, which closes the connection and discards any late response.
/// The request already written to the engine is not revoked.
#[derive(Debug)]
pub struct JsonRpcClient {
    addr: EngineAddr,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl JsonRpcClient {
    /// Create a client for the engine at `addr`.
    ///
    /// `default_timeout` bounds calls whose context carries no deadline.
    pub fn new(addr: EngineAddr, default_timeout: Duration) -> Self {
        Self {
            addr,
            next_id: AtomicU64::new(1),
            default_timeout,
        }
    }

    /// Create a client from the bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.engine_addr.clone(), config.rpc_timeout)
    }

    /// The engine address this client talks to.
    pub fn addr(&self) -> &EngineAddr {
        &self.addr
    }

    /// Connect, send one request and read one response.
    async fn exchange(
        addr: &EngineAddr,
        id: u64,
        method: &str,
        payload: &[u8],
    ) -> Result<Value, AdapterError> {
        match addr {
            EngineAddr::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| AdapterError::transport(method, format!("connect {}: {e}", path.display())))?;
                Self::exchange_on(stream, id, method, payload).await
            }
            EngineAddr::Tcp(sock) => {
                let stream = TcpStream::connect(sock)
                    .await
                    .map_err(|e| AdapterError::transport(method, format!("connect {sock}: {e}")))?;
                Self::exchange_on(stream, id, method, payload).await
            }
        }
    }

    async fn exchange_on<S>(
        mut stream: S,
        id: u64,
        method: &str,
        payload: &[u8],
    ) -> Result<Value, AdapterError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream
            .write_all(payload)
            .await
            .map_err(|e| AdapterError::transport(method, e))?;
        stream
            .flush()
            .await
            .map_err(|e| AdapterError::transport(method, e))?;

        let response = Self::read_response(&mut stream, method).await?;
        if response.id != id {
            return Err(AdapterError::IdMismatch {
                method: method.to_owned(),
                expected: id,
                got: response.id,
            });
        }
        if let Some(err) = response.error {
            return Err(AdapterError::Remote {
                method: method.to_owned(),
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Read until one complete JSON response has been received.
    ///
    /// The engine does not frame its responses, so the buffer is re-parsed
    /// after every chunk until the parser stops reporting a truncated value.
    async fn read_response<S>(stream: &mut S, method: &str) -> Result<RpcResponse, AdapterError>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(READ_CHUNK);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| AdapterError::transport(method, e))?;
            if n == 0 {
                return Err(AdapterError::Eof {
                    method: method.to_owned(),
                });
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.len() > MAX_RESPONSE_LEN {
                return Err(AdapterError::codec(method, "response exceeds 16 MiB"));
            }

            let mut values = serde_json::Deserializer::from_slice(&buf).into_iter::<RpcResponse>();
            match values.next() {
                Some(Ok(response)) => return Ok(response),
                Some(Err(e)) if e.is_eof() => continue,
                Some(Err(e)) => return Err(AdapterError::codec(method, e)),
                None => continue,
            }
        }
    }
}

#[async_trait]
impl EngineClient for JsonRpcClient {
    #[instrument(skip(self, ctx, params), fields(addr = %self.addr))]
    async fn call(
        &self,
        ctx: &CallContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, AdapterError> {
        if let Some(why) = ctx.interruption() {
            return Err(why.into_error(method));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&RpcRequest::new(id, method, params.as_ref()))
            .map_err(|e| AdapterError::codec(method, e))?;
        let ctx = ctx.or_timeout(self.default_timeout);

        let addr = self.addr.clone();
        let task_method = method.to_owned();
        let mut task =
            tokio::spawn(async move { Self::exchange(&addr, id, &task_method, &payload).await });

        debug!(id, "engine request sent");
        tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) => Err(AdapterError::transport(method, format!("engine call task failed: {e}"))),
            },
            why = ctx.done() => {
                task.abort();
                warn!(id, ?why, "engine call interrupted before response, connection dropped");
                Err(why.into_error(method))
            }
        }
    }
}
