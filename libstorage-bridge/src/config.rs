//! Bridge runtime configuration.
//!
//! Environment variables:
//! - `SBRIDGE_ENGINE_ADDR`: control socket of the storage engine. A value that
//!   parses as `host:port` selects TCP, anything else is a Unix socket path.
//!   Defaults to `/var/tmp/spdk.sock`.
//! - `SBRIDGE_RPC_TIMEOUT_MS`: per-call deadline for engine calls issued on
//!   behalf of a request that carries no deadline of its own. Defaults to
//!   `30000`.
//! - `SBRIDGE_PAGE_TOKENS`: maximum number of live pagination tokens. Defaults
//!   to `4096`.

use std::sync::LazyLock;
use std::time::Duration;

use tracing::warn;

use crate::transport::EngineAddr;

const DEFAULT_ENGINE_ADDR: &str = "/var/tmp/spdk.sock";
const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PAGE_TOKENS: usize = 4096;

/// Runtime configuration for the storage bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Where the engine's JSON-RPC control socket lives.
    pub engine_addr: EngineAddr,
    /// Default deadline applied to engine calls.
    pub rpc_timeout: Duration,
    /// Capacity of the pagination token store.
    pub page_token_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine_addr: EngineAddr::parse(DEFAULT_ENGINE_ADDR),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            page_token_capacity: DEFAULT_PAGE_TOKENS,
        }
    }
}

impl BridgeConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unparsable numeric values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let engine_addr = lookup("SBRIDGE_ENGINE_ADDR")
            .filter(|v| !v.is_empty())
            .map(|v| EngineAddr::parse(&v))
            .unwrap_or(defaults.engine_addr);

        let rpc_timeout = match lookup("SBRIDGE_RPC_TIMEOUT_MS").map(|v| v.parse::<u64>()) {
            Some(Ok(ms)) if ms > 0 => Duration::from_millis(ms),
            Some(_) => {
                warn!("ignoring invalid SBRIDGE_RPC_TIMEOUT_MS");
                defaults.rpc_timeout
            }
            None => defaults.rpc_timeout,
        };

        let page_token_capacity = match lookup("SBRIDGE_PAGE_TOKENS").map(|v| v.parse::<usize>()) {
            Some(Ok(n)) if n > 0 => n,
            Some(_) => {
                warn!("ignoring invalid SBRIDGE_PAGE_TOKENS");
                defaults.page_token_capacity
            }
            None => defaults.page_token_capacity,
        };

        Self {
            engine_addr,
            rpc_timeout,
            page_token_capacity,
        }
    }
}

/// Globally initialized bridge configuration, read from environment variables at first access.
pub static BRIDGE_CONFIG: LazyLock<BridgeConfig> = LazyLock::new(BridgeConfig::from_env);
