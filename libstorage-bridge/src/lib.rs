//! # libstorage-bridge: resource control plane for an SPDK-style engine
//!
//! `libstorage-bridge` exposes volumes, remote NVMe-oF controllers, their
//! paths, and encrypted or rate-limited overlay volumes as named resources
//! with create / get / update / delete / list / stats operations.  Every
//! operation is translated into JSON-RPC 2.0 calls against a local storage
//! engine.  It follows the RK8s conventions: Tokio async runtime, `tracing`
//! for observability, `thiserror` for structured errors.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Resource kinds, request and response structs. |
//! | [`naming`] | Resource ids, hierarchical names, update masks. |
//! | [`error`] | [`BridgeError`] and the engine-facing [`AdapterError`]. |
//! | [`status`] | Front API status codes; the one error-to-code mapping. |
//! | [`registry`] | Per-kind registry with the shared create/update/delete/list flows. |
//! | [`pagination`] | Bounded page-token store. |
//! | [`stack`] | Volume composition stacks in a generational arena. |
//! | [`integrity`] | Controller/path reference rules and PSK temp files. |
//! | [`store`] | Write-through key-value persistence seam. |
//! | [`engine`] | Engine method names and parameter shapes. |
//! | [`transport`] | JSON-RPC client, call context with cancellation and deadline. |
//! | [`identity`], [`volume`], [`controller`], [`path`], [`overlay`] | Service traits. |
//! | [`backend`] | [`StorageBridge`], implementing every service trait. |
//! | [`message`] | [`BridgeMessage`] envelope. |
//! | [`dispatch`] | Routes envelope requests to the services. |
//! | [`config`] | Environment-driven [`BridgeConfig`]. |

pub mod backend;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod identity;
pub mod integrity;
pub mod message;
pub mod naming;
pub mod overlay;
pub mod pagination;
pub mod path;
pub mod registry;
pub mod stack;
pub mod status;
pub mod store;
pub mod transport;
pub mod types;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::StorageBridge;
pub use config::{BRIDGE_CONFIG, BridgeConfig};
pub use controller::RemoteControllerService;
pub use dispatch::{BridgeHandler, dispatch, handle_json};
pub use error::{AdapterError, BridgeError};
pub use identity::IdentityService;
pub use message::BridgeMessage;
pub use naming::FieldMask;
pub use overlay::{EncryptedVolumeService, QosVolumeService};
pub use path::PathService;
pub use status::{Code, Status};
pub use transport::{CallContext, EngineAddr, EngineClient, JsonRpcClient};
pub use types::*;
pub use volume::VolumeService;
