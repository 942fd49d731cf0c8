//! Test support: a stateful in-process engine and logger setup.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::engine::*;
use crate::error::AdapterError;
use crate::transport::{CallContext, EngineClient};

const EEXIST: i64 = -17;
const ENODEV: i64 = -19;
const EINVAL: i64 = -22;
const METHOD_NOT_FOUND: i64 = -32601;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the engine saw of a PSK file while the attach call ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskObservation {
    pub path: String,
    pub mode: u32,
    pub contents: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    bdevs: BTreeMap<String, BdevInfo>,
    keys: HashSet<String>,
    qos: HashMap<String, QosLimitParams>,
    attached: Vec<NvmeAttachParams>,
    iostat: HashMap<String, BdevIoStat>,
    calls: Vec<(String, Value)>,
    fail_next: HashMap<String, AdapterError>,
    refuse_delete: HashSet<String>,
    psk_seen: Vec<PskObservation>,
}

/// Engine double that keeps devices in memory and records every call.
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

fn remote(method: &str, code: i64, message: &str) -> AdapterError {
    AdapterError::Remote {
        method: method.to_owned(),
        code,
        message: message.to_owned(),
    }
}

fn parse<T: serde::de::DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, AdapterError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| remote(method, EINVAL, &format!("invalid parameters: {e}")))
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Add a device as if it had been created outside the bridge.
    pub fn seed_bdev(&self, name: &str, product: &str, block_size: u32, num_blocks: u64) {
        self.state().bdevs.insert(
            name.to_owned(),
            BdevInfo {
                name: name.to_owned(),
                product_name: product.to_owned(),
                block_size,
                num_blocks,
                uuid: Some(format!("uuid-{name}")),
            },
        );
    }

    pub fn set_iostat(&self, stat: BdevIoStat) {
        self.state().iostat.insert(stat.name.clone(), stat);
    }

    /// Make the next call of `method` fail with `err`.
    pub fn fail_next(&self, method: &str, err: AdapterError) {
        self.state().fail_next.insert(method.to_owned(), err);
    }

    /// Make delete calls for `name` answer `false`.
    pub fn refuse_delete(&self, name: &str) {
        self.state().refuse_delete.insert(name.to_owned());
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state().calls.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.state().calls.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn calls_of(&self, method: &str) -> Vec<Value> {
        self.state()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn has_bdev(&self, name: &str) -> bool {
        self.state().bdevs.contains_key(name)
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.state().keys.contains(name)
    }

    pub fn qos_of(&self, name: &str) -> Option<QosLimitParams> {
        self.state().qos.get(name).cloned()
    }

    pub fn attached(&self) -> Vec<NvmeAttachParams> {
        self.state().attached.clone()
    }

    pub fn psk_seen(&self) -> Vec<PskObservation> {
        self.state().psk_seen.clone()
    }

    fn create_bdev(
        state: &mut State,
        method: &str,
        name: &str,
        product: &str,
        block_size: u32,
        num_blocks: u64,
    ) -> Result<Value, AdapterError> {
        if state.bdevs.contains_key(name) {
            return Err(remote(method, EEXIST, "File exists"));
        }
        state.bdevs.insert(
            name.to_owned(),
            BdevInfo {
                name: name.to_owned(),
                product_name: product.to_owned(),
                block_size,
                num_blocks,
                uuid: Some(format!("uuid-{name}")),
            },
        );
        Ok(json!(name))
    }

    fn delete_bdev(state: &mut State, method: &str, name: &str) -> Result<Value, AdapterError> {
        if state.refuse_delete.contains(name) {
            return Ok(json!(false));
        }
        if state.bdevs.remove(name).is_none() {
            return Err(remote(method, ENODEV, "No such device"));
        }
        state.qos.remove(name);
        Ok(json!(true))
    }

    fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, AdapterError> {
        let mut state = self.state();
        state
            .calls
            .push((method.to_owned(), params.clone().unwrap_or(Value::Null)));
        if let Some(err) = state.fail_next.remove(method) {
            return Err(err);
        }

        match method {
            BDEV_AIO_CREATE => {
                let p: AioCreateParams = parse(method, params)?;
                Self::create_bdev(&mut state, method, &p.name, PRODUCT_AIO, p.block_size, 2048)
            }
            BDEV_NULL_CREATE | BDEV_MALLOC_CREATE => {
                let p: SizedCreateParams = parse(method, params)?;
                let product = if method == BDEV_NULL_CREATE {
                    PRODUCT_NULL
                } else {
                    PRODUCT_MALLOC
                };
                Self::create_bdev(&mut state, method, &p.name, product, p.block_size, p.num_blocks)
            }
            BDEV_AIO_DELETE | BDEV_NULL_DELETE | BDEV_MALLOC_DELETE | BDEV_CRYPTO_DELETE => {
                let p: NameParams = parse(method, params)?;
                Self::delete_bdev(&mut state, method, &p.name)
            }
            BDEV_GET_BDEVS => match params {
                Some(p) => {
                    let p: NameParams = parse(method, Some(p))?;
                    let info = state
                        .bdevs
                        .get(&p.name)
                        .ok_or_else(|| remote(method, ENODEV, "No such device"))?;
                    Ok(json!([info]))
                }
                None => Ok(json!(state.bdevs.values().collect::<Vec<_>>())),
            },
            BDEV_GET_IOSTAT => {
                let p: NameParams = parse(method, params)?;
                if !state.bdevs.contains_key(&p.name) {
                    return Err(remote(method, ENODEV, "No such device"));
                }
                let stat = state.iostat.get(&p.name).cloned().unwrap_or(BdevIoStat {
                    name: p.name.clone(),
                    ..Default::default()
                });
                Ok(json!(IoStatResult {
                    tick_rate: 1_000_000,
                    bdevs: vec![stat],
                }))
            }
            BDEV_NVME_ATTACH_CONTROLLER => {
                let p: NvmeAttachParams = parse(method, params)?;
                if let Some(path) = &p.psk {
                    let mode = std::fs::metadata(path)
                        .map(|m| m.permissions().mode() & 0o777)
                        .map_err(|e| remote(method, EINVAL, &e.to_string()))?;
                    let contents =
                        std::fs::read(path).map_err(|e| remote(method, EINVAL, &e.to_string()))?;
                    state.psk_seen.push(PskObservation {
                        path: path.clone(),
                        mode,
                        contents,
                    });
                }
                let bdev = format!("{}n1", p.name);
                state.attached.push(p);
                Ok(json!([bdev]))
            }
            BDEV_NVME_DETACH_CONTROLLER => {
                let p: NvmeDetachParams = parse(method, params)?;
                let before = state.attached.len();
                state
                    .attached
                    .retain(|a| !(a.name == p.name && a.traddr == p.traddr && a.trsvcid == p.trsvcid));
                if state.attached.len() == before {
                    return Err(remote(method, ENODEV, "No such device"));
                }
                Ok(json!(true))
            }
            ACCEL_CRYPTO_KEY_CREATE => {
                let p: CryptoKeyCreateParams = parse(method, params)?;
                if !state.keys.insert(p.name) {
                    return Err(remote(method, EEXIST, "key already exists"));
                }
                Ok(json!(true))
            }
            ACCEL_CRYPTO_KEY_DESTROY => {
                let p: CryptoKeyDestroyParams = parse(method, params)?;
                if !state.keys.remove(&p.key_name) {
                    return Err(remote(method, ENODEV, "No such key"));
                }
                Ok(json!(true))
            }
            BDEV_CRYPTO_CREATE => {
                let p: CryptoCreateParams = parse(method, params)?;
                let base = state
                    .bdevs
                    .get(&p.base_bdev_name)
                    .cloned()
                    .ok_or_else(|| remote(method, ENODEV, "No such device"))?;
                if !state.keys.contains(&p.key_name) {
                    return Err(remote(method, EINVAL, "key not found"));
                }
                Self::create_bdev(&mut state, method, &p.name, "crypto", base.block_size, base.num_blocks)
            }
            BDEV_SET_QOS_LIMIT => {
                let p: QosLimitParams = parse(method, params)?;
                if !state.bdevs.contains_key(&p.name) {
                    return Err(remote(method, ENODEV, "No such device"));
                }
                state.qos.insert(p.name.clone(), p);
                Ok(json!(true))
            }
            SPDK_GET_VERSION => Ok(json!({ "version": "SPDK v24.01" })),
            _ => Err(remote(method, METHOD_NOT_FOUND, "Method not found")),
        }
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn call(
        &self,
        ctx: &CallContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, AdapterError> {
        if let Some(interruption) = ctx.interruption() {
            return Err(interruption.into_error(method));
        }
        self.handle(method, params)
    }
}
