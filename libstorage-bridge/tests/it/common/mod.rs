//! Shared rig: an engine that speaks JSON-RPC on a Unix socket.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libstorage_bridge::{BridgeConfig, EngineAddr, JsonRpcClient, StorageBridge};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

const ENODEV: i64 = -19;
const EEXIST: i64 = -17;
const METHOD_NOT_FOUND: i64 = -32601;

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
struct EngineState {
    /// name -> (product, block_size, num_blocks)
    bdevs: BTreeMap<String, (String, u64, u64)>,
    /// controller name -> attached (traddr, trsvcid)
    attached: HashMap<String, Vec<(String, Option<String>)>>,
    calls: Vec<(String, Value)>,
}

/// Engine double reached through a real socket.
pub struct SocketEngine {
    state: Arc<Mutex<EngineState>>,
    socket: PathBuf,
    _dir: tempfile::TempDir,
    task: JoinHandle<()>,
}

impl SocketEngine {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let state = Arc::new(Mutex::new(EngineState::default()));
        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(serve_connection(stream, state));
            }
        });
        Self {
            state,
            socket,
            _dir: dir,
            task,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// A bridge whose client talks to this engine.
    pub fn bridge(&self) -> StorageBridge {
        let config = BridgeConfig {
            engine_addr: EngineAddr::Unix(self.socket.clone()),
            rpc_timeout: Duration::from_secs(5),
            ..BridgeConfig::default()
        };
        let client = JsonRpcClient::from_config(&config);
        StorageBridge::new(Arc::new(client), &config)
    }

    pub fn seed_malloc(&self, name: &str, num_blocks: u64) {
        self.state.lock().unwrap().bdevs.insert(
            name.to_owned(),
            ("Malloc disk".to_owned(), 512, num_blocks),
        );
    }

    pub fn has_bdev(&self, name: &str) -> bool {
        self.state.lock().unwrap().bdevs.contains_key(name)
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls_of(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Drop for SocketEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(mut stream: UnixStream, state: Arc<Mutex<EngineState>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let request = loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Ok(v) = serde_json::from_slice::<Value>(&buf) {
            break v;
        }
    };

    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_owned();
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let outcome = handle(&mut state.lock().unwrap(), &method, params);
    let response = match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        }
    };
    let _ = stream.write_all(&serde_json::to_vec(&response).unwrap()).await;
}

fn bdev_json(name: &str, (product, block_size, num_blocks): &(String, u64, u64)) -> Value {
    json!({
        "name": name,
        "product_name": product,
        "block_size": block_size,
        "num_blocks": num_blocks,
        "uuid": format!("uuid-{name}"),
    })
}

fn handle(state: &mut EngineState, method: &str, params: Value) -> Result<Value, (i64, String)> {
    state.calls.push((method.to_owned(), params.clone()));
    let name = params["name"].as_str().unwrap_or_default().to_owned();
    let no_device = || (ENODEV, "No such device".to_owned());

    match method {
        "bdev_aio_create" | "bdev_malloc_create" | "bdev_null_create" => {
            if state.bdevs.contains_key(&name) {
                return Err((EEXIST, "File exists".to_owned()));
            }
            let (product, blocks) = match method {
                "bdev_aio_create" => ("AIO disk", 2048),
                "bdev_malloc_create" => ("Malloc disk", params["num_blocks"].as_u64().unwrap_or(0)),
                _ => ("Null disk", params["num_blocks"].as_u64().unwrap_or(0)),
            };
            let block_size = params["block_size"].as_u64().unwrap_or(512);
            state
                .bdevs
                .insert(name.clone(), (product.to_owned(), block_size, blocks));
            Ok(json!(name))
        }
        "bdev_aio_delete" | "bdev_malloc_delete" | "bdev_null_delete" => state
            .bdevs
            .remove(&name)
            .map(|_| json!(true))
            .ok_or_else(no_device),
        "bdev_get_bdevs" if params.is_null() => Ok(Value::Array(
            state.bdevs.iter().map(|(n, b)| bdev_json(n, b)).collect(),
        )),
        "bdev_get_bdevs" => state
            .bdevs
            .get(&name)
            .map(|b| json!([bdev_json(&name, b)]))
            .ok_or_else(no_device),
        "bdev_get_iostat" => state
            .bdevs
            .get(&name)
            .map(|_| json!({"tick_rate": 1000, "bdevs": [{"name": name, "bytes_read": 512, "num_read_ops": 1}]}))
            .ok_or_else(no_device),
        "bdev_nvme_attach_controller" => {
            let traddr = params["traddr"].as_str().unwrap_or_default().to_owned();
            let trsvcid = params["trsvcid"].as_str().map(str::to_owned);
            state
                .attached
                .entry(name.clone())
                .or_default()
                .push((traddr, trsvcid));
            Ok(json!([format!("{name}n1")]))
        }
        "bdev_nvme_detach_controller" => {
            let traddr = params["traddr"].as_str().unwrap_or_default().to_owned();
            let trsvcid = params["trsvcid"].as_str().map(str::to_owned);
            let paths = state.attached.get_mut(&name).ok_or_else(no_device)?;
            let before = paths.len();
            paths.retain(|p| *p != (traddr.clone(), trsvcid.clone()));
            if paths.len() == before {
                return Err(no_device());
            }
            Ok(json!(true))
        }
        "spdk_get_version" => Ok(json!({"version": "SPDK v24.01"})),
        _ => Err((METHOD_NOT_FOUND, "Method not found".to_owned())),
    }
}
