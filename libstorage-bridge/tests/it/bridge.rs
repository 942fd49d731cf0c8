//! End-to-end tests: services → JSON-RPC client → engine socket.

use libstorage_bridge::*;
use serde_json::json;

use crate::common::{SocketEngine, init_logger};

fn aio(filename: &str) -> Volume {
    Volume {
        name: String::new(),
        spec: VolumeSpec::Aio {
            filename: filename.to_owned(),
            block_size: 0,
            blocks_count: 0,
        },
        uuid: None,
    }
}

fn tcp_controller() -> RemoteController {
    RemoteController {
        name: String::new(),
        transport: TransportKind::Tcp,
        multipath: MultipathPolicy::Failover,
        psk: None,
        hdgst: false,
        ddgst: false,
    }
}

fn tcp_path(port: u16) -> Path {
    Path {
        name: String::new(),
        controller_name_ref: String::new(),
        transport: TransportKind::Tcp,
        traddr: "10.0.0.5".into(),
        trsvcid: Some(port),
        adrfam: Some(AddressFamily::Ipv4),
        subnqn: "nqn.2016-06.io.spdk:cnode1".into(),
        hostnqn: String::new(),
    }
}

/// Creating the same volume twice returns the stored copy and leaves the
/// engine alone the second time.
#[tokio::test(flavor = "multi_thread")]
async fn create_volume_is_idempotent() {
    init_logger();
    let engine = SocketEngine::start().await;
    let bridge = engine.bridge();
    let ctx = CallContext::background();

    let first = bridge
        .create_volume(&ctx, CreateRequest::new("vol1", aio("/tmp/f")))
        .await
        .unwrap();
    assert_eq!(first.name, "//storage.rk8s.io/volumes/vol1");
    assert_eq!(first.spec.block_size(), 512);
    assert!(engine.has_bdev("vol1"));

    let calls = engine.call_count();
    let second = bridge
        .create_volume(&ctx, CreateRequest::new("vol1", aio("/tmp/f")))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.call_count(), calls);
}

/// Engine-created devices are listed and paged one at a time.
#[tokio::test(flavor = "multi_thread")]
async fn list_pages_through_engine_devices() {
    init_logger();
    let engine = SocketEngine::start().await;
    engine.seed_malloc("Malloc0", 32);
    engine.seed_malloc("Malloc1", 32);
    let bridge = engine.bridge();
    let ctx = CallContext::background();
    let parent = "//storage.rk8s.io/volumes";

    let page = bridge
        .list_volumes(&ctx, ListRequest::new(parent, 1, ""))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name, "//storage.rk8s.io/volumes/Malloc0");
    assert!(!page.next_page_token.is_empty());

    let page = bridge
        .list_volumes(&ctx, ListRequest::new(parent, 1, page.next_page_token))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name, "//storage.rk8s.io/volumes/Malloc1");
    assert!(page.next_page_token.is_empty());

    let err = bridge
        .list_volumes(&ctx, ListRequest::new(parent, 1, "no-such-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotFound(_)));
}

/// Paths cannot be created under an unknown controller.
#[tokio::test(flavor = "multi_thread")]
async fn path_needs_existing_controller() {
    init_logger();
    let engine = SocketEngine::start().await;
    let bridge = engine.bridge();

    let err = bridge
        .create_path(
            &CallContext::background(),
            CreateRequest::new("p1", tcp_path(4420)).with_parent("ctrl-x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(&err, BridgeError::NotFound(m) if m.contains("ctrl-x")));
    assert_eq!(Status::from(err).code(), Code::NotFound);
    assert_eq!(engine.call_count(), 0);
}

/// The first path attaches without a multipath mode, later ones carry the
/// controller's policy.  The controller stays until its paths are gone.
#[tokio::test(flavor = "multi_thread")]
async fn multipath_and_referential_guard() {
    init_logger();
    let engine = SocketEngine::start().await;
    let bridge = engine.bridge();
    let ctx = CallContext::background();

    let c1 = bridge
        .create_remote_controller(&ctx, CreateRequest::new("c1", tcp_controller()))
        .await
        .unwrap();
    let p1 = bridge
        .create_path(&ctx, CreateRequest::new("p1", tcp_path(4420)).with_parent("c1"))
        .await
        .unwrap();
    let p2 = bridge
        .create_path(&ctx, CreateRequest::new("p2", tcp_path(4421)).with_parent(&c1.name))
        .await
        .unwrap();

    let attaches = engine.calls_of("bdev_nvme_attach_controller");
    assert_eq!(attaches.len(), 2);
    assert!(attaches[0].get("multipath").is_none());
    assert_eq!(attaches[1]["multipath"], json!("failover"));

    let paths = bridge
        .list_paths(&ctx, ListRequest::new(&c1.name, 0, ""))
        .await
        .unwrap();
    assert_eq!(
        paths.items.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        [p1.name.as_str(), p2.name.as_str()]
    );

    let err = bridge
        .delete_remote_controller(&ctx, DeleteRequest::new(&c1.name, false))
        .await
        .unwrap_err();
    assert_eq!(Status::from(err).code(), Code::FailedPrecondition);

    for p in [&p1, &p2] {
        bridge
            .delete_path(&ctx, DeleteRequest::new(&p.name, false))
            .await
            .unwrap();
    }
    bridge
        .delete_remote_controller(&ctx, DeleteRequest::new(&c1.name, false))
        .await
        .unwrap();
}

/// Deleting something that is already gone fails unless the caller allows it.
#[tokio::test(flavor = "multi_thread")]
async fn delete_allow_missing() {
    init_logger();
    let engine = SocketEngine::start().await;
    let bridge = engine.bridge();
    let ctx = CallContext::background();
    let name = "//storage.rk8s.io/volumes/ghost";

    let err = bridge
        .delete_volume(&ctx, DeleteRequest::new(name, false))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotFound(_)));
    bridge
        .delete_volume(&ctx, DeleteRequest::new(name, true))
        .await
        .unwrap();

    let vol = bridge
        .create_volume(&ctx, CreateRequest::new("vol2", aio("/tmp/g")))
        .await
        .unwrap();
    bridge
        .delete_volume(&ctx, DeleteRequest::new(&vol.name, false))
        .await
        .unwrap();
    assert!(!engine.has_bdev("vol2"));
    let err = bridge
        .get_volume(&ctx, GetRequest::new(&vol.name))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotFound(_)));
}

/// Stats and identity go through the socket as well.
#[tokio::test(flavor = "multi_thread")]
async fn stats_and_identity() {
    init_logger();
    let engine = SocketEngine::start().await;
    let bridge = engine.bridge();
    let ctx = CallContext::background();

    let vol = bridge
        .create_volume(&ctx, CreateRequest::new("vol3", aio("/tmp/h")))
        .await
        .unwrap();
    let stats = bridge
        .stats_volume(&ctx, StatsRequest::new(&vol.name))
        .await
        .unwrap();
    assert_eq!(stats.read_bytes, 512);
    assert_eq!(stats.read_ops, 1);

    let info = bridge.get_plugin_info(&ctx).await.unwrap();
    assert_eq!(info.engine_version.as_deref(), Some("SPDK v24.01"));
    assert!(bridge.probe(&ctx).await.unwrap());
}

/// A bridge pointed at a socket nobody listens on reports itself unhealthy.
#[tokio::test(flavor = "multi_thread")]
async fn probe_without_engine() {
    init_logger();
    let engine = SocketEngine::start().await;
    let config = BridgeConfig {
        engine_addr: EngineAddr::Unix(engine.socket().with_file_name("absent.sock")),
        ..BridgeConfig::default()
    };
    let bridge = StorageBridge::connect(&config);
    assert!(!bridge.probe(&CallContext::background()).await.unwrap());
}

/// The JSON envelope drives the same flows.
#[tokio::test(flavor = "multi_thread")]
async fn json_envelope() {
    init_logger();
    let engine = SocketEngine::start().await;
    let bridge = engine.bridge();
    let ctx = CallContext::background();

    let request = json!({
        "CreateVolume": {
            "id": "vol4",
            "resource": {"spec": {"type": "malloc", "blocks_count": 16}}
        }
    });
    let out = handle_json(&bridge, &ctx, &serde_json::to_vec(&request).unwrap())
        .await
        .unwrap();
    let reply: BridgeMessage = serde_json::from_slice(&out).unwrap();
    match reply {
        BridgeMessage::Resource(AnyResource::Volume(vol)) => {
            assert_eq!(vol.name, "//storage.rk8s.io/volumes/vol4");
            assert_eq!(vol.spec.blocks_count(), 16);
        }
        other => panic!("unexpected {other}"),
    }

    let out = handle_json(
        &bridge,
        &ctx,
        &serde_json::to_vec(&json!({"GetVolume": {"name": "//storage.rk8s.io/volumes/Bad"}})).unwrap(),
    )
    .await
    .unwrap();
    let reply: BridgeMessage = serde_json::from_slice(&out).unwrap();
    assert!(matches!(reply, BridgeMessage::Error(s) if s.code() == Code::InvalidArgument));
}
