//! HTTP surface tests against a served router

mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use sqlx::SqlitePool;

use peerctl::api::{self, AppState};
use peerctl::models::{Network, PortInfo};
use peerctl::refs::Resolver;
use peerctl::tasks::TaskRegistry;
use peerctl::workflow::SessionWorkflow;
use peerctl_common::config::Config;
use peerctl_common::db;

use common::{contact, member, remote_network, resolver, RecordingTransport};

struct Served {
    base: String,
    pool: SqlitePool,
    resolver: Arc<Resolver>,
}

/// AS63311 and AS20 share exchanges 239 and 240; AS63311 is alone at 300
fn standard_resolver() -> Arc<Resolver> {
    resolver(
        vec![
            member(1, 63311, 239, "206.41.110.18", "2001:504:41::18"),
            member(2, 63311, 240, "198.32.118.18", ""),
            member(3, 63311, 300, "203.0.113.18", ""),
            member(4, 20, 239, "206.41.110.48", "2001:504:41::48"),
            member(5, 20, 240, "198.32.118.48", ""),
        ],
        vec![remote_network(63311, "Ours"), remote_network(20, "Peer20")],
        vec![contact(20, "peering@peer20.example.net")],
        vec![],
    )
}

async fn serve() -> Served {
    let pool = db::init_memory_pool().await.unwrap();
    let resolver = standard_resolver();

    let state = AppState {
        db: pool.clone(),
        resolver: resolver.clone(),
        transport: Arc::new(RecordingTransport::default()),
        config: Arc::new(Config::default()),
        tasks: TaskRegistry::new(),
    };

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Served {
        base,
        pool,
        resolver,
    }
}

#[tokio::test]
async fn exchanges_endpoint_lists_presence() {
    let served = serve().await;
    Network::get_or_create(&served.pool, 63311).await.unwrap();

    let client = reqwest::Client::new();
    let body: Value = client
        .get(format!("{}/api/net/63311/exchanges", served.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let data: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(data, vec!["pdbctl:239", "pdbctl:240", "pdbctl:300"]);
}

#[tokio::test]
async fn peer_settings_roundtrip() {
    let served = serve().await;
    Network::get_or_create(&served.pool, 63311).await.unwrap();

    let client = reqwest::Client::new();
    let updated: Value = client
        .put(format!("{}/api/net/63311/peer/20", served.base))
        .json(&json!({"md5": "s3cret", "info_prefixes4": 120}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["md5_set"], true);
    assert_eq!(updated["info_prefixes4"], 120);

    let detail: Value = client
        .get(format!("{}/api/net/63311/peer/20", served.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["md5_set"], true);
    assert_eq!(detail["info_prefixes4"], 120);
    // no local override: falls through to the registry record
    assert_eq!(detail["info_prefixes6"], 50);
}

#[tokio::test]
async fn available_peers_endpoint_reports_port_and_device() {
    let served = serve().await;
    let net = Network::get_or_create(&served.pool, 63311).await.unwrap();

    // back our exchange-239 attachment with an inventory port
    let ours = member(1, 63311, 239, "206.41.110.18", "2001:504:41::18");
    let mut info = PortInfo::require_for_member(&served.pool, net.id, &ours)
        .await
        .unwrap();
    let allocated = served
        .resolver
        .request_dummy_ports(
            63311,
            &[peerctl::bridge::DummyPortRequest {
                name: "peerctl:pdbctl:1".to_string(),
                ip_address_4: Some("206.41.110.18".to_string()),
                ip_address_6: None,
            }],
            "dummy",
        )
        .await
        .unwrap();
    info.assign_port(&served.pool, allocated[0].id).await.unwrap();

    let client = reqwest::Client::new();
    let body: Value = client
        .get(format!(
            "{}/api/net/63311/port/{}/peers",
            served.base, allocated[0].id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["device"], 900);
    let asns: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["asn"].as_u64().unwrap())
        .collect();
    assert_eq!(asns, vec![20]);
}

#[tokio::test]
async fn session_meta_roundtrip() {
    let served = serve().await;
    let net = Network::get_or_create(&served.pool, 63311).await.unwrap();

    let workflow = SessionWorkflow::new(served.pool.clone(), served.resolver.clone(), 100);
    let (_, sessions) = workflow
        .request(&net, 20, "tester", "email", &[])
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let body: Value = client
        .put(format!(
            "{}/api/net/63311/session/{}/meta",
            served.base, sessions[0].id
        ))
        .json(&json!({"version": 4, "meta": {"last_updown": "never", "speed": 1000}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["id"], sessions[0].id);
    // non-numeric last_updown is coerced on the way in
    assert_eq!(body["meta"]["last_updown"], 0);
    assert_eq!(body["meta"]["speed"], 1000);

    // a session may not be edited through another network's path
    let status = client
        .put(format!(
            "{}/api/net/20/session/{}/meta",
            served.base, sessions[0].id
        ))
        .json(&json!({"version": 4, "meta": {}}))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 404);
}
