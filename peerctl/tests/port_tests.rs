//! Attachment-record and port-view tests over stubbed bridges

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use peerctl::models::{IpVersion, Network, PortInfo, PortObject};
use peerctl::refs::Resolver;
use peerctl_common::db;

use common::{member, remote_network, resolver, StubMembers, StubNetworks, StubPorts};

#[tokio::test]
async fn floating_record_prefers_the_manual_address() {
    let pool = db::init_memory_pool().await.unwrap();
    let ours = member(1, 63311, 239, "206.41.110.18", "2001:504:41::18");
    let resolver = resolver(vec![ours.clone()], vec![], vec![], vec![]);
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let info = PortInfo::require_for_member(&pool, net.id, &ours).await.unwrap();
    assert_eq!(info.port, 0);

    // a manually entered v4 address overrides the member record; v6 has
    // no manual value and falls through to the member
    sqlx::query("UPDATE peerctl_port_info SET ip_address_4 = ? WHERE id = ?")
        .bind("198.51.100.7")
        .bind(info.id)
        .execute(&pool)
        .await
        .unwrap();
    let info = PortInfo::by_id(&pool, info.id).await.unwrap();

    assert_eq!(
        info.ipaddr(&resolver, IpVersion::V4).await.unwrap().as_deref(),
        Some("198.51.100.7")
    );
    assert_eq!(
        info.ipaddr(&resolver, IpVersion::V6).await.unwrap().as_deref(),
        Some("2001:504:41::18")
    );
}

#[tokio::test]
async fn floating_record_absorbs_a_missing_reference() {
    let pool = db::init_memory_pool().await.unwrap();
    let ours = member(1, 63311, 239, "206.41.110.18", "");
    // directory has no record for the member the row points at
    let resolver = resolver(vec![], vec![], vec![], vec![]);
    let net = Network::get_or_create(&pool, 63311).await.unwrap();

    let info = PortInfo::require_for_member(&pool, net.id, &ours).await.unwrap();

    // no port, no manual value, no resolvable member: the address reads
    // as absent rather than erroring
    assert_eq!(info.ipaddr(&resolver, IpVersion::V4).await.unwrap(), None);
    assert_eq!(info.ipaddr(&resolver, IpVersion::V6).await.unwrap(), None);
}

#[tokio::test]
async fn available_peers_preload_networks_in_one_call() {
    let pool = db::init_memory_pool().await.unwrap();

    let ours = member(1, 63311, 239, "206.41.110.18", "");
    let members = vec![
        ours.clone(),
        member(2, 20, 239, "206.41.110.48", ""),
        member(3, 21, 239, "206.41.110.49", ""),
        member(4, 30, 500, "192.0.2.30", ""),
    ];

    let networks = Arc::new(StubNetworks {
        networks: [
            (20, remote_network(20, "Peer20")),
            (21, remote_network(21, "Peer21")),
        ]
        .into_iter()
        .collect(),
        contacts: HashMap::new(),
        ..Default::default()
    });
    let ports = Arc::new(StubPorts {
        ports: Mutex::new(
            [(
                10,
                peerctl::bridge::RemotePort {
                    id: 10,
                    device_id: 7,
                    ip_address_4: Some("206.41.110.18".to_string()),
                    ip_address_6: None,
                    is_management: false,
                    virtual_port_name: "eth0".to_string(),
                    mac_address: None,
                    speed: 10000,
                },
            )]
            .into_iter()
            .collect(),
        ),
        ..Default::default()
    });
    let resolver = Resolver::new(
        Arc::new(StubMembers { members }),
        networks.clone(),
        ports,
    );

    let net = Network::get_or_create(&pool, 63311).await.unwrap();
    let mut info = PortInfo::require_for_member(&pool, net.id, &ours).await.unwrap();
    info.assign_port(&pool, 10).await.unwrap();

    let port = PortObject::by_port(&pool, &resolver, 10).await.unwrap().unwrap();
    assert_eq!(port.device_id(), Some(7));

    let peers = port.get_available_peers(&pool, &resolver).await.unwrap();

    // everyone at exchange 239 except ourselves, in stable order
    let asns: Vec<u32> = peers.iter().map(|m| m.asn).collect();
    assert_eq!(asns, vec![20, 21]);

    // their registry records came back in a single batched fetch, and
    // later per-network lookups are served from the cache
    assert_eq!(networks.networks_calls.load(Ordering::SeqCst), 1);
    resolver.network(20).await.unwrap();
    resolver.network(21).await.unwrap();
    assert_eq!(networks.network_calls.load(Ordering::SeqCst), 0);
}
