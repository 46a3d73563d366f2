//! Shared fixtures: in-memory database plus stubbed service bridges

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use peerctl::bridge::{
    BridgeError, DummyPortRequest, Member, MemberDirectory, MemberFilter, NetworkContact,
    NetworkDirectory, PortDirectory, RemoteDevice, RemoteNetwork, RemotePort,
};
use peerctl::email::{EmailMessage, EmailTransport};
use peerctl::refs::Resolver;
use peerctl_common::RefSource;

pub struct StubMembers {
    pub members: Vec<Member>,
}

#[async_trait]
impl MemberDirectory for StubMembers {
    async fn members(&self, filter: MemberFilter) -> Result<Vec<Member>, BridgeError> {
        let out = self
            .members
            .iter()
            .filter(|m| {
                if let Some(asn) = filter.asn {
                    return m.asn == asn;
                }
                if !filter.asns.is_empty() {
                    return filter.asns.contains(&m.asn);
                }
                if let Some(ix) = filter.ix {
                    return m.ix_id == ix;
                }
                if !filter.ids.is_empty() {
                    return filter.ids.contains(&m.id);
                }
                true
            })
            .cloned()
            .collect();
        Ok(out)
    }
}

#[derive(Default)]
pub struct StubNetworks {
    pub networks: HashMap<u32, RemoteNetwork>,
    pub contacts: HashMap<u32, NetworkContact>,
    /// Per-method call counters, for asserting on batching behavior
    pub network_calls: AtomicU32,
    pub networks_calls: AtomicU32,
}

#[async_trait]
impl NetworkDirectory for StubNetworks {
    async fn network(&self, asn: u32) -> Result<Option<RemoteNetwork>, BridgeError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.networks.get(&asn).cloned())
    }

    async fn networks(&self, asns: &[u32]) -> Result<Vec<RemoteNetwork>, BridgeError> {
        self.networks_calls.fetch_add(1, Ordering::SeqCst);
        Ok(asns
            .iter()
            .filter_map(|asn| self.networks.get(asn).cloned())
            .collect())
    }

    async fn contact(
        &self,
        asn: u32,
        role: &str,
        require_email: bool,
    ) -> Result<Option<NetworkContact>, BridgeError> {
        Ok(self
            .contacts
            .get(&asn)
            .filter(|c| c.role == role && (!require_email || !c.email.is_empty()))
            .cloned())
    }
}

pub struct StubPorts {
    pub ports: Mutex<HashMap<i64, RemotePort>>,
    pub devices: HashMap<i64, RemoteDevice>,
    /// Next id handed out for a dummy-port allocation
    pub next_id: Mutex<i64>,
    /// Device backing allocated dummy ports
    pub dummy_device: i64,
}

impl Default for StubPorts {
    fn default() -> Self {
        StubPorts {
            ports: Mutex::new(HashMap::new()),
            devices: HashMap::new(),
            next_id: Mutex::new(1000),
            dummy_device: 900,
        }
    }
}

#[async_trait]
impl PortDirectory for StubPorts {
    async fn port(&self, id: i64) -> Result<Option<RemotePort>, BridgeError> {
        Ok(self.ports.lock().unwrap().get(&id).cloned())
    }

    async fn device(&self, id: i64) -> Result<Option<RemoteDevice>, BridgeError> {
        Ok(self.devices.get(&id).cloned())
    }

    async fn request_dummy_ports(
        &self,
        _asn: u32,
        specs: &[DummyPortRequest],
        _device_type: &str,
    ) -> Result<Vec<RemotePort>, BridgeError> {
        let mut ports = self.ports.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut out = Vec::with_capacity(specs.len());
        for spec in specs {
            *next_id += 1;
            let port = RemotePort {
                id: *next_id,
                device_id: self.dummy_device,
                ip_address_4: spec.ip_address_4.clone(),
                ip_address_6: spec.ip_address_6.clone(),
                is_management: false,
                virtual_port_name: spec.name.clone(),
                mac_address: None,
                speed: 0,
            };
            ports.insert(port.id, port.clone());
            out.push(port);
        }
        Ok(out)
    }
}

/// Transport that records every delivered message
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn deliver(&self, message: &EmailMessage) -> peerctl::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn member(id: i64, asn: u32, ix_id: i64, ip4: &str, ip6: &str) -> Member {
    Member {
        id,
        asn,
        ix_id,
        source: RefSource::Pdbctl,
        name: format!("IX {ix_id}"),
        ipaddr4: Some(ip4.to_string()),
        ipaddr6: if ip6.is_empty() {
            None
        } else {
            Some(ip6.to_string())
        },
        is_rs_peer: false,
        speed: 10000,
        pdb_ix_id: None,
    }
}

pub fn remote_network(asn: u32, name: &str) -> RemoteNetwork {
    RemoteNetwork {
        asn,
        name: name.to_string(),
        website: format!("https://{}.example.com", name.to_lowercase()),
        info_type: "NSP".to_string(),
        info_prefixes4: 100,
        info_prefixes6: 50,
        info_ratio: "Balanced".to_string(),
        info_scope: "Global".to_string(),
        info_traffic: "1-5Tbps".to_string(),
        info_unicast: true,
        info_multicast: false,
        info_never_via_route_servers: false,
        irr_as_set: format!("AS-{}", name.to_uppercase()),
    }
}

pub fn contact(asn: u32, email: &str) -> NetworkContact {
    NetworkContact {
        asn,
        role: "Policy".to_string(),
        email: email.to_string(),
    }
}

/// Resolver over stub directories. `members` should contain records for
/// every ASN the test touches.
pub fn resolver(
    members: Vec<Member>,
    networks: Vec<RemoteNetwork>,
    contacts: Vec<NetworkContact>,
    ports: Vec<RemotePort>,
) -> Arc<Resolver> {
    let member_dir = Arc::new(StubMembers { members });
    let network_dir = Arc::new(StubNetworks {
        networks: networks.into_iter().map(|n| (n.asn, n)).collect(),
        contacts: contacts.into_iter().map(|c| (c.asn, c)).collect(),
        ..Default::default()
    });
    let port_dir = Arc::new(StubPorts {
        ports: Mutex::new(ports.into_iter().map(|p| (p.id, p)).collect()),
        ..Default::default()
    });

    Arc::new(Resolver::new(member_dir, network_dir, port_dir))
}
