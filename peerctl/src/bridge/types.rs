//! Reference record types returned by the service bridges
//!
//! These records are owned by external systems; peerctl reads them through
//! the resolution layer but never writes them back.

use peerctl_common::{RefId, RefSource};
use serde::{Deserialize, Serialize};

/// Exchange membership record (a network's presence at an exchange)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// id local to the origin system
    pub id: i64,
    pub asn: u32,
    /// exchange id local to the origin system
    pub ix_id: i64,
    pub source: RefSource,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ipaddr4: Option<String>,
    #[serde(default)]
    pub ipaddr6: Option<String>,
    #[serde(default)]
    pub is_rs_peer: bool,
    #[serde(default)]
    pub speed: i64,
    /// peeringdb exchange id when the origin is ixctl and the exchange has
    /// a peeringdb reference
    #[serde(default)]
    pub pdb_ix_id: Option<i64>,
}

impl Member {
    /// Composite id of this member record
    pub fn ref_id(&self) -> RefId {
        RefId::new(self.source, self.id)
    }

    /// Composite id of the exchange this member sits at
    pub fn ref_ix_id(&self) -> RefId {
        RefId::new(self.source, self.ix_id)
    }

    /// peeringdb exchange id regardless of origin, when known
    pub fn pdb_ix_id(&self) -> Option<i64> {
        match self.source {
            RefSource::Pdbctl => Some(self.ix_id),
            RefSource::Ixctl => self.pdb_ix_id,
        }
    }
}

/// Network record from the registry mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNetwork {
    pub asn: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub info_type: String,
    #[serde(default)]
    pub info_prefixes4: u32,
    #[serde(default)]
    pub info_prefixes6: u32,
    #[serde(default)]
    pub info_ratio: String,
    #[serde(default)]
    pub info_scope: String,
    #[serde(default)]
    pub info_traffic: String,
    #[serde(default)]
    pub info_unicast: bool,
    #[serde(default)]
    pub info_multicast: bool,
    #[serde(default)]
    pub info_never_via_route_servers: bool,
    #[serde(default)]
    pub irr_as_set: String,
}

/// Network contact record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkContact {
    pub asn: u32,
    pub role: String,
    #[serde(default)]
    pub email: String,
}

/// Inventory port record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePort {
    pub id: i64,
    pub device_id: i64,
    #[serde(default)]
    pub ip_address_4: Option<String>,
    #[serde(default)]
    pub ip_address_6: Option<String>,
    #[serde(default)]
    pub is_management: bool,
    #[serde(default)]
    pub virtual_port_name: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub speed: i64,
}

/// Request body for a placeholder-port allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyPortRequest {
    pub name: String,
    #[serde(default)]
    pub ip_address_4: Option<String>,
    #[serde(default)]
    pub ip_address_6: Option<String>,
}

/// Inventory device record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
}

/// Generic fullctl-style list envelope
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}
