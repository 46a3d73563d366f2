//! Service bridges
//!
//! peerctl reads reference data from three sibling services: the peeringdb
//! mirror (pdbctl), the exchange-member directory (ixctl) and the device
//! inventory (devicectl). Each is accessed through a generic fetch-by-filter
//! contract expressed as a trait here, with reqwest-backed clients as the
//! production implementations and in-memory stubs in tests.

pub mod devicectl;
pub mod ixctl;
pub mod pdbctl;
pub mod sot;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use devicectl::DevicectlClient;
pub use ixctl::IxctlClient;
pub use pdbctl::PdbctlClient;
pub use sot::SotDirectory;
pub use types::{
    DummyPortRequest, Member, NetworkContact, RemoteDevice, RemoteNetwork, RemotePort,
};

/// Bridge transport/decode errors
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Network(err.to_string())
    }
}

/// Filter for exchange-member queries
///
/// Mirrors the query shape both origin systems understand; unset fields are
/// not sent.
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    /// single ASN
    pub asn: Option<u32>,
    /// several ASNs fetched in one call
    pub asns: Vec<u32>,
    /// members at an exchange (id local to the queried source)
    pub ix: Option<i64>,
    /// specific member ids
    pub ids: Vec<i64>,
}

impl MemberFilter {
    pub fn asn(asn: u32) -> Self {
        Self {
            asn: Some(asn),
            ..Default::default()
        }
    }

    pub fn asns(asns: Vec<u32>) -> Self {
        Self {
            asns,
            ..Default::default()
        }
    }

    pub fn ix(ix: i64) -> Self {
        Self {
            ix: Some(ix),
            ..Default::default()
        }
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(asn) = self.asn {
            query.push(("asn".to_string(), asn.to_string()));
        }
        if !self.asns.is_empty() {
            let joined = self
                .asns
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(",");
            query.push(("asns".to_string(), joined));
        }
        if let Some(ix) = self.ix {
            query.push(("ix".to_string(), ix.to_string()));
        }
        if !self.ids.is_empty() {
            let joined = self
                .ids
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",");
            query.push(("ids".to_string(), joined));
        }
        query
    }
}

/// Exchange-membership directory, unified over both origin systems
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn members(&self, filter: MemberFilter) -> Result<Vec<Member>, BridgeError>;
}

/// peeringdb-style network and contact directory
#[async_trait]
pub trait NetworkDirectory: Send + Sync {
    async fn network(&self, asn: u32) -> Result<Option<RemoteNetwork>, BridgeError>;

    /// Batched variant used for preloading related data for a member set
    async fn networks(&self, asns: &[u32]) -> Result<Vec<RemoteNetwork>, BridgeError>;

    async fn contact(
        &self,
        asn: u32,
        role: &str,
        require_email: bool,
    ) -> Result<Option<NetworkContact>, BridgeError>;
}

/// Device inventory directory
#[async_trait]
pub trait PortDirectory: Send + Sync {
    async fn port(&self, id: i64) -> Result<Option<RemotePort>, BridgeError>;

    async fn device(&self, id: i64) -> Result<Option<RemoteDevice>, BridgeError>;

    /// Allocate placeholder ports for attachment records that have no
    /// physical port in the inventory yet
    async fn request_dummy_ports(
        &self,
        asn: u32,
        specs: &[DummyPortRequest],
        device_type: &str,
    ) -> Result<Vec<RemotePort>, BridgeError>;
}
