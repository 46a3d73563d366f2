//! Persisted entities
//!
//! One module per table. Locally-owned rows hold plain ids for anything
//! owned by an external service (inventory ports and devices); those are
//! resolved through `crate::refs` when remote data is needed.

pub mod audit;
pub mod email_log;
pub mod ix;
pub mod network;
pub mod peer_net;
pub mod peer_port;
pub mod peer_request;
pub mod peer_session;
pub mod policy;
pub mod port;
pub mod port_info;

pub use audit::{AuditEvent, AuditLog};
pub use email_log::{EmailLog, EmailLogRecipient};
pub use ix::InternetExchange;
pub use network::Network;
pub use peer_net::PeerNetwork;
pub use peer_port::PeerPort;
pub use peer_request::{PeerRequest, PeerRequestLocation};
pub use peer_session::{PeerSession, SessionStatus, SessionType};
pub use policy::{Policy, PolicyHolder};
pub use port::{PortObject, PortPolicy};
pub use port_info::PortInfo;

/// Ip protocol version argument used throughout the policy and address
/// accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn from_int(version: u8) -> Result<Self, crate::error::Error> {
        match version {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            other => Err(crate::error::Error::Validation(format!(
                "Invalid ip version: {other}"
            ))),
        }
    }

    pub fn as_int(&self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}
