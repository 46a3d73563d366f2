//! Reference resolution
//!
//! Locally stored entities extend records owned by external directories
//! (exchange members, registry networks, inventory ports). A `Resolver`
//! performs the remote lookups, memoizing results for its own lifetime;
//! workflows and request handlers create one resolver per run, which gives
//! every entity touched during that run a consistent view of the remote data.
//!
//! Read paths absorb absence through the `RefFallback` strategies; write
//! paths that must confirm identity use the plain `Result` and let absence
//! propagate.

use std::collections::HashMap;
use std::sync::Arc;

use peerctl_common::RefId;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::bridge::types::{
    DummyPortRequest, Member, NetworkContact, RemoteDevice, RemoteNetwork, RemotePort,
};
use crate::bridge::{
    BridgeError, MemberDirectory, MemberFilter, NetworkDirectory, PortDirectory,
};

/// Reference resolution errors
#[derive(Debug, Error)]
pub enum RefError {
    /// The remote system has no record for the key
    #[error("Reference not found: {0}")]
    NotFound(String),

    /// The local entity carries no reference key at all
    #[error("Reference not set: {0}")]
    NotSet(String),

    /// Composite id carried an unrecognized source tag
    #[error("Invalid reference source: {0}")]
    SourceInvalid(String),

    /// Transport failure talking to the remote directory
    #[error("Bridge failure: {0}")]
    Bridge(String),
}

impl From<BridgeError> for RefError {
    fn from(err: BridgeError) -> Self {
        RefError::Bridge(err.to_string())
    }
}

/// Fallback strategies for read-path accessors
///
/// Absorbs only absence (`NotFound`/`NotSet`); an invalid source tag or a
/// transport failure still propagates.
pub trait RefFallback<T> {
    /// Constant default
    fn or_fallback(self, default: T) -> Result<T, RefError>;

    /// Zero value of the type
    fn or_fallback_default(self) -> Result<T, RefError>
    where
        T: Default;

    /// Derived default, evaluated lazily
    fn or_fallback_with(self, f: impl FnOnce() -> T) -> Result<T, RefError>;
}

impl<T> RefFallback<T> for Result<T, RefError> {
    fn or_fallback(self, default: T) -> Result<T, RefError> {
        self.or_fallback_with(|| default)
    }

    fn or_fallback_default(self) -> Result<T, RefError>
    where
        T: Default,
    {
        self.or_fallback_with(T::default)
    }

    fn or_fallback_with(self, f: impl FnOnce() -> T) -> Result<T, RefError> {
        match self {
            Ok(value) => Ok(value),
            Err(RefError::NotFound(msg)) | Err(RefError::NotSet(msg)) => {
                tracing::debug!(reason = %msg, "reference absent, using fallback");
                Ok(f())
            }
            Err(err) => Err(err),
        }
    }
}

/// Remote lookup with per-resolver memoization
pub struct Resolver {
    members: Arc<dyn MemberDirectory>,
    networks: Arc<dyn NetworkDirectory>,
    ports: Arc<dyn PortDirectory>,
    member_cache: Mutex<HashMap<RefId, Member>>,
    network_cache: Mutex<HashMap<u32, RemoteNetwork>>,
    port_cache: Mutex<HashMap<i64, RemotePort>>,
}

impl Resolver {
    pub fn new(
        members: Arc<dyn MemberDirectory>,
        networks: Arc<dyn NetworkDirectory>,
        ports: Arc<dyn PortDirectory>,
    ) -> Self {
        Self {
            members,
            networks,
            ports,
            member_cache: Mutex::new(HashMap::new()),
            network_cache: Mutex::new(HashMap::new()),
            port_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn member_directory(&self) -> Arc<dyn MemberDirectory> {
        Arc::clone(&self.members)
    }

    pub fn network_directory(&self) -> Arc<dyn NetworkDirectory> {
        Arc::clone(&self.networks)
    }

    /// Resolve a member record by composite reference id
    pub async fn member(&self, ref_id: RefId) -> Result<Member, RefError> {
        {
            let cache = self.member_cache.lock().await;
            if let Some(member) = cache.get(&ref_id) {
                return Ok(member.clone());
            }
        }

        let directory = self.source_directory(ref_id);
        let filter = MemberFilter {
            ids: vec![ref_id.id],
            ..Default::default()
        };

        let found = directory
            .members(filter)
            .await?
            .into_iter()
            .find(|m| m.ref_id() == ref_id);

        match found {
            Some(member) => {
                self.member_cache
                    .lock()
                    .await
                    .insert(ref_id, member.clone());
                Ok(member)
            }
            None => Err(RefError::NotFound(format!("member {ref_id}"))),
        }
    }

    /// Resolve a member from an optional stored composite id string
    pub async fn member_by_key(&self, ref_id: Option<&str>) -> Result<Member, RefError> {
        let key = match ref_id {
            Some(key) if !key.is_empty() => key,
            _ => return Err(RefError::NotSet("no member reference".to_string())),
        };

        let ref_id = RefId::parse(key).map_err(|e| RefError::SourceInvalid(e.to_string()))?;
        self.member(ref_id).await
    }

    /// Resolve a registry network record by ASN
    pub async fn network(&self, asn: u32) -> Result<RemoteNetwork, RefError> {
        {
            let cache = self.network_cache.lock().await;
            if let Some(network) = cache.get(&asn) {
                return Ok(network.clone());
            }
        }

        match self.networks.network(asn).await? {
            Some(network) => {
                self.network_cache.lock().await.insert(asn, network.clone());
                Ok(network)
            }
            None => Err(RefError::NotFound(format!("network AS{asn}"))),
        }
    }

    /// Resolve a network contact by ASN and role
    pub async fn contact(
        &self,
        asn: u32,
        role: &str,
        require_email: bool,
    ) -> Result<NetworkContact, RefError> {
        match self.networks.contact(asn, role, require_email).await? {
            Some(contact) => Ok(contact),
            None => Err(RefError::NotFound(format!("{role} contact for AS{asn}"))),
        }
    }

    /// Resolve an inventory port by id; id 0 means "floating", never looked up
    pub async fn port(&self, id: i64) -> Result<RemotePort, RefError> {
        if id <= 0 {
            return Err(RefError::NotSet("no port assigned".to_string()));
        }

        {
            let cache = self.port_cache.lock().await;
            if let Some(port) = cache.get(&id) {
                return Ok(port.clone());
            }
        }

        match self.ports.port(id).await? {
            Some(port) => {
                self.port_cache.lock().await.insert(id, port.clone());
                Ok(port)
            }
            None => Err(RefError::NotFound(format!("port {id}"))),
        }
    }

    /// Ask the inventory service for placeholder ports and prime the port
    /// cache with whatever it allocated
    pub async fn request_dummy_ports(
        &self,
        asn: u32,
        specs: &[DummyPortRequest],
        device_type: &str,
    ) -> Result<Vec<RemotePort>, RefError> {
        let ports = self.ports.request_dummy_ports(asn, specs, device_type).await?;

        let mut cache = self.port_cache.lock().await;
        for port in &ports {
            cache.insert(port.id, port.clone());
        }

        Ok(ports)
    }

    /// Resolve an inventory device by id
    pub async fn device(&self, id: i64) -> Result<RemoteDevice, RefError> {
        if id <= 0 {
            return Err(RefError::NotSet("no device assigned".to_string()));
        }
        match self.ports.device(id).await? {
            Some(device) => Ok(device),
            None => Err(RefError::NotFound(format!("device {id}"))),
        }
    }

    /// Batch-fetch members for a set of ASNs in one bridge call and prime
    /// the cache with them
    pub async fn preload_members(&self, asns: Vec<u32>) -> Result<Vec<Member>, RefError> {
        let members = self.members.members(MemberFilter::asns(asns)).await?;

        let mut cache = self.member_cache.lock().await;
        for member in &members {
            cache.insert(member.ref_id(), member.clone());
        }

        Ok(members)
    }

    /// Batch-fetch network records for a member set in one bridge call,
    /// priming the cache. Avoids per-member lookups on list views.
    pub async fn preload_networks(&self, members: &[Member]) -> Result<(), RefError> {
        let mut asns: Vec<u32> = members.iter().map(|m| m.asn).collect();
        asns.sort_unstable();
        asns.dedup();

        let networks = self.networks.networks(&asns).await?;

        let mut cache = self.network_cache.lock().await;
        for network in networks {
            cache.insert(network.asn, network);
        }

        Ok(())
    }

    fn source_directory(&self, _ref_id: RefId) -> Arc<dyn MemberDirectory> {
        // both sources sit behind the combined directory, which tags results
        Arc::clone(&self.members)
    }
}
