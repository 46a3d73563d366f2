//! Policy records
//!
//! A policy is a named bundle of import/export route-filter expressions with
//! optional localpref/med and a peer-group label, owned by exactly one
//! network.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::refs::Resolver;

use super::network::Network;
use super::peer_net::PeerNetwork;
use super::peer_port::PeerPort;
use super::peer_session::PeerSession;
use super::port::PortObject;
use super::IpVersion;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Policy {
    pub id: i64,
    pub net_id: i64,
    pub name: String,
    pub import_policy: String,
    pub export_policy: String,
    pub localpref: Option<i64>,
    pub med: Option<i64>,
    pub peer_group: Option<String>,
    pub status: String,
}

impl Policy {
    pub async fn create(pool: &SqlitePool, net_id: i64, name: &str) -> Result<Policy> {
        let id = sqlx::query(
            "INSERT INTO peerctl_policy (net_id, name, status) VALUES (?, ?, 'ok')",
        )
        .bind(net_id)
        .bind(name)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::by_id(pool, id).await
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Policy> {
        let policy = sqlx::query_as::<_, Policy>(
            "SELECT id, net_id, name, import_policy, export_policy, localpref, med,
                    peer_group, status
             FROM peerctl_policy WHERE id = ?",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(policy)
    }

    pub async fn by_net(pool: &SqlitePool, net_id: i64) -> Result<Vec<Policy>> {
        let policies = sqlx::query_as::<_, Policy>(
            "SELECT id, net_id, name, import_policy, export_policy, localpref, med,
                    peer_group, status
             FROM peerctl_policy WHERE net_id = ? ORDER BY id",
        )
        .bind(net_id)
        .fetch_all(pool)
        .await?;

        Ok(policies)
    }

    pub async fn update_filters(
        &self,
        pool: &SqlitePool,
        import_policy: &str,
        export_policy: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE peerctl_policy
             SET import_policy = ?, export_policy = ?, updated = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(import_policy)
        .bind(export_policy)
        .bind(self.id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Whether this policy is the owning network's global v4 policy.
    /// Derived from the network's pointer, never stored redundantly.
    pub async fn is_global4(&self, pool: &SqlitePool) -> Result<bool> {
        let net = Network::by_id(pool, self.net_id).await?;
        Ok(net.policy4_id == Some(self.id))
    }

    /// Whether this policy is the owning network's global v6 policy
    pub async fn is_global6(&self, pool: &SqlitePool) -> Result<bool> {
        let net = Network::by_id(pool, self.net_id).await?;
        Ok(net.policy6_id == Some(self.id))
    }
}

/// An entity that can carry address-family policy pointers and inherit
/// from parent entities when its own pointer is unset.
#[async_trait]
pub trait PolicyHolder: Send + Sync {
    /// Directly attached policy id for one address family
    fn policy_id(&self, version: IpVersion) -> Option<i64>;

    /// Label used in error messages
    fn policy_entity(&self) -> String;

    /// Entities consulted when no direct policy is set, nearest first
    async fn policy_parents(
        &self,
        pool: &SqlitePool,
        resolver: &Resolver,
    ) -> Result<Vec<Box<dyn PolicyHolder>>>;
}

/// Resolve the effective policy for an entity by depth-first walk of its
/// parent chain, first match wins. With `raise_error` an unresolvable
/// entity is an error instead of `None`.
pub async fn resolve(
    pool: &SqlitePool,
    resolver: &Resolver,
    entity: &dyn PolicyHolder,
    version: IpVersion,
    raise_error: bool,
) -> Result<Option<Policy>> {
    match resolve_inner(pool, resolver, entity, version).await? {
        Some(policy) => Ok(Some(policy)),
        None if raise_error => Err(Error::PolicyMissing(entity.policy_entity())),
        None => Ok(None),
    }
}

fn resolve_inner<'a>(
    pool: &'a SqlitePool,
    resolver: &'a Resolver,
    entity: &'a dyn PolicyHolder,
    version: IpVersion,
) -> Pin<Box<dyn Future<Output = Result<Option<Policy>>> + Send + 'a>> {
    Box::pin(async move {
        if let Some(id) = entity.policy_id(version) {
            return Ok(Some(Policy::by_id(pool, id).await?));
        }

        for parent in entity.policy_parents(pool, resolver).await? {
            if let Some(policy) = resolve_inner(pool, resolver, parent.as_ref(), version).await? {
                return Ok(Some(policy));
            }
        }

        Ok(None)
    })
}

#[async_trait]
impl PolicyHolder for Network {
    fn policy_id(&self, version: IpVersion) -> Option<i64> {
        match version {
            IpVersion::V4 => self.policy4_id,
            IpVersion::V6 => self.policy6_id,
        }
    }

    fn policy_entity(&self) -> String {
        format!("AS{}", self.asn)
    }

    // root of the hierarchy
    async fn policy_parents(
        &self,
        _pool: &SqlitePool,
        _resolver: &Resolver,
    ) -> Result<Vec<Box<dyn PolicyHolder>>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl PolicyHolder for PeerNetwork {
    fn policy_id(&self, version: IpVersion) -> Option<i64> {
        match version {
            IpVersion::V4 => self.policy4_id,
            IpVersion::V6 => self.policy6_id,
        }
    }

    fn policy_entity(&self) -> String {
        format!("peer network {}", self.id)
    }

    async fn policy_parents(
        &self,
        pool: &SqlitePool,
        _resolver: &Resolver,
    ) -> Result<Vec<Box<dyn PolicyHolder>>> {
        let net = Network::by_id(pool, self.net_id).await?;
        Ok(vec![Box::new(net)])
    }
}

#[async_trait]
impl PolicyHolder for PortObject {
    fn policy_id(&self, version: IpVersion) -> Option<i64> {
        self.policy.as_ref().and_then(|p| match version {
            IpVersion::V4 => p.policy4_id,
            IpVersion::V6 => p.policy6_id,
        })
    }

    fn policy_entity(&self) -> String {
        format!("port {}", self.info.port)
    }

    async fn policy_parents(
        &self,
        pool: &SqlitePool,
        _resolver: &Resolver,
    ) -> Result<Vec<Box<dyn PolicyHolder>>> {
        let net = Network::by_id(pool, self.info.net_id).await?;
        Ok(vec![Box::new(net)])
    }
}

#[async_trait]
impl PolicyHolder for PeerSession {
    fn policy_id(&self, version: IpVersion) -> Option<i64> {
        match version {
            IpVersion::V4 => self.policy4_id,
            IpVersion::V6 => self.policy6_id,
        }
    }

    fn policy_entity(&self) -> String {
        format!("peer session {}", self.id)
    }

    /// The peer-network relationship first, then our port when one is
    /// assigned. Floating sessions (port 0) have no port parent.
    async fn policy_parents(
        &self,
        pool: &SqlitePool,
        resolver: &Resolver,
    ) -> Result<Vec<Box<dyn PolicyHolder>>> {
        let peer_port = PeerPort::by_id(pool, self.peer_port_id).await?;
        let peer_net = peer_port.peer_net(pool).await?;

        let mut parents: Vec<Box<dyn PolicyHolder>> = vec![Box::new(peer_net)];
        if self.port > 0 {
            if let Some(port) = PortObject::by_port(pool, resolver, self.port).await? {
                parents.push(Box::new(port));
            }
        }

        Ok(parents)
    }
}
