//! Port objects
//!
//! `PortObject` is the working view of one attachment point: the local
//! `PortInfo` row, the inventory record when a physical port is assigned,
//! and the per-port policy override row, created lazily on first touch.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::bridge::types::{Member, RemotePort};
use crate::bridge::MemberFilter;
use crate::error::{Error, Result};
use crate::refs::{RefError, RefFallback, Resolver};

use super::network::Network;
use super::port_info::PortInfo;
use super::IpVersion;

/// Per-port policy pointers, keyed by the inventory port id
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PortPolicy {
    pub id: i64,
    pub port: i64,
    pub policy4_id: Option<i64>,
    pub policy6_id: Option<i64>,
}

impl PortPolicy {
    pub async fn get_or_create(pool: &SqlitePool, port: i64) -> Result<Self> {
        if let Some(existing) = Self::get(pool, port).await? {
            return Ok(existing);
        }

        let insert = sqlx::query("INSERT INTO peerctl_port_policy (port) VALUES (?)")
            .bind(port)
            .execute(pool)
            .await;

        match insert {
            Ok(_) => Self::get(pool, port)
                .await?
                .ok_or_else(|| Error::NotFound(format!("port policy for port {port}"))),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Self::get(pool, port)
                .await?
                .ok_or_else(|| Error::NotFound(format!("port policy for port {port}"))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(pool: &SqlitePool, port: i64) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, PortPolicy>(
            "SELECT id, port, policy4_id, policy6_id FROM peerctl_port_policy WHERE port = ?",
        )
        .bind(port)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn set_policy(
        &mut self,
        pool: &SqlitePool,
        policy_id: Option<i64>,
        version: IpVersion,
    ) -> Result<()> {
        let column = match version {
            IpVersion::V4 => "policy4_id",
            IpVersion::V6 => "policy6_id",
        };

        sqlx::query(&format!(
            "UPDATE peerctl_port_policy SET {column} = ?, updated = CURRENT_TIMESTAMP \
             WHERE id = ?"
        ))
        .bind(policy_id)
        .bind(self.id)
        .execute(pool)
        .await?;

        match version {
            IpVersion::V4 => self.policy4_id = policy_id,
            IpVersion::V6 => self.policy6_id = policy_id,
        }

        Ok(())
    }
}

/// Working view of one attachment point
#[derive(Debug, Clone)]
pub struct PortObject {
    pub info: PortInfo,
    pub remote: Option<RemotePort>,
    pub policy: Option<PortPolicy>,
}

impl PortObject {
    /// Assemble the view; the inventory record and policy row are only
    /// pulled in when a physical port is assigned
    pub async fn load(pool: &SqlitePool, resolver: &Resolver, info: PortInfo) -> Result<Self> {
        let (remote, policy) = if info.port > 0 {
            let remote = resolver.port(info.port).await.map(Some).or_fallback(None)?;
            let policy = PortPolicy::get_or_create(pool, info.port).await?;
            (remote, Some(policy))
        } else {
            (None, None)
        };

        Ok(PortObject {
            info,
            remote,
            policy,
        })
    }

    pub async fn by_port(pool: &SqlitePool, resolver: &Resolver, port: i64) -> Result<Option<Self>> {
        let info = sqlx::query_as::<_, PortInfo>(
            "SELECT id, net_id, ref_id, port, ip_address_4, ip_address_6, \
             is_route_server_peer, mac_address FROM peerctl_port_info WHERE port = ?",
        )
        .bind(port)
        .fetch_optional(pool)
        .await?;

        match info {
            Some(info) => Ok(Some(Self::load(pool, resolver, info).await?)),
            None => Ok(None),
        }
    }

    pub fn device_id(&self) -> Option<i64> {
        self.remote.as_ref().map(|r| r.device_id)
    }

    /// Networks we could peer with at this port's exchange: every member
    /// at the exchange except ourselves, with their registry records
    /// preloaded in one batched call
    pub async fn get_available_peers(
        &self,
        pool: &SqlitePool,
        resolver: &Resolver,
    ) -> Result<Vec<Member>> {
        let net = Network::by_id(pool, self.info.net_id).await?;

        let member = match resolver.member_by_key(self.info.ref_id.as_deref()).await {
            Ok(member) => member,
            Err(RefError::NotSet(_)) | Err(RefError::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut peers: Vec<Member> = resolver
            .member_directory()
            .members(MemberFilter::ix(member.ix_id))
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?
            .into_iter()
            .filter(|m| m.asn != net.asn && m.source == member.source)
            .collect();
        peers.sort_by_key(|m| (m.asn, m.id));

        resolver.preload_networks(&peers).await?;

        Ok(peers)
    }
}
