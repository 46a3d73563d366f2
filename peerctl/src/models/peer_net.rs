//! Peer-network relationships
//!
//! Directed "net considers peer a peering partner" rows, unique per
//! (net, peer), carrying the shared MD5 secret and optional prefix-count
//! overrides.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::refs::{RefFallback, Resolver};

use super::network::Network;
use super::IpVersion;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeerNetwork {
    pub id: i64,
    pub net_id: i64,
    pub peer_id: i64,
    pub md5: Option<String>,
    pub info_prefixes4: Option<u32>,
    pub info_prefixes6: Option<u32>,
    pub policy4_id: Option<i64>,
    pub policy6_id: Option<i64>,
    pub status: String,
}

const COLUMNS: &str =
    "id, net_id, peer_id, md5, info_prefixes4, info_prefixes6, policy4_id, policy6_id, status";

impl PeerNetwork {
    /// Idempotent upsert keyed by (net, peer)
    pub async fn get_or_create(pool: &SqlitePool, net: &Network, peer: &Network) -> Result<Self> {
        if let Some(existing) = Self::get(pool, net.id, peer.id).await? {
            return Ok(existing);
        }

        let insert =
            sqlx::query("INSERT INTO peerctl_peer_net (net_id, peer_id, status) VALUES (?, ?, 'ok')")
                .bind(net.id)
                .bind(peer.id)
                .execute(pool)
                .await;

        match insert {
            Ok(result) => Self::by_id(pool, result.last_insert_rowid()).await,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Self::get(pool, net.id, peer.id)
                    .await?
                    .ok_or_else(|| Error::NotFound("peer network".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(pool: &SqlitePool, net_id: i64, peer_id: i64) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, PeerNetwork>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_net WHERE net_id = ? AND peer_id = ?"
        ))
        .bind(net_id)
        .bind(peer_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, PeerNetwork>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_net WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Advertised prefix count for the peer; the local override wins, else
    /// the peer's registry record, else 0
    pub async fn info_prefixes(
        &self,
        pool: &SqlitePool,
        resolver: &Resolver,
        version: IpVersion,
    ) -> Result<u32> {
        let local = match version {
            IpVersion::V4 => self.info_prefixes4,
            IpVersion::V6 => self.info_prefixes6,
        };
        if let Some(value) = local {
            return Ok(value);
        }

        let peer = Network::by_id(pool, self.peer_id).await?;
        let count = resolver
            .network(peer.asn)
            .await
            .map(|net| match version {
                IpVersion::V4 => net.info_prefixes4,
                IpVersion::V6 => net.info_prefixes6,
            })
            .or_fallback_default()?;

        Ok(count)
    }

    pub async fn set_info_prefixes(
        &mut self,
        pool: &SqlitePool,
        value: u32,
        version: IpVersion,
    ) -> Result<()> {
        let column = match version {
            IpVersion::V4 => "info_prefixes4",
            IpVersion::V6 => "info_prefixes6",
        };

        sqlx::query(&format!(
            "UPDATE peerctl_peer_net SET {column} = ?, updated = CURRENT_TIMESTAMP WHERE id = ?"
        ))
        .bind(value)
        .bind(self.id)
        .execute(pool)
        .await?;

        match version {
            IpVersion::V4 => self.info_prefixes4 = Some(value),
            IpVersion::V6 => self.info_prefixes6 = Some(value),
        }

        Ok(())
    }

    pub async fn set_md5(&mut self, pool: &SqlitePool, md5: &str) -> Result<()> {
        sqlx::query(
            "UPDATE peerctl_peer_net SET md5 = ?, updated = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(md5)
        .bind(self.id)
        .execute(pool)
        .await?;

        self.md5 = Some(md5.to_string());
        Ok(())
    }
}
