//! Peer ports
//!
//! A `PeerPort` joins our attachment record to the peer-network
//! relationship, one row per (our port, peer) pair at a shared exchange.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::bridge::types::Member;
use crate::error::{Error, Result};

use super::network::Network;
use super::peer_net::PeerNetwork;
use super::port_info::PortInfo;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeerPort {
    pub id: i64,
    pub peer_net_id: i64,
    pub port_info_id: i64,
    pub interface_name: Option<String>,
}

const COLUMNS: &str = "id, peer_net_id, port_info_id, interface_name";

impl PeerPort {
    pub async fn get_or_create(
        pool: &SqlitePool,
        port_info: &PortInfo,
        peer_net: &PeerNetwork,
    ) -> Result<Self> {
        if let Some(existing) = Self::get(pool, port_info.id, peer_net.id).await? {
            return Ok(existing);
        }

        let insert = sqlx::query(
            "INSERT INTO peerctl_peer_port (peer_net_id, port_info_id) VALUES (?, ?)",
        )
        .bind(peer_net.id)
        .bind(port_info.id)
        .execute(pool)
        .await;

        match insert {
            Ok(result) => Self::by_id(pool, result.last_insert_rowid()).await,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Self::get(pool, port_info.id, peer_net.id)
                    .await?
                    .ok_or_else(|| Error::NotFound("peer port".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Build the full chain for a pair of exchange member records: ensures
    /// the peer network, the relationship row, and the attachment records
    /// on both sides all exist. The returned peer port is bound to the
    /// peer's attachment; ours is returned alongside so the session can be
    /// keyed on our end of the wire.
    pub async fn from_members(
        pool: &SqlitePool,
        net: &Network,
        ours: &Member,
        theirs: &Member,
    ) -> Result<(PortInfo, Self)> {
        let peer = Network::get_or_create(pool, theirs.asn).await?;
        let peer_net = PeerNetwork::get_or_create(pool, net, &peer).await?;
        let our_info = PortInfo::require_for_member(pool, net.id, ours).await?;
        let peer_info = PortInfo::require_for_member(pool, peer.id, theirs).await?;

        let peer_port = Self::get_or_create(pool, &peer_info, &peer_net).await?;
        Ok((our_info, peer_port))
    }

    pub async fn get(
        pool: &SqlitePool,
        port_info_id: i64,
        peer_net_id: i64,
    ) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, PeerPort>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_port WHERE port_info_id = ? AND peer_net_id = ?"
        ))
        .bind(port_info_id)
        .bind(peer_net_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, PeerPort>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_port WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub async fn port_info(&self, pool: &SqlitePool) -> Result<PortInfo> {
        PortInfo::by_id(pool, self.port_info_id).await
    }

    pub async fn peer_net(&self, pool: &SqlitePool) -> Result<PeerNetwork> {
        PeerNetwork::by_id(pool, self.peer_net_id).await
    }
}
