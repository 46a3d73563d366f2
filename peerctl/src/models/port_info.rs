//! Port attachment records
//!
//! A `PortInfo` row ties a network to a physical attachment point. The
//! `port` column holds the inventory service's port id; 0 marks a floating
//! record whose addressing lives in the manual `ip_address_*` columns or
//! in the exchange member record named by `ref_id`.

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use peerctl_common::RefId;

use crate::bridge::types::Member;
use crate::error::{Error, Result};
use crate::refs::{RefError, RefFallback, Resolver};

use super::ix::InternetExchange;
use super::IpVersion;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PortInfo {
    pub id: i64,
    pub net_id: i64,
    pub ref_id: Option<String>,
    pub port: i64,
    pub ip_address_4: Option<String>,
    pub ip_address_6: Option<String>,
    pub is_route_server_peer: Option<bool>,
    pub mac_address: Option<String>,
}

const COLUMNS: &str =
    "id, net_id, ref_id, port, ip_address_4, ip_address_6, is_route_server_peer, mac_address";

impl PortInfo {
    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, PortInfo>(&format!(
            "SELECT {COLUMNS} FROM peerctl_port_info WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub async fn for_net(pool: &SqlitePool, net_id: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, PortInfo>(&format!(
            "SELECT {COLUMNS} FROM peerctl_port_info WHERE net_id = ? ORDER BY id"
        ))
        .bind(net_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn by_ref_id(pool: &SqlitePool, net_id: i64, ref_id: &str) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, PortInfo>(&format!(
            "SELECT {COLUMNS} FROM peerctl_port_info WHERE net_id = ? AND ref_id = ?"
        ))
        .bind(net_id)
        .bind(ref_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Find or create the attachment record for an exchange member.
    ///
    /// Lookup order: existing row with the member's ref id, then an
    /// orphaned row that matches one of the member's addresses (which is
    /// re-pointed at the member), then a fresh floating row.
    pub async fn require_for_member(
        pool: &SqlitePool,
        net_id: i64,
        member: &Member,
    ) -> Result<Self> {
        let key = member.ref_id().to_string();

        if let Some(existing) = Self::by_ref_id(pool, net_id, &key).await? {
            return Ok(existing);
        }

        if let Some(ip4) = member.ipaddr4.as_deref() {
            let orphan = sqlx::query_as::<_, PortInfo>(&format!(
                "SELECT {COLUMNS} FROM peerctl_port_info \
                 WHERE net_id = ? AND ip_address_4 = ? AND (ref_id IS NULL OR ref_id != ?)"
            ))
            .bind(net_id)
            .bind(ip4)
            .bind(&key)
            .fetch_optional(pool)
            .await?;

            if let Some(mut row) = orphan {
                sqlx::query(
                    "UPDATE peerctl_port_info SET ref_id = ?, updated = CURRENT_TIMESTAMP \
                     WHERE id = ?",
                )
                .bind(&key)
                .bind(row.id)
                .execute(pool)
                .await?;
                row.ref_id = Some(key);
                return Ok(row);
            }
        }

        let result = sqlx::query("INSERT INTO peerctl_port_info (net_id, ref_id) VALUES (?, ?)")
            .bind(net_id)
            .bind(&key)
            .execute(pool)
            .await?;

        Self::by_id(pool, result.last_insert_rowid()).await
    }

    async fn ref_member(&self, resolver: &Resolver) -> std::result::Result<Member, RefError> {
        resolver.member_by_key(self.ref_id.as_deref()).await
    }

    /// Session address for one address family.
    ///
    /// An assigned inventory port is authoritative; floating records use
    /// the manual column, then the exchange member record.
    pub async fn ipaddr(&self, resolver: &Resolver, version: IpVersion) -> Result<Option<String>> {
        if self.port > 0 {
            let addr = resolver
                .port(self.port)
                .await
                .map(|p| match version {
                    IpVersion::V4 => p.ip_address_4,
                    IpVersion::V6 => p.ip_address_6,
                })
                .or_fallback(None)?;
            if addr.is_some() {
                return Ok(addr);
            }
        }

        let manual = match version {
            IpVersion::V4 => self.ip_address_4.clone(),
            IpVersion::V6 => self.ip_address_6.clone(),
        };
        if manual.is_some() {
            return Ok(manual);
        }

        let addr = self
            .ref_member(resolver)
            .await
            .map(|m| match version {
                IpVersion::V4 => m.ipaddr4,
                IpVersion::V6 => m.ipaddr6,
            })
            .or_fallback(None)?;

        Ok(addr)
    }

    /// Route-server flag; an explicit local value wins over the member record
    pub async fn is_rs_peer(&self, resolver: &Resolver) -> Result<bool> {
        if let Some(explicit) = self.is_route_server_peer {
            return Ok(explicit);
        }

        let flag = self
            .ref_member(resolver)
            .await
            .map(|m| m.is_rs_peer)
            .or_fallback_default()?;

        Ok(flag)
    }

    pub async fn speed(&self, resolver: &Resolver) -> Result<i64> {
        if self.port > 0 {
            let speed = resolver
                .port(self.port)
                .await
                .map(|p| p.speed)
                .or_fallback_default()?;
            if speed > 0 {
                return Ok(speed);
            }
        }

        let speed = self
            .ref_member(resolver)
            .await
            .map(|m| m.speed)
            .or_fallback_default()?;

        Ok(speed)
    }

    pub async fn mac_address(&self, resolver: &Resolver) -> Result<Option<String>> {
        if self.mac_address.is_some() {
            return Ok(self.mac_address.clone());
        }
        if self.port > 0 {
            let mac = resolver
                .port(self.port)
                .await
                .map(|p| p.mac_address)
                .or_fallback(None)?;
            return Ok(mac);
        }
        Ok(None)
    }

    /// Composite id of the exchange this record sits at, when known
    pub async fn ref_ix_id(&self, resolver: &Resolver) -> Result<Option<RefId>> {
        let ix = self
            .ref_member(resolver)
            .await
            .map(|m| Some(m.ref_ix_id()))
            .or_fallback(None)?;

        Ok(ix)
    }

    /// Local exchange mirror row, created on first touch
    pub async fn ix(
        &self,
        pool: &SqlitePool,
        resolver: &Resolver,
    ) -> Result<Option<InternetExchange>> {
        let member = match self.ref_member(resolver).await {
            Ok(member) => member,
            Err(RefError::NotSet(_)) | Err(RefError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let ix = InternetExchange::get_or_create(pool, &member.ref_ix_id(), &member.name).await?;
        Ok(Some(ix))
    }

    pub async fn assign_port(&mut self, pool: &SqlitePool, port: i64) -> Result<()> {
        sqlx::query(
            "UPDATE peerctl_port_info SET port = ?, updated = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(port)
        .bind(self.id)
        .execute(pool)
        .await?;

        self.port = port;
        Ok(())
    }

    /// Move every attachment record and session from one inventory port to
    /// another, in a single transaction. An already assigned target port
    /// fails up front unless `reassign` is set, in which case the existing
    /// assignment is released first.
    pub async fn migrate_ports(
        pool: &SqlitePool,
        net_id: i64,
        from_port: i64,
        to_port: i64,
        reassign: bool,
    ) -> Result<u64> {
        if from_port <= 0 || to_port <= 0 {
            return Err(Error::Validation(
                "port migration requires assigned ports on both sides".to_string(),
            ));
        }

        let mut tx: Transaction<'_, Sqlite> = pool.begin().await?;

        let taken: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM peerctl_port_info WHERE port = ?")
                .bind(to_port)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((taken_id,)) = taken {
            if !reassign {
                return Err(Error::Validation(format!(
                    "port {to_port} is already assigned"
                )));
            }
            sqlx::query(
                "UPDATE peerctl_port_info SET port = 0, updated = CURRENT_TIMESTAMP \
                 WHERE id = ?",
            )
            .bind(taken_id)
            .execute(&mut *tx)
            .await?;
        }

        let moved = sqlx::query(
            "UPDATE peerctl_port_info SET port = ?, updated = CURRENT_TIMESTAMP \
             WHERE net_id = ? AND port = ?",
        )
        .bind(to_port)
        .bind(net_id)
        .bind(from_port)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if moved == 0 {
            return Err(Error::NotFound(format!("port {from_port}")));
        }

        sqlx::query(
            "UPDATE peerctl_peer_session SET port = ?, updated = CURRENT_TIMESTAMP \
             WHERE port = ?",
        )
        .bind(to_port)
        .bind(from_port)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::network::Network;
    use peerctl_common::db;
    use peerctl_common::RefSource;

    fn member(id: i64, ip4: &str) -> Member {
        Member {
            id,
            asn: 63311,
            ix_id: 10,
            source: RefSource::Ixctl,
            name: "Test IX".to_string(),
            ipaddr4: Some(ip4.to_string()),
            ipaddr6: None,
            is_rs_peer: false,
            speed: 1000,
            pdb_ix_id: Some(239),
        }
    }

    #[tokio::test]
    async fn require_for_member_is_idempotent() {
        let pool = db::init_memory_pool().await.unwrap();
        let net = Network::get_or_create(&pool, 63311).await.unwrap();

        let m = member(5, "206.41.110.18");
        let a = PortInfo::require_for_member(&pool, net.id, &m).await.unwrap();
        let b = PortInfo::require_for_member(&pool, net.id, &m).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(a.ref_id.as_deref(), Some("ixctl:5"));
    }

    #[tokio::test]
    async fn require_for_member_repoints_matching_address() {
        let pool = db::init_memory_pool().await.unwrap();
        let net = Network::get_or_create(&pool, 63311).await.unwrap();

        sqlx::query(
            "INSERT INTO peerctl_port_info (net_id, ip_address_4) VALUES (?, '206.41.110.18')",
        )
        .bind(net.id)
        .execute(&pool)
        .await
        .unwrap();

        let m = member(7, "206.41.110.18");
        let row = PortInfo::require_for_member(&pool, net.id, &m).await.unwrap();

        assert_eq!(row.ref_id.as_deref(), Some("ixctl:7"));
        let all = PortInfo::for_net(&pool, net.id).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn migrate_ports_rejects_assigned_target() {
        let pool = db::init_memory_pool().await.unwrap();
        let net = Network::get_or_create(&pool, 63311).await.unwrap();

        sqlx::query("INSERT INTO peerctl_port_info (net_id, port) VALUES (?, 100)")
            .bind(net.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO peerctl_port_info (net_id, port) VALUES (?, 200)")
            .bind(net.id)
            .execute(&pool)
            .await
            .unwrap();

        let err = PortInfo::migrate_ports(&pool, net.id, 100, 200, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // nothing moved
        let rows = PortInfo::for_net(&pool, net.id).await.unwrap();
        assert!(rows.iter().any(|r| r.port == 100));
    }

    #[tokio::test]
    async fn migrate_ports_reassign_releases_the_target() {
        let pool = db::init_memory_pool().await.unwrap();
        let net = Network::get_or_create(&pool, 63311).await.unwrap();

        sqlx::query("INSERT INTO peerctl_port_info (net_id, port) VALUES (?, 100)")
            .bind(net.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO peerctl_port_info (net_id, port) VALUES (?, 200)")
            .bind(net.id)
            .execute(&pool)
            .await
            .unwrap();

        let moved = PortInfo::migrate_ports(&pool, net.id, 100, 200, true)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let rows = PortInfo::for_net(&pool, net.id).await.unwrap();
        assert!(rows.iter().any(|r| r.port == 200));
        assert!(rows.iter().any(|r| r.port == 0));
    }

    #[tokio::test]
    async fn migrate_ports_moves_rows() {
        let pool = db::init_memory_pool().await.unwrap();
        let net = Network::get_or_create(&pool, 63311).await.unwrap();

        sqlx::query("INSERT INTO peerctl_port_info (net_id, port) VALUES (?, 100)")
            .bind(net.id)
            .execute(&pool)
            .await
            .unwrap();

        let moved = PortInfo::migrate_ports(&pool, net.id, 100, 300, false)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let rows = PortInfo::for_net(&pool, net.id).await.unwrap();
        assert!(rows.iter().any(|r| r.port == 300));
    }
}
