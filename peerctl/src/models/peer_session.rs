//! Peer sessions
//!
//! One row per BGP session between one of our ports and a peer port.
//! Status only moves forward through the lifecycle; writes are
//! compare-and-set so a stale workflow step cannot regress a session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::refs::{RefFallback, Resolver};

use super::peer_port::PeerPort;
use super::IpVersion;

/// Session lifecycle states, in rank order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Requested,
    Configured,
    Ok,
    Failed,
    Deleted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Requested => "requested",
            SessionStatus::Configured => "configured",
            SessionStatus::Ok => "ok",
            SessionStatus::Failed => "failed",
            SessionStatus::Deleted => "deleted",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Requested => 1,
            SessionStatus::Configured => 2,
            SessionStatus::Ok => 3,
            SessionStatus::Failed => 4,
            SessionStatus::Deleted => 5,
        }
    }

    /// Terminal states a session can be restarted from. A failed or
    /// deleted row behaves like an absent one: the lifecycle may begin
    /// over at any status.
    pub fn is_reset(&self) -> bool {
        matches!(self, SessionStatus::Failed | SessionStatus::Deleted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "requested" => Ok(SessionStatus::Requested),
            "configured" => Ok(SessionStatus::Configured),
            "ok" => Ok(SessionStatus::Ok),
            "failed" => Ok(SessionStatus::Failed),
            "deleted" => Ok(SessionStatus::Deleted),
            other => Err(Error::Validation(format!("unknown session status {other}"))),
        }
    }
}

/// Session relationship categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Peer,
    Transit,
    Customer,
    Core,
    Ixp,
    Pni,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Peer => "peer",
            SessionType::Transit => "transit",
            SessionType::Customer => "customer",
            SessionType::Core => "core",
            SessionType::Ixp => "ixp",
            SessionType::Pni => "pni",
        }
    }
}

impl FromStr for SessionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "peer" => Ok(SessionType::Peer),
            "transit" => Ok(SessionType::Transit),
            "customer" => Ok(SessionType::Customer),
            "core" => Ok(SessionType::Core),
            "ixp" => Ok(SessionType::Ixp),
            "pni" => Ok(SessionType::Pni),
            other => Err(Error::Validation(format!("unknown session type {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeerSession {
    pub id: i64,
    pub port: i64,
    pub peer_port_id: i64,
    pub device: Option<i64>,
    pub peer_session_type: String,
    pub policy4_id: Option<i64>,
    pub policy6_id: Option<i64>,
    pub meta4: Option<String>,
    pub meta6: Option<String>,
    pub status: String,
}

const COLUMNS: &str = "id, port, peer_port_id, device, peer_session_type, \
                       policy4_id, policy6_id, meta4, meta6, status";

impl PeerSession {
    /// Idempotent upsert keyed by (port, peer port). New rows start in the
    /// given status; live existing rows keep theirs; failed or deleted
    /// rows restart at the given status.
    pub async fn get_or_create(
        pool: &SqlitePool,
        resolver: &Resolver,
        port: i64,
        peer_port: &PeerPort,
        create_status: SessionStatus,
    ) -> Result<Self> {
        if let Some(mut existing) = Self::get(pool, port, peer_port.id).await? {
            if existing.session_status()?.is_reset() {
                existing.set_status(pool, create_status).await?;
            }
            return Ok(existing);
        }

        // device follows the inventory port when one is assigned
        let device = if port > 0 {
            resolver
                .port(port)
                .await
                .map(|p| Some(p.device_id))
                .or_fallback(None)
                .map_err(Error::from)?
        } else {
            None
        };

        let insert = sqlx::query(
            "INSERT INTO peerctl_peer_session (port, peer_port_id, device, status) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(port)
        .bind(peer_port.id)
        .bind(device)
        .bind(create_status.as_str())
        .execute(pool)
        .await;

        match insert {
            Ok(result) => Self::by_id(pool, result.last_insert_rowid()).await,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Self::get(pool, port, peer_port.id)
                    .await?
                    .ok_or_else(|| Error::NotFound("peer session".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(pool: &SqlitePool, port: i64, peer_port_id: i64) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, PeerSession>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_session WHERE port = ? AND peer_port_id = ?"
        ))
        .bind(port)
        .bind(peer_port_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, PeerSession>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_session WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// All sessions for a network, joined through the relationship chain
    pub async fn for_net(pool: &SqlitePool, net_id: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, PeerSession>(&format!(
            "SELECT s.{} FROM peerctl_peer_session s \
             JOIN peerctl_peer_port pp ON pp.id = s.peer_port_id \
             JOIN peerctl_peer_net pn ON pn.id = pp.peer_net_id \
             WHERE pn.net_id = ? ORDER BY s.id",
            COLUMNS.replace(", ", ", s.")
        ))
        .bind(net_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Sessions between a network and one peer ASN
    pub async fn for_peer(pool: &SqlitePool, net_id: i64, peer_asn: u32) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, PeerSession>(&format!(
            "SELECT s.{} FROM peerctl_peer_session s \
             JOIN peerctl_peer_port pp ON pp.id = s.peer_port_id \
             JOIN peerctl_peer_net pn ON pn.id = pp.peer_net_id \
             JOIN peerctl_net peer ON peer.id = pn.peer_id \
             WHERE pn.net_id = ? AND peer.asn = ? ORDER BY s.id",
            COLUMNS.replace(", ", ", s.")
        ))
        .bind(net_id)
        .bind(peer_asn)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub fn session_status(&self) -> Result<SessionStatus> {
        self.status.parse()
    }

    /// Compare-and-set status write. Only succeeds when the stored status
    /// still matches this struct and the new status ranks higher, or when
    /// the row sits in a reset state (failed, deleted) and may restart
    /// anywhere in the lifecycle. Returns whether the row moved.
    pub async fn set_status(&mut self, pool: &SqlitePool, status: SessionStatus) -> Result<bool> {
        let current = self.session_status()?;
        if !current.is_reset() && status.rank() <= current.rank() {
            return Ok(false);
        }
        if current == status {
            return Ok(false);
        }

        let updated = sqlx::query(
            "UPDATE peerctl_peer_session SET status = ?, updated = CURRENT_TIMESTAMP \
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(self.id)
        .bind(current.as_str())
        .execute(pool)
        .await?
        .rows_affected();

        if updated == 1 {
            self.status = status.as_str().to_string();
            Ok(true)
        } else {
            // lost the race; reload so callers see the winning state
            let fresh = Self::by_id(pool, self.id).await?;
            self.status = fresh.status;
            Ok(false)
        }
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
            "UPDATE peerctl_peer_session SET {column} = ?, updated = CURRENT_TIMESTAMP \
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

    /// Store exchange-member metadata for one address family, normalized
    /// so downstream consumers can rely on numeric fields
    pub async fn set_meta(
        &mut self,
        pool: &SqlitePool,
        version: IpVersion,
        meta: Value,
    ) -> Result<()> {
        let meta = normalize_meta(meta);
        let raw = serde_json::to_string(&meta)
            .map_err(|e| Error::Validation(format!("session meta: {e}")))?;

        let column = match version {
            IpVersion::V4 => "meta4",
            IpVersion::V6 => "meta6",
        };

        sqlx::query(&format!(
            "UPDATE peerctl_peer_session SET {column} = ?, updated = CURRENT_TIMESTAMP \
             WHERE id = ?"
        ))
        .bind(&raw)
        .bind(self.id)
        .execute(pool)
        .await?;

        match version {
            IpVersion::V4 => self.meta4 = Some(raw),
            IpVersion::V6 => self.meta6 = Some(raw),
        }

        Ok(())
    }

    pub fn meta(&self, version: IpVersion) -> Result<Option<Value>> {
        let raw = match version {
            IpVersion::V4 => self.meta4.as_deref(),
            IpVersion::V6 => self.meta6.as_deref(),
        };
        match raw {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| Error::Validation(format!("session meta: {e}"))),
            None => Ok(None),
        }
    }
}

/// Exchange feeds sometimes carry `last_updown` as a string or null;
/// coerce anything non-numeric to 0
fn normalize_meta(mut meta: Value) -> Value {
    if let Some(obj) = meta.as_object_mut() {
        if let Some(value) = obj.get_mut("last_updown") {
            if !value.is_u64() && !value.is_i64() {
                *value = Value::from(0);
            }
        }
    }
    meta
}
