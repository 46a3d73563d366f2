//! Append-only audit log

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::Result;

/// Events worth keeping a durable trail for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    PeerSessionRequest,
    PeerSessionAdd,
    PeerSessionDel,
    PeerSessionMod,
    PolicyMod,
    Email,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::PeerSessionRequest => "peer_session-request",
            AuditEvent::PeerSessionAdd => "peer_session-add",
            AuditEvent::PeerSessionDel => "peer_session-del",
            AuditEvent::PeerSessionMod => "peer_session-mod",
            AuditEvent::PolicyMod => "policy-mod",
            AuditEvent::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub net_id: i64,
    pub event: String,
    pub user: String,
    pub data: Option<String>,
    pub created: NaiveDateTime,
}

impl AuditLog {
    pub async fn append(
        pool: &SqlitePool,
        net_id: i64,
        event: AuditEvent,
        user: &str,
        data: &Value,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO peerctl_auditlog (net_id, event, user, data) VALUES (?, ?, ?, ?)",
        )
        .bind(net_id)
        .bind(event.as_str())
        .bind(user)
        .bind(data.to_string())
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn for_net(pool: &SqlitePool, net_id: i64, limit: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, AuditLog>(
            "SELECT id, net_id, event, user, data, created FROM peerctl_auditlog \
             WHERE net_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(net_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
