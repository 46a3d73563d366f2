//! Peering request bookkeeping
//!
//! One `PeerRequest` per workflow invocation toward a peer ASN, with one
//! `PeerRequestLocation` per exchange the request fans out to. These rows
//! are the durable record of who we asked, where, and how it went.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeerRequest {
    pub id: i64,
    pub net_id: i64,
    pub peer_asn: u32,
    #[sqlx(rename = "type")]
    pub request_type: String,
    pub notes: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PeerRequestLocation {
    pub id: i64,
    pub peer_request_id: i64,
    pub pdb_ix_id: Option<i64>,
    pub ixctl_ix_id: Option<i64>,
    pub notes: Option<String>,
    pub status: String,
}

const COLUMNS: &str = "id, net_id, peer_asn, type, notes, status";
const LOCATION_COLUMNS: &str = "id, peer_request_id, pdb_ix_id, ixctl_ix_id, notes, status";

impl PeerRequest {
    pub async fn create(
        pool: &SqlitePool,
        net_id: i64,
        peer_asn: u32,
        request_type: &str,
    ) -> Result<Self> {
        let result = sqlx::query(
            "INSERT INTO peerctl_peer_request (net_id, peer_asn, type) VALUES (?, ?, ?)",
        )
        .bind(net_id)
        .bind(peer_asn)
        .bind(request_type)
        .execute(pool)
        .await?;

        Self::by_id(pool, result.last_insert_rowid()).await
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, PeerRequest>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_request WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Most recent still-pending request toward a peer ASN
    pub async fn latest_open(
        pool: &SqlitePool,
        net_id: i64,
        peer_asn: u32,
    ) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, PeerRequest>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_request \
             WHERE net_id = ? AND peer_asn = ? AND status = 'pending' \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(net_id)
        .bind(peer_asn)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn for_net(pool: &SqlitePool, net_id: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, PeerRequest>(&format!(
            "SELECT {COLUMNS} FROM peerctl_peer_request WHERE net_id = ? ORDER BY id DESC"
        ))
        .bind(net_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Record one exchange the request covers
    pub async fn add_location(
        &self,
        pool: &SqlitePool,
        pdb_ix_id: Option<i64>,
        ixctl_ix_id: Option<i64>,
    ) -> Result<PeerRequestLocation> {
        let result = sqlx::query(
            "INSERT INTO peerctl_peer_request_location (peer_request_id, pdb_ix_id, ixctl_ix_id) \
             VALUES (?, ?, ?)",
        )
        .bind(self.id)
        .bind(pdb_ix_id)
        .bind(ixctl_ix_id)
        .execute(pool)
        .await?;

        let row = sqlx::query_as::<_, PeerRequestLocation>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM peerctl_peer_request_location WHERE id = ?"
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub async fn locations(&self, pool: &SqlitePool) -> Result<Vec<PeerRequestLocation>> {
        let rows = sqlx::query_as::<_, PeerRequestLocation>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM peerctl_peer_request_location \
             WHERE peer_request_id = ? ORDER BY id"
        ))
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn set_status(&mut self, pool: &SqlitePool, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE peerctl_peer_request SET status = ?, updated = CURRENT_TIMESTAMP \
             WHERE id = ?",
        )
        .bind(status)
        .bind(self.id)
        .execute(pool)
        .await?;

        self.status = status.to_string();
        Ok(())
    }

    /// Mark the request and all of its still-pending locations failed,
    /// keeping the failure note for the operator
    pub async fn mark_failed(&mut self, pool: &SqlitePool, note: &str) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE peerctl_peer_request \
             SET status = 'failed', notes = ?, updated = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(note)
        .bind(self.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE peerctl_peer_request_location \
             SET status = 'failed', updated = CURRENT_TIMESTAMP \
             WHERE peer_request_id = ? AND status = 'pending'",
        )
        .bind(self.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.status = "failed".to_string();
        self.notes = Some(note.to_string());
        Ok(())
    }

    pub async fn complete(&mut self, pool: &SqlitePool) -> Result<()> {
        self.set_status(pool, "completed").await
    }
}

impl PeerRequestLocation {
    pub async fn set_status(&mut self, pool: &SqlitePool, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE peerctl_peer_request_location \
             SET status = ?, updated = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(self.id)
        .execute(pool)
        .await?;

        self.status = status.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::network::Network;
    use peerctl_common::db;

    #[tokio::test]
    async fn mark_failed_cascades_to_pending_locations() {
        let pool = db::init_memory_pool().await.unwrap();
        let net = Network::get_or_create(&pool, 63311).await.unwrap();

        let mut request = PeerRequest::create(&pool, net.id, 20, "email").await.unwrap();
        let mut done = request.add_location(&pool, Some(239), None).await.unwrap();
        request.add_location(&pool, Some(240), None).await.unwrap();
        done.set_status(&pool, "completed").await.unwrap();

        request.mark_failed(&pool, "api unreachable").await.unwrap();

        let locations = request.locations(&pool).await.unwrap();
        assert_eq!(locations[0].status, "completed");
        assert_eq!(locations[1].status, "failed");
        assert_eq!(request.notes.as_deref(), Some("api unreachable"));
    }
}
