//! Outbound email records
//!
//! Every message the notification workflow produces is logged here with
//! its recipients. Rows are append-only apart from the queue marker.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailLog {
    pub id: i64,
    pub net_id: i64,
    pub user: String,
    pub sender_address: String,
    pub subject: String,
    pub body: String,
    pub origin: String,
    pub status: String,
    pub created: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailLogRecipient {
    pub id: i64,
    pub email_log_id: i64,
    pub email: String,
    pub asn: Option<u32>,
}

const COLUMNS: &str = "id, net_id, user, sender_address, subject, body, origin, status, created";

impl EmailLog {
    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        pool: &SqlitePool,
        net_id: i64,
        user: &str,
        sender_address: &str,
        subject: &str,
        body: &str,
        origin: &str,
        recipients: &[(String, Option<u32>)],
    ) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO peerctl_email_log (net_id, user, sender_address, subject, body, origin) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(net_id)
        .bind(user)
        .bind(sender_address)
        .bind(subject)
        .bind(body)
        .bind(origin)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        for (email, asn) in recipients {
            sqlx::query(
                "INSERT INTO peerctl_email_log_recipient (email_log_id, email, asn) \
                 VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(email)
            .bind(asn)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Self::by_id(pool, id).await
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, EmailLog>(&format!(
            "SELECT {COLUMNS} FROM peerctl_email_log WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub async fn for_net(pool: &SqlitePool, net_id: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, EmailLog>(&format!(
            "SELECT {COLUMNS} FROM peerctl_email_log WHERE net_id = ? ORDER BY id DESC"
        ))
        .bind(net_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn recipients(&self, pool: &SqlitePool) -> Result<Vec<EmailLogRecipient>> {
        let rows = sqlx::query_as::<_, EmailLogRecipient>(
            "SELECT id, email_log_id, email, asn FROM peerctl_email_log_recipient \
             WHERE email_log_id = ? ORDER BY id",
        )
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Queue marker for deferred delivery
    pub async fn set_status(&mut self, pool: &SqlitePool, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE peerctl_email_log SET status = ?, updated = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(self.id)
        .execute(pool)
        .await?;

        self.status = status.to_string();
        Ok(())
    }
}
