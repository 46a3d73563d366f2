//! Local mirror of exchange records owned by the registry services

use serde::Serialize;
use sqlx::SqlitePool;

use peerctl_common::RefId;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InternetExchange {
    pub id: i64,
    pub name: String,
    pub name_long: String,
    pub country: String,
    pub ref_id: Option<String>,
}

const COLUMNS: &str = "id, name, name_long, country, ref_id";

impl InternetExchange {
    /// Lazily mirror an exchange record, keyed by its composite ref id
    pub async fn get_or_create(pool: &SqlitePool, ref_id: &RefId, name: &str) -> Result<Self> {
        let key = ref_id.to_string();
        if let Some(existing) = Self::by_ref_id(pool, &key).await? {
            return Ok(existing);
        }

        let insert = sqlx::query("INSERT INTO peerctl_ix (name, ref_id) VALUES (?, ?)")
            .bind(name)
            .bind(&key)
            .execute(pool)
            .await;

        match insert {
            Ok(result) => Self::by_id(pool, result.last_insert_rowid()).await,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Self::by_ref_id(pool, &key)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("exchange {key}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Self> {
        let row = sqlx::query_as::<_, InternetExchange>(&format!(
            "SELECT {COLUMNS} FROM peerctl_ix WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub async fn by_ref_id(pool: &SqlitePool, ref_id: &str) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, InternetExchange>(&format!(
            "SELECT {COLUMNS} FROM peerctl_ix WHERE ref_id = ?"
        ))
        .bind(ref_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }
}
