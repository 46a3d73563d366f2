//! peeringdb mirror client

use std::time::Duration;

use async_trait::async_trait;
use peerctl_common::RefSource;
use serde::Deserialize;

use super::types::{ListResponse, Member, NetworkContact, RemoteNetwork};
use super::{BridgeError, MemberDirectory, MemberFilter, NetworkDirectory};

/// Client for the peeringdb mirror service
///
/// Serves network records, network contacts, and netixlan membership
/// records (exposed here as `Member` with source `pdbctl`).
pub struct PdbctlClient {
    http_client: reqwest::Client,
    base_url: String,
}

/// Wire form of a pdbctl netixlan record
#[derive(Debug, Deserialize)]
struct Netixlan {
    id: i64,
    asn: u32,
    ix_id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ipaddr4: Option<String>,
    #[serde(default)]
    ipaddr6: Option<String>,
    #[serde(default)]
    is_rs_peer: bool,
    #[serde(default)]
    speed: i64,
}

impl PdbctlClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, BridgeError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BridgeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>, BridgeError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "pdbctl request");

        let response = self.http_client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api(status.as_u16(), text));
        }

        let list: ListResponse<T> = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;

        Ok(list.data)
    }
}

#[async_trait]
impl MemberDirectory for PdbctlClient {
    async fn members(&self, filter: MemberFilter) -> Result<Vec<Member>, BridgeError> {
        let rows: Vec<Netixlan> = self.get_list("/api/netixlan", &filter.to_query()).await?;

        Ok(rows
            .into_iter()
            .map(|row| Member {
                id: row.id,
                asn: row.asn,
                ix_id: row.ix_id,
                source: RefSource::Pdbctl,
                name: row.name,
                ipaddr4: row.ipaddr4,
                ipaddr6: row.ipaddr6,
                is_rs_peer: row.is_rs_peer,
                speed: row.speed,
                pdb_ix_id: None,
            })
            .collect())
    }
}

#[async_trait]
impl NetworkDirectory for PdbctlClient {
    async fn network(&self, asn: u32) -> Result<Option<RemoteNetwork>, BridgeError> {
        let query = vec![("asn".to_string(), asn.to_string())];
        let mut rows: Vec<RemoteNetwork> = self.get_list("/api/net", &query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn networks(&self, asns: &[u32]) -> Result<Vec<RemoteNetwork>, BridgeError> {
        if asns.is_empty() {
            return Ok(Vec::new());
        }
        let joined = asns
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let query = vec![("asns".to_string(), joined)];
        self.get_list("/api/net", &query).await
    }

    async fn contact(
        &self,
        asn: u32,
        role: &str,
        require_email: bool,
    ) -> Result<Option<NetworkContact>, BridgeError> {
        let mut query = vec![
            ("asn".to_string(), asn.to_string()),
            ("role".to_string(), role.to_string()),
        ];
        if require_email {
            query.push(("require_email".to_string(), "1".to_string()));
        }
        let mut rows: Vec<NetworkContact> = self.get_list("/api/poc", &query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }
}
