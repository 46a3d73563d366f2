//! Exchange-member directory client

use std::time::Duration;

use async_trait::async_trait;
use peerctl_common::RefSource;
use serde::Deserialize;

use super::types::{ListResponse, Member};
use super::{BridgeError, MemberDirectory, MemberFilter};

/// Client for the exchange-member directory service
pub struct IxctlClient {
    http_client: reqwest::Client,
    base_url: String,
}

/// Wire form of an ixctl member record
#[derive(Debug, Deserialize)]
struct IxMember {
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
    #[serde(default)]
    pdb_ix_id: Option<i64>,
}

impl IxctlClient {
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
}

#[async_trait]
impl MemberDirectory for IxctlClient {
    async fn members(&self, filter: MemberFilter) -> Result<Vec<Member>, BridgeError> {
        let url = format!("{}/api/member", self.base_url);
        tracing::debug!(url = %url, "ixctl request");

        let response = self
            .http_client
            .get(&url)
            .query(&filter.to_query())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api(status.as_u16(), text));
        }

        let list: ListResponse<IxMember> = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .map(|row| Member {
                id: row.id,
                asn: row.asn,
                ix_id: row.ix_id,
                source: RefSource::Ixctl,
                name: row.name,
                ipaddr4: row.ipaddr4,
                ipaddr6: row.ipaddr6,
                is_rs_peer: row.is_rs_peer,
                speed: row.speed,
                pdb_ix_id: row.pdb_ix_id,
            })
            .collect())
    }
}
