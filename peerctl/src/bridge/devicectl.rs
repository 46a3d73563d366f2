//! Device inventory client

use std::time::Duration;

use async_trait::async_trait;

use super::types::{DummyPortRequest, ListResponse, RemoteDevice, RemotePort};
use super::{BridgeError, PortDirectory};

/// Client for the device inventory service
///
/// Ports and devices live here; peerctl only stores their opaque ids.
pub struct DevicectlClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl DevicectlClient {
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

    async fn get_first<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<T>, BridgeError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "devicectl request");

        let response = self.http_client.get(&url).query(query).send().await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api(status.as_u16(), text));
        }

        let mut list: ListResponse<T> = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;

        Ok(if list.data.is_empty() {
            None
        } else {
            Some(list.data.remove(0))
        })
    }
}

#[async_trait]
impl PortDirectory for DevicectlClient {
    async fn port(&self, id: i64) -> Result<Option<RemotePort>, BridgeError> {
        let query = vec![("id".to_string(), id.to_string())];
        self.get_first("/api/port", &query).await
    }

    async fn device(&self, id: i64) -> Result<Option<RemoteDevice>, BridgeError> {
        let query = vec![("id".to_string(), id.to_string())];
        self.get_first("/api/device", &query).await
    }

    async fn request_dummy_ports(
        &self,
        asn: u32,
        specs: &[DummyPortRequest],
        device_type: &str,
    ) -> Result<Vec<RemotePort>, BridgeError> {
        let url = format!("{}/api/dummy-ports", self.base_url);
        tracing::debug!(url = %url, asn, "devicectl dummy-port request");

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({
                "asn": asn,
                "device_type": device_type,
                "ports": specs,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api(status.as_u16(), text));
        }

        let list: ListResponse<RemotePort> = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;

        Ok(list.data)
    }
}
