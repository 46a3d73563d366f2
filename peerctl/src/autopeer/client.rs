//! HTTP client for a peer network's autopeer endpoint

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::schema::{AddSessionsResponse, PayloadValidator, SessionProposal, SessionStatusReport};

pub struct AutopeerClient {
    client: reqwest::Client,
    base_url: String,
    validator: PayloadValidator,
}

impl AutopeerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Bridge(e.to_string()))?;

        Ok(AutopeerClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            validator: PayloadValidator::new()?,
        })
    }

    /// Exchanges the peer has registered for machine peering, as
    /// `pdb:ix:{id}` identifiers. Entries in any other form are dropped.
    pub async fn list_locations(&self, asn: u32) -> Result<Vec<String>> {
        let url = format!("{}/list_locations", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("asn", asn.to_string())])
            .send()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Bridge(format!(
                "list_locations returned {}",
                response.status()
            )));
        }

        let raw: Vec<String> = response
            .json()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;

        let locations: Vec<String> = raw
            .into_iter()
            .filter(|loc| {
                let keep = loc
                    .strip_prefix("pdb:ix:")
                    .map(|id| id.parse::<i64>().is_ok())
                    .unwrap_or(false);
                if !keep {
                    debug!(location = %loc, "skipping unrecognized autopeer location");
                }
                keep
            })
            .collect();

        Ok(locations)
    }

    /// Propose sessions in bulk. The payload is validated against the
    /// embedded schema first; an invalid payload is never sent.
    pub async fn add_sessions(&self, sessions: &[SessionProposal]) -> Result<String> {
        let payload: Value = serde_json::to_value(sessions)
            .map_err(|e| Error::SchemaValidation(e.to_string()))?;
        self.validator.validate(&payload)?;

        let url = format!("{}/add_sessions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Bridge(format!(
                "add_sessions returned {}",
                response.status()
            )));
        }

        let body: AddSessionsResponse = response
            .json()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;

        Ok(body.request_id)
    }

    pub async fn get_status(&self, request_id: &str, asn: u32) -> Result<SessionStatusReport> {
        let url = format!("{}/get_status", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("request_id", request_id.to_string()),
                ("asn", asn.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Bridge(format!(
                "get_status returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Bridge(e.to_string()))
    }

    /// Poll `get_status` until the remote side reports completion, with a
    /// bounded retry budget. Expiry is a distinct timeout error.
    pub async fn poll_status(
        &self,
        request_id: &str,
        asn: u32,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<SessionStatusReport> {
        for attempt in 1..=max_attempts {
            let report = self.get_status(request_id, asn).await?;

            if report.is_complete() {
                return Ok(report);
            }
            if report.is_failed() {
                return Err(Error::Bridge(format!(
                    "remote reported {} for request {request_id}",
                    report.status
                )));
            }

            debug!(request_id, attempt, status = %report.status, "autopeer request still pending");
            tokio::time::sleep(interval).await;
        }

        warn!(request_id, max_attempts, "autopeer status polling budget exhausted");
        Err(Error::Timeout(format!(
            "never got session status for request {request_id} after {max_attempts} attempts"
        )))
    }
}
