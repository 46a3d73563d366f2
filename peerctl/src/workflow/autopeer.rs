//! Autopeer-driven peering workflow
//!
//! Instead of mailing a human, this driver calls the peer network's
//! autopeer endpoint: discover their registered locations, intersect with
//! our own exchange presence, bulk-propose sessions, and poll until the
//! remote side confirms. Any failure marks the owning request and its
//! locations failed before the error propagates; that bookkeeping is the
//! task's failure handler, not happy-path logic.

use std::time::Duration;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use peerctl_common::config::AutopeerConfig;

use crate::autopeer::schema::SessionProposal;
use crate::autopeer::AutopeerClient;
use crate::error::{Error, Result};
use crate::models::network::MutualMembers;
use crate::models::{
    AuditEvent, AuditLog, Network, PeerNetwork, PeerPort, PeerRequest, PeerSession, SessionStatus,
};

use super::session::SessionWorkflow;

pub struct AutopeerWorkflow {
    inner: SessionWorkflow,
    config: AutopeerConfig,
    http_timeout: Duration,
}

impl AutopeerWorkflow {
    pub fn new(inner: SessionWorkflow, config: AutopeerConfig, http_timeout: Duration) -> Self {
        AutopeerWorkflow {
            inner,
            config,
            http_timeout,
        }
    }

    /// Run the full task for one peer pair. This is the task boundary:
    /// every failure below lands in the request's failure note.
    pub async fn run(&self, net: &Network, peer_asn: u32, user: &str) -> Result<PeerRequest> {
        let url = self
            .config
            .url_for(peer_asn)
            .ok_or_else(|| {
                Error::Validation(format!("AS{peer_asn} has no registered autopeer endpoint"))
            })?
            .to_string();

        let mut request =
            PeerRequest::create(self.inner.pool(), net.id, peer_asn, "autopeer").await?;

        match self.execute(net, peer_asn, user, &url, &request).await {
            Ok(()) => {
                request.complete(self.inner.pool()).await?;
                Ok(request)
            }
            Err(err) => {
                request
                    .mark_failed(self.inner.pool(), &err.to_string())
                    .await?;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        net: &Network,
        peer_asn: u32,
        user: &str,
        url: &str,
        request: &PeerRequest,
    ) -> Result<()> {
        let pool = self.inner.pool();
        let resolver = self.inner.resolver();

        let client = AutopeerClient::new(url, self.http_timeout)?;

        let remote: Vec<String> = client.list_locations(net.asn).await?;
        let mutual = net.mutual_locations(resolver, peer_asn, &[]).await?;

        // keep only exchanges the remote side registered for autopeering
        let shared: Vec<(&String, &MutualMembers, i64)> = mutual
            .iter()
            .filter_map(|(key, bucket)| {
                let pdb_ix_id = bucket
                    .ours
                    .first()
                    .and_then(|m| m.pdb_ix_id())
                    .or_else(|| bucket.theirs.first().and_then(|m| m.pdb_ix_id()))?;
                remote
                    .contains(&format!("pdb:ix:{pdb_ix_id}"))
                    .then_some((key, bucket, pdb_ix_id))
            })
            .collect();

        if shared.is_empty() {
            return Err(Error::Validation(format!(
                "AS{} and AS{peer_asn} share no autopeer-enabled exchange",
                net.asn
            )));
        }

        let planned: u32 = shared
            .iter()
            .map(|(_, bucket, _)| (bucket.ours.len() * bucket.theirs.len()) as u32)
            .sum();
        net.validate_limits(pool, self.inner.free_limit(), planned).await?;

        let peer = Network::get_or_create(pool, peer_asn).await?;
        let peer_net = PeerNetwork::get_or_create(pool, net, &peer).await?;

        let mut proposals = Vec::new();
        let mut pairs = Vec::new();
        for (key, bucket, pdb_ix_id) in &shared {
            request.add_location(pool, Some(*pdb_ix_id), None).await?;

            for ours in &bucket.ours {
                for theirs in &bucket.theirs {
                    let families = [
                        (ours.ipaddr4.as_deref(), theirs.ipaddr4.as_deref()),
                        (ours.ipaddr6.as_deref(), theirs.ipaddr6.as_deref()),
                    ];
                    for (local_ip, peer_ip) in families {
                        if let (Some(local_ip), Some(peer_ip)) = (local_ip, peer_ip) {
                            proposals.push(SessionProposal {
                                local_asn: net.asn,
                                local_ip: local_ip.to_string(),
                                peer_asn,
                                peer_ip: peer_ip.to_string(),
                                peer_type: "peer".to_string(),
                                md5: peer_net.md5.clone(),
                                location: format!("pdb:ix:{pdb_ix_id}"),
                                status: "pending".to_string(),
                                uuid: Uuid::new_v4().to_string(),
                            });
                        }
                    }
                    pairs.push((ours.clone(), theirs.clone()));
                }
            }

            info!(net = net.asn, peer = peer_asn, exchange = %key, "autopeer exchange selected");
        }

        if proposals.is_empty() {
            return Err(Error::Validation(format!(
                "no addressable sessions toward AS{peer_asn}"
            )));
        }

        let request_id = client.add_sessions(&proposals).await?;
        client
            .poll_status(
                &request_id,
                net.asn,
                self.config.poll_max_attempts,
                Duration::from_millis(self.config.poll_interval_ms),
            )
            .await?;

        // remote confirmed; materialize our side directly at ok
        let mut sessions = Vec::new();
        for (ours, theirs) in &pairs {
            let (our_info, peer_port) = PeerPort::from_members(pool, net, ours, theirs).await?;

            let mut session = PeerSession::get_or_create(
                pool,
                resolver,
                our_info.port,
                &peer_port,
                SessionStatus::Pending,
            )
            .await?;
            session.set_status(pool, SessionStatus::Ok).await?;
            sessions.push(session.id);
        }

        for mut location in request.locations(pool).await? {
            if location.status == "pending" {
                location.set_status(pool, "completed").await?;
            }
        }

        AuditLog::append(
            pool,
            net.id,
            AuditEvent::PeerSessionAdd,
            user,
            &json!({
                "peer_asn": peer_asn,
                "peer_request_id": request.id,
                "remote_request_id": request_id,
                "sessions": sessions,
            }),
        )
        .await?;

        Ok(())
    }
}
