//! Peer-session state machine
//!
//! Sessions move pending -> requested -> configured -> ok, never backward.
//! `progress` inspects the current state of the pair and runs exactly one
//! step; drivers (email, autopeer) call the same steps and add their own
//! side effects around them.

use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::bridge::types::{DummyPortRequest, Member};
use crate::error::{Error, Result};
use crate::models::{
    AuditEvent, AuditLog, Network, PeerPort, PeerRequest, PeerSession, PortInfo, SessionStatus,
};
use crate::refs::Resolver;

/// The one step `progress` will run next for a peer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    Request,
    ConfigComplete,
    Finalize,
    Done,
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub step: WorkflowStep,
    pub sessions: Vec<PeerSession>,
    pub request: Option<PeerRequest>,
}

#[derive(Clone)]
pub struct SessionWorkflow {
    pool: SqlitePool,
    resolver: Arc<Resolver>,
    free_limit: u32,
}

impl SessionWorkflow {
    pub fn new(pool: SqlitePool, resolver: Arc<Resolver>, free_limit: u32) -> Self {
        SessionWorkflow {
            pool,
            resolver,
            free_limit,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn free_limit(&self) -> u32 {
        self.free_limit
    }

    /// Next step for a pair, derived from the least-advanced live session
    pub async fn next_step(&self, net: &Network, peer_asn: u32) -> Result<WorkflowStep> {
        let sessions = PeerSession::for_peer(&self.pool, net.id, peer_asn).await?;

        // failed and deleted rows read as absent; the pair starts over
        let lowest = sessions
            .iter()
            .filter_map(|s| s.session_status().ok())
            .filter(|s| !s.is_reset())
            .min();

        Ok(match lowest {
            None | Some(SessionStatus::Pending) => WorkflowStep::Request,
            Some(SessionStatus::Requested) => WorkflowStep::ConfigComplete,
            Some(SessionStatus::Configured) => WorkflowStep::Finalize,
            Some(_) => WorkflowStep::Done,
        })
    }

    /// Run the next step for the pair. Fully established pairs are a no-op.
    /// Quota is re-checked on every call, not only at request time.
    pub async fn progress(
        &self,
        net: &Network,
        peer_asn: u32,
        user: &str,
        exclude: &[String],
    ) -> Result<WorkflowOutcome> {
        net.validate_limits(&self.pool, self.free_limit, 1).await?;

        match self.next_step(net, peer_asn).await? {
            WorkflowStep::Request => {
                let (request, sessions) =
                    self.request(net, peer_asn, user, "email", exclude).await?;
                Ok(WorkflowOutcome {
                    step: WorkflowStep::Request,
                    sessions,
                    request: Some(request),
                })
            }
            WorkflowStep::ConfigComplete => Ok(WorkflowOutcome {
                step: WorkflowStep::ConfigComplete,
                sessions: self.config_complete(net, peer_asn, user).await?,
                request: None,
            }),
            WorkflowStep::Finalize => Ok(WorkflowOutcome {
                step: WorkflowStep::Finalize,
                sessions: self.finalize(net, peer_asn, user).await?,
                request: None,
            }),
            WorkflowStep::Done => Ok(WorkflowOutcome {
                step: WorkflowStep::Done,
                sessions: PeerSession::for_peer(&self.pool, net.id, peer_asn).await?,
                request: None,
            }),
        }
    }

    /// Fan a peering request out across every mutual exchange.
    ///
    /// Quota is checked before anything is written. Sessions are created
    /// pending and advanced to requested; sessions that already moved
    /// further are left alone.
    pub async fn request(
        &self,
        net: &Network,
        peer_asn: u32,
        user: &str,
        request_type: &str,
        exclude: &[String],
    ) -> Result<(PeerRequest, Vec<PeerSession>)> {
        let mutual = net
            .mutual_locations(&self.resolver, peer_asn, exclude)
            .await?;
        if mutual.is_empty() {
            return Err(Error::Validation(format!(
                "AS{} and AS{} share no exchange",
                net.asn, peer_asn
            )));
        }

        // quota covers the whole fan-out, minus sessions the pair already has
        let planned: u32 = mutual
            .values()
            .map(|b| (b.ours.len() * b.theirs.len()) as u32)
            .sum();
        let existing = PeerSession::for_peer(&self.pool, net.id, peer_asn)
            .await?
            .iter()
            .filter(|s| matches!(s.session_status(), Ok(st) if !st.is_reset()))
            .count() as u32;
        net.validate_limits(&self.pool, self.free_limit, planned.saturating_sub(existing))
            .await?;

        let request = PeerRequest::create(&self.pool, net.id, peer_asn, request_type).await?;

        let mut sessions = Vec::new();
        for (ix_key, bucket) in &mutual {
            let pdb_ix_id = bucket
                .ours
                .first()
                .and_then(|m| m.pdb_ix_id())
                .or_else(|| bucket.theirs.first().and_then(|m| m.pdb_ix_id()));
            let ixctl_ix_id = bucket
                .ours
                .first()
                .filter(|m| m.source == peerctl_common::RefSource::Ixctl)
                .map(|m| m.ix_id);
            request.add_location(&self.pool, pdb_ix_id, ixctl_ix_id).await?;

            for ours in &bucket.ours {
                for theirs in &bucket.theirs {
                    let (mut our_info, peer_port) =
                        PeerPort::from_members(&self.pool, net, ours, theirs).await?;
                    self.bootstrap_port(net, ours, &mut our_info).await?;

                    let mut session = PeerSession::get_or_create(
                        &self.pool,
                        &self.resolver,
                        our_info.port,
                        &peer_port,
                        SessionStatus::Pending,
                    )
                    .await?;

                    session.set_status(&self.pool, SessionStatus::Requested).await?;
                    sessions.push(session);
                }
            }

            info!(net = net.asn, peer = peer_asn, exchange = %ix_key, "peering requested");
        }

        AuditLog::append(
            &self.pool,
            net.id,
            AuditEvent::PeerSessionRequest,
            user,
            &json!({
                "peer_asn": peer_asn,
                "peer_request_id": request.id,
                "sessions": sessions.iter().map(|s| s.id).collect::<Vec<_>>(),
            }),
        )
        .await?;

        Ok((request, sessions))
    }

    /// Back a floating attachment record with an inventory port.
    ///
    /// Records created from directory data alone carry port 0; the
    /// inventory service hands out a placeholder port so device-level
    /// config rendering has something to hang off. When the inventory
    /// service cannot allocate one the record stays floating, which every
    /// downstream accessor tolerates.
    async fn bootstrap_port(
        &self,
        net: &Network,
        member: &Member,
        info: &mut PortInfo,
    ) -> Result<()> {
        if info.port > 0 {
            return Ok(());
        }

        let spec = DummyPortRequest {
            name: format!("peerctl:{}", member.ref_id()),
            ip_address_4: member.ipaddr4.clone(),
            ip_address_6: member.ipaddr6.clone(),
        };

        match self.resolver.request_dummy_ports(net.asn, &[spec], "dummy").await {
            Ok(ports) => {
                if let Some(port) = ports.first() {
                    info.assign_port(&self.pool, port.id).await?;
                }
            }
            Err(err) => {
                warn!(net = net.asn, error = %err, "inventory port allocation failed");
            }
        }

        Ok(())
    }

    /// Our side is configured: requested sessions move to configured
    pub async fn config_complete(
        &self,
        net: &Network,
        peer_asn: u32,
        user: &str,
    ) -> Result<Vec<PeerSession>> {
        self.advance(net, peer_asn, user, SessionStatus::Requested, SessionStatus::Configured)
            .await
    }

    /// Both sides confirmed up: configured sessions move to ok and the
    /// open request for the pair is completed
    pub async fn finalize(&self, net: &Network, peer_asn: u32, user: &str) -> Result<Vec<PeerSession>> {
        let sessions = self
            .advance(net, peer_asn, user, SessionStatus::Configured, SessionStatus::Ok)
            .await?;

        if let Some(mut request) =
            PeerRequest::latest_open(&self.pool, net.id, peer_asn).await?
        {
            request.complete(&self.pool).await?;
        }

        Ok(sessions)
    }

    async fn advance(
        &self,
        net: &Network,
        peer_asn: u32,
        user: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<Vec<PeerSession>> {
        let mut sessions = PeerSession::for_peer(&self.pool, net.id, peer_asn).await?;

        let mut advanced = Vec::new();
        for session in &mut sessions {
            if session.session_status()? == from && session.set_status(&self.pool, to).await? {
                advanced.push(session.id);
            }
        }

        if advanced.is_empty() {
            return Err(Error::Validation(format!(
                "no {from} sessions toward AS{peer_asn}"
            )));
        }

        AuditLog::append(
            &self.pool,
            net.id,
            AuditEvent::PeerSessionMod,
            user,
            &json!({"peer_asn": peer_asn, "status": to.as_str(), "sessions": advanced}),
        )
        .await?;

        Ok(sessions)
    }
}
