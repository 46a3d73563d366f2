//! Email-driven peering workflow
//!
//! Runs the same state-machine steps as `SessionWorkflow` and mails the
//! peer's policy contact at each one. The notification precedes the
//! state transition: an unresolvable contact or a delivery failure
//! stops the step from committing, while a sent mail whose step then
//! fails is logged and not recalled.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use peerctl_common::config::EmailConfig;

use crate::email::{self, EmailMessage, EmailTransport, TemplateKind};
use crate::error::{Error, Result};
use crate::models::{AuditEvent, AuditLog, EmailLog, Network, PeerSession};
use crate::refs::RefFallback;

use super::session::{SessionWorkflow, WorkflowOutcome, WorkflowStep};
use crate::models::IpVersion;

pub struct EmailWorkflow {
    inner: SessionWorkflow,
    transport: Arc<dyn EmailTransport>,
    config: EmailConfig,
}

impl EmailWorkflow {
    pub fn new(
        inner: SessionWorkflow,
        transport: Arc<dyn EmailTransport>,
        config: EmailConfig,
    ) -> Self {
        EmailWorkflow {
            inner,
            transport,
            config,
        }
    }

    /// One step forward for the pair, with the matching notification.
    ///
    /// The notification goes out first: a pair whose peer contact cannot
    /// be resolved, or whose mail cannot be sent, must not advance with
    /// the peer never hearing about it.
    pub async fn progress(
        &self,
        net: &Network,
        peer_asn: u32,
        user: &str,
        exclude: &[String],
    ) -> Result<WorkflowOutcome> {
        let kind = match self.inner.next_step(net, peer_asn).await? {
            WorkflowStep::Request => Some(TemplateKind::PeerRequest),
            WorkflowStep::ConfigComplete => Some(TemplateKind::PeerConfigComplete),
            WorkflowStep::Finalize => Some(TemplateKind::PeerSessionLive),
            WorkflowStep::Done => None,
        };

        if let Some(kind) = kind {
            let sessions: Vec<PeerSession> =
                PeerSession::for_peer(self.inner.pool(), net.id, peer_asn)
                    .await?
                    .into_iter()
                    .filter(|s| matches!(s.session_status(), Ok(st) if !st.is_reset()))
                    .collect();
            self.notify(net, peer_asn, kind, &sessions, user).await?;
        }

        self.inner.progress(net, peer_asn, user, exclude).await
    }

    async fn notify(
        &self,
        net: &Network,
        peer_asn: u32,
        kind: TemplateKind,
        sessions: &[PeerSession],
        user: &str,
    ) -> Result<()> {
        let pool = self.inner.pool();
        let resolver = self.inner.resolver();

        let contact = resolver
            .contact(peer_asn, "Policy", true)
            .await
            .map_err(|_| {
                Error::Validation(format!("no policy contact with an email for AS{peer_asn}"))
            })?;

        let context = self.build_context(net, peer_asn, sessions).await?;
        let body = email::render(pool, net.id, kind, &context).await?;

        let from = net
            .from_email_override
            .clone()
            .unwrap_or_else(|| self.config.default_from.clone());
        let reply_to = net.peer_contact_email(resolver).await?;

        let subject = match kind {
            TemplateKind::PeerRequest => {
                format!("Peering request from {} (AS{})", context["company_name"], net.asn)
            }
            TemplateKind::PeerConfigComplete => {
                format!("Peering configured between AS{} and AS{peer_asn}", net.asn)
            }
            TemplateKind::PeerSessionLive => {
                format!("Peering sessions between AS{} and AS{peer_asn} are live", net.asn)
            }
        };
        let subject = format!("{}{subject}", self.config.subject_prefix);

        let mut message = EmailMessage {
            from,
            to: vec![(contact.email, Some(peer_asn))],
            reply_to: if reply_to.is_empty() { None } else { Some(reply_to) },
            cc: Vec::new(),
            subject,
            body,
        };

        if self.config.test_mode {
            email::redirect_for_test_mode(&mut message);
        }

        let recipients: Vec<(String, Option<u32>)> = message.to.clone();
        let mut log = EmailLog::log(
            pool,
            net.id,
            user,
            &message.from,
            &message.subject,
            &message.body,
            kind.as_str(),
            &recipients,
        )
        .await?;

        if let Err(err) = self.transport.deliver(&message).await {
            warn!(net = net.asn, peer = peer_asn, error = %err, "email delivery failed");
            log.set_status(pool, "failed").await?;
            return Err(err);
        }

        AuditLog::append(
            pool,
            net.id,
            AuditEvent::Email,
            user,
            &json!({"peer_asn": peer_asn, "kind": kind.as_str(), "email_log_id": log.id}),
        )
        .await?;

        Ok(())
    }

    async fn build_context(
        &self,
        net: &Network,
        peer_asn: u32,
        sessions: &[PeerSession],
    ) -> Result<HashMap<String, String>> {
        let resolver = self.inner.resolver();

        let peer_name = resolver
            .network(peer_asn)
            .await
            .map(|n| n.name)
            .or_fallback_with(|| format!("AS{peer_asn}"))?;

        let mut locations = String::new();
        let mutual = net.mutual_locations(resolver, peer_asn, &[]).await?;
        for (ix_key, bucket) in &mutual {
            let name = bucket
                .ours
                .first()
                .or_else(|| bucket.theirs.first())
                .map(|m| m.name.clone())
                .unwrap_or_else(|| ix_key.clone());
            locations.push_str(&format!("  - {name}\n"));
        }

        let mut session_lines = String::new();
        for session in sessions {
            let peer_port = crate::models::PeerPort::by_id(self.inner.pool(), session.peer_port_id).await?;
            let info = peer_port.port_info(self.inner.pool()).await?;
            let ip4 = info.ipaddr(resolver, IpVersion::V4).await?.unwrap_or_default();
            let ip6 = info.ipaddr(resolver, IpVersion::V6).await?.unwrap_or_default();
            session_lines.push_str(&format!("  - v4: {ip4}  v6: {ip6}\n"));
        }

        let mut context = HashMap::new();
        context.insert("company_name".to_string(), net.name(resolver).await?);
        context.insert("peer_company_name".to_string(), peer_name);
        context.insert("asn".to_string(), net.asn.to_string());
        context.insert("peer_asn".to_string(), peer_asn.to_string());
        context.insert("as_set".to_string(), net.as_set(resolver).await?);
        context.insert("prefixes4".to_string(), net.prefix4(resolver).await?.to_string());
        context.insert("prefixes6".to_string(), net.prefix6(resolver).await?.to_string());
        context.insert("locations".to_string(), locations);
        context.insert("sessions".to_string(), session_lines);

        Ok(context)
    }
}
