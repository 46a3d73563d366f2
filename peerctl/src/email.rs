//! Email rendering and delivery
//!
//! The notification workflow renders one of three message kinds and hands
//! it to an `EmailTransport`. The default transport only records the
//! message; a real SMTP relay can be plugged in at the seam. Test mode
//! redirects every message back at the sender so workflow runs against
//! production data never mail a peer by accident.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{Error, Result};

/// Message kinds the peering workflow produces, one per lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    PeerRequest,
    PeerConfigComplete,
    PeerSessionLive,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::PeerRequest => "peer-request",
            TemplateKind::PeerConfigComplete => "peer-config-complete",
            TemplateKind::PeerSessionLive => "peer-session-live",
        }
    }

    fn default_body(&self) -> &'static str {
        match self {
            TemplateKind::PeerRequest => {
                "Hello,\n\n\
                 We are {{ company_name }} (AS{{ asn }}) and would like to set up \
                 peering with your network (AS{{ peer_asn }}).\n\n\
                 We are present at the following mutual locations:\n\n\
                 {{ locations }}\n\
                 Our peering details:\n\n\
                 AS-SET: {{ as_set }}\n\
                 Prefixes v4: {{ prefixes4 }}\n\
                 Prefixes v6: {{ prefixes6 }}\n\n\
                 Please let us know if you are interested and we will configure \
                 our side of the sessions.\n\n\
                 Kind regards,\n\
                 {{ company_name }}"
            }
            TemplateKind::PeerConfigComplete => {
                "Hello,\n\n\
                 We have configured our side of the peering sessions between \
                 {{ company_name }} (AS{{ asn }}) and AS{{ peer_asn }}:\n\n\
                 {{ sessions }}\n\
                 Please configure your side and let us know once the sessions \
                 are up.\n\n\
                 Kind regards,\n\
                 {{ company_name }}"
            }
            TemplateKind::PeerSessionLive => {
                "Hello,\n\n\
                 The peering sessions between {{ company_name }} (AS{{ asn }}) \
                 and AS{{ peer_asn }} are now live:\n\n\
                 {{ sessions }}\n\
                 Thank you for peering with us.\n\n\
                 Kind regards,\n\
                 {{ company_name }}"
            }
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "peer-request" => Ok(TemplateKind::PeerRequest),
            "peer-config-complete" => Ok(TemplateKind::PeerConfigComplete),
            "peer-session-live" => Ok(TemplateKind::PeerSessionLive),
            other => Err(Error::TemplateRender(format!("unknown template kind {other}"))),
        }
    }
}

/// Stored per-network template override
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailTemplate {
    pub id: i64,
    pub net_id: i64,
    pub kind: String,
    pub name: String,
    pub body: Option<String>,
}

impl EmailTemplate {
    /// The network's default template for a kind, when one is stored
    pub async fn default_for(
        pool: &SqlitePool,
        net_id: i64,
        kind: TemplateKind,
    ) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, EmailTemplate>(
            "SELECT id, net_id, kind, name, body FROM peerctl_email_template \
             WHERE net_id = ? AND kind = ? AND is_default = 1",
        )
        .bind(net_id)
        .bind(kind.as_str())
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn by_name(pool: &SqlitePool, net_id: i64, name: &str) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, EmailTemplate>(
            "SELECT id, net_id, kind, name, body FROM peerctl_email_template \
             WHERE net_id = ? AND name = ?",
        )
        .bind(net_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn save(
        pool: &SqlitePool,
        net_id: i64,
        kind: TemplateKind,
        name: &str,
        body: &str,
        is_default: bool,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO peerctl_email_template (net_id, kind, name, body, is_default) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (net_id, name) DO UPDATE \
             SET kind = excluded.kind, body = excluded.body, \
                 is_default = excluded.is_default, updated = CURRENT_TIMESTAMP",
        )
        .bind(net_id)
        .bind(kind.as_str())
        .bind(name)
        .bind(body)
        .bind(is_default)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

/// Render a message body for a kind, using the network's stored override
/// when one exists
pub async fn render(
    pool: &SqlitePool,
    net_id: i64,
    kind: TemplateKind,
    context: &HashMap<String, String>,
) -> Result<String> {
    let stored = EmailTemplate::default_for(pool, net_id, kind).await?;

    let body = match stored {
        Some(template) => template_body(template)?,
        None => kind.default_body().to_string(),
    };

    Ok(substitute(&body, context))
}

/// Render a specific named template for a step. The template's kind must
/// match the step requesting it.
pub async fn render_named(
    pool: &SqlitePool,
    net_id: i64,
    name: &str,
    kind: TemplateKind,
    context: &HashMap<String, String>,
) -> Result<String> {
    let template = EmailTemplate::by_name(pool, net_id, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("email template {name}")))?;

    if template.kind != kind.as_str() {
        return Err(Error::TemplateRender(format!(
            "template {} is of kind {}, expected {}",
            template.name, template.kind, kind
        )));
    }

    Ok(substitute(&template_body(template)?, context))
}

fn template_body(template: EmailTemplate) -> Result<String> {
    template
        .body
        .ok_or_else(|| Error::TemplateRender(format!("template {} has no body", template.name)))
}

/// `{{ key }}` token substitution; unknown tokens are left in place so a
/// bad template is visible in the output rather than silently blanked
fn substitute(body: &str, context: &HashMap<String, String>) -> String {
    let mut rendered = body.to_string();
    for (key, value) in context {
        rendered = rendered.replace(&format!("{{{{ {key} }}}}"), value);
    }
    rendered
}

/// One outbound message, fully rendered
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from: String,
    /// recipient address with the peer ASN it belongs to, when known
    pub to: Vec<(String, Option<u32>)>,
    pub reply_to: Option<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery seam. Implementations must not assume they run inside a
/// database transaction; a logged message stays logged even when the
/// surrounding workflow step fails afterwards.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<()>;
}

/// Default transport: records the message and delivers nothing
pub struct LogOnlyTransport;

#[async_trait]
impl EmailTransport for LogOnlyTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<()> {
        info!(
            from = %message.from,
            recipients = message.to.len(),
            subject = %message.subject,
            "email recorded (log-only transport)"
        );
        Ok(())
    }
}

/// Apply the test-mode redirect: all recipients are replaced by the
/// initiating side's own address (the reply-to contact, falling back to
/// the sender) so nothing ever reaches a real peer
pub fn redirect_for_test_mode(message: &mut EmailMessage) {
    let debug_address = message
        .reply_to
        .clone()
        .unwrap_or_else(|| message.from.clone());
    message.to = vec![(debug_address, None)];
    message.subject = format!("[TEST] {}", message.subject);
}
