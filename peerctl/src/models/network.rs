//! Network records
//!
//! A network is an autonomous system this service manages peering for.
//! Override columns take precedence over the mirrored registry record;
//! everything else falls back to the external data through the resolver.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;

use peerctl_common::RefId;

use crate::bridge::types::Member;
use crate::bridge::MemberFilter;
use crate::error::{Error, Result};
use crate::refs::{RefFallback, Resolver};

use super::policy::Policy;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Network {
    pub id: i64,
    pub asn: u32,
    pub org: Option<String>,
    pub policy4_id: Option<i64>,
    pub policy6_id: Option<i64>,
    pub max_sessions: u32,
    pub as_set_override: Option<String>,
    pub prefix4_override: Option<u32>,
    pub prefix6_override: Option<u32>,
    pub network_type_override: Option<String>,
    pub ratio_override: Option<String>,
    pub scope_override: Option<String>,
    pub traffic_override: Option<String>,
    pub unicast_override: Option<bool>,
    pub multicast_override: Option<bool>,
    pub never_via_route_servers_override: Option<bool>,
    pub email_override: Option<String>,
    pub from_email_override: Option<String>,
    pub status: String,
}

const COLUMNS: &str = "id, asn, org, policy4_id, policy6_id, max_sessions,
    as_set_override, prefix4_override, prefix6_override, network_type_override,
    ratio_override, scope_override, traffic_override, unicast_override,
    multicast_override, never_via_route_servers_override, email_override,
    from_email_override, status";

/// Members per side of a mutual location, keyed by ASN ownership
#[derive(Debug, Clone, Serialize)]
pub struct MutualMembers {
    pub ours: Vec<Member>,
    pub theirs: Vec<Member>,
}

impl Network {
    /// Get or create a network row for an ASN
    ///
    /// First creation seeds a "Global" policy owned by the network and
    /// assigns it as both the v4 and v6 default, in the same transaction.
    pub async fn get_or_create(pool: &SqlitePool, asn: u32) -> Result<Network> {
        if let Some(net) = Self::by_asn(pool, asn).await? {
            return Ok(net);
        }

        let mut tx = pool.begin().await?;

        let insert = sqlx::query("INSERT INTO peerctl_net (asn, status) VALUES (?, 'ok')")
            .bind(asn)
            .execute(&mut *tx)
            .await;

        let net_id = match insert {
            Ok(result) => result.last_insert_rowid(),
            // lost a get-or-create race; the other writer's row wins
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                tx.rollback().await?;
                return Self::by_asn(pool, asn)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("network AS{asn}")));
            }
            Err(err) => return Err(err.into()),
        };

        let policy_id = sqlx::query(
            "INSERT INTO peerctl_policy (net_id, name, status) VALUES (?, 'Global', 'ok')",
        )
        .bind(net_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "UPDATE peerctl_net SET policy4_id = ?, policy6_id = ?, updated = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(policy_id)
        .bind(policy_id)
        .bind(net_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(asn = asn, "created network with global policy");

        Self::by_id(pool, net_id).await
    }

    pub async fn by_id(pool: &SqlitePool, id: i64) -> Result<Network> {
        let net = sqlx::query_as::<_, Network>(&format!(
            "SELECT {COLUMNS} FROM peerctl_net WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(net)
    }

    pub async fn by_asn(pool: &SqlitePool, asn: u32) -> Result<Option<Network>> {
        let net = sqlx::query_as::<_, Network>(&format!(
            "SELECT {COLUMNS} FROM peerctl_net WHERE asn = ?"
        ))
        .bind(asn)
        .fetch_optional(pool)
        .await?;

        Ok(net)
    }

    /// Display name; falls back to "AS{asn}" when the registry has no record
    pub async fn name(&self, resolver: &Resolver) -> Result<String> {
        let asn = self.asn;
        let name = resolver
            .network(asn)
            .await
            .map(|net| net.name)
            .or_fallback_with(|| format!("AS{asn}"))?;
        Ok(name)
    }

    pub async fn website(&self, resolver: &Resolver) -> Result<String> {
        Ok(resolver
            .network(self.asn)
            .await
            .map(|net| net.website)
            .or_fallback_default()?)
    }

    /// AS-set override wins over the registry's irr_as_set
    pub async fn as_set(&self, resolver: &Resolver) -> Result<String> {
        if let Some(as_set) = &self.as_set_override {
            return Ok(as_set.clone());
        }
        Ok(resolver
            .network(self.asn)
            .await
            .map(|net| net.irr_as_set)
            .or_fallback_default()?)
    }

    pub async fn prefix4(&self, resolver: &Resolver) -> Result<u32> {
        if let Some(value) = self.prefix4_override {
            return Ok(value);
        }
        Ok(resolver
            .network(self.asn)
            .await
            .map(|net| net.info_prefixes4)
            .or_fallback_default()?)
    }

    pub async fn prefix6(&self, resolver: &Resolver) -> Result<u32> {
        if let Some(value) = self.prefix6_override {
            return Ok(value);
        }
        Ok(resolver
            .network(self.asn)
            .await
            .map(|net| net.info_prefixes6)
            .or_fallback_default()?)
    }

    pub async fn network_type(&self, resolver: &Resolver) -> Result<String> {
        if let Some(value) = &self.network_type_override {
            return Ok(value.clone());
        }
        Ok(resolver
            .network(self.asn)
            .await
            .map(|net| net.info_type)
            .or_fallback_default()?)
    }

    /// Contact address used as the reply-to for peering mails from this
    /// network; the override wins over the registry's Policy contact
    pub async fn peer_contact_email(&self, resolver: &Resolver) -> Result<String> {
        if let Some(email) = &self.email_override {
            return Ok(email.clone());
        }
        Ok(resolver
            .contact(self.asn, "Policy", true)
            .await
            .map(|poc| poc.email)
            .or_fallback_default()?)
    }

    /// Fail with a distinguishable quota error when `planned` more
    /// sessions would exceed this network's limit. Failed and deleted
    /// rows do not count against the quota.
    pub async fn validate_limits(
        &self,
        pool: &SqlitePool,
        free_limit: u32,
        planned: u32,
    ) -> Result<()> {
        let max_sessions = if self.max_sessions > 0 {
            self.max_sessions
        } else {
            free_limit
        };

        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM peerctl_peer_session ps
             JOIN peerctl_peer_port pp ON pp.id = ps.peer_port_id
             JOIN peerctl_peer_net pn ON pn.id = pp.peer_net_id
             WHERE pn.net_id = ? AND ps.status NOT IN ('deleted', 'failed')",
        )
        .bind(self.id)
        .fetch_one(pool)
        .await?;

        if count as u32 + planned > max_sessions {
            return Err(Error::UsageLimit(format!("{max_sessions} sessions")));
        }

        Ok(())
    }

    /// Exchanges where both this network and `other_asn` have presence
    ///
    /// One batched member query covers both ASNs; buckets are keyed by the
    /// composite exchange id and only kept when each side has at least one
    /// member record. Buckets named in `exclude` are dropped.
    pub async fn mutual_locations(
        &self,
        resolver: &Resolver,
        other_asn: u32,
        exclude: &[String],
    ) -> Result<BTreeMap<String, MutualMembers>> {
        let members = resolver
            .member_directory()
            .members(MemberFilter::asns(vec![self.asn, other_asn]))
            .await
            .map_err(|e| Error::Bridge(e.to_string()))?;

        let mut exchanges: BTreeMap<String, MutualMembers> = BTreeMap::new();

        for member in members {
            let ix_ref_id = member.ref_ix_id().to_string();

            if exclude.contains(&ix_ref_id) {
                continue;
            }

            let bucket = exchanges.entry(ix_ref_id).or_insert_with(|| MutualMembers {
                ours: Vec::new(),
                theirs: Vec::new(),
            });

            if member.asn == self.asn {
                bucket.ours.push(member);
            } else if member.asn == other_asn {
                bucket.theirs.push(member);
            }
        }

        exchanges.retain(|_, bucket| !bucket.ours.is_empty() && !bucket.theirs.is_empty());

        Ok(exchanges)
    }

    /// Global policy pointer for an ip version, if assigned
    pub fn global_policy_id(&self, version: super::IpVersion) -> Option<i64> {
        match version {
            super::IpVersion::V4 => self.policy4_id,
            super::IpVersion::V6 => self.policy6_id,
        }
    }

    pub async fn set_policy(
        &self,
        pool: &SqlitePool,
        policy: Option<&Policy>,
        version: super::IpVersion,
    ) -> Result<()> {
        let column = match version {
            super::IpVersion::V4 => "policy4_id",
            super::IpVersion::V6 => "policy6_id",
        };

        sqlx::query(&format!(
            "UPDATE peerctl_net SET {column} = ?, updated = CURRENT_TIMESTAMP WHERE id = ?"
        ))
        .bind(policy.map(|p| p.id))
        .bind(self.id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Exchange ids (composite form) listed for this network's memberships
    pub async fn exchange_presence(&self, resolver: &Resolver) -> Result<Vec<RefId>> {
        let members = resolver.preload_members(vec![self.asn]).await?;
        let mut seen = Vec::new();
        for member in members {
            let ref_ix_id = member.ref_ix_id();
            if !seen.contains(&ref_ix_id) {
                seen.push(ref_ix_id);
            }
        }
        Ok(seen)
    }
}
