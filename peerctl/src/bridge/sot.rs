//! Cross-source member directory
//!
//! Membership records have their source of truth in either the exchange
//! directory or the peeringdb mirror. `SotDirectory` fans a single filter out
//! to both and returns the combined, source-tagged result, preferring the
//! exchange directory when both systems carry the same member.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::Member;
use super::{BridgeError, MemberDirectory, MemberFilter};

pub struct SotDirectory {
    ixctl: Arc<dyn MemberDirectory>,
    pdbctl: Arc<dyn MemberDirectory>,
}

impl SotDirectory {
    pub fn new(ixctl: Arc<dyn MemberDirectory>, pdbctl: Arc<dyn MemberDirectory>) -> Self {
        Self { ixctl, pdbctl }
    }
}

#[async_trait]
impl MemberDirectory for SotDirectory {
    async fn members(&self, filter: MemberFilter) -> Result<Vec<Member>, BridgeError> {
        let (ix_members, pdb_members) = tokio::join!(
            self.ixctl.members(filter.clone()),
            self.pdbctl.members(filter)
        );

        let mut members = ix_members?;

        // exchanges already represented through ixctl take precedence over
        // their peeringdb mirror record
        let claimed: Vec<(u32, i64)> = members
            .iter()
            .filter_map(|m| m.pdb_ix_id().map(|ix| (m.asn, ix)))
            .collect();

        for member in pdb_members? {
            if claimed.contains(&(member.asn, member.ix_id)) {
                continue;
            }
            members.push(member);
        }

        Ok(members)
    }
}
