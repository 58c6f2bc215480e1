//! Heartbeat Failure Detector
//!
//! First phase of every tick. The node bumps its own heartbeat, then ages
//! every peer record against two thresholds:
//!
//! - `t_fail`: the record is suspected (`failed = true`) but kept, so fresh
//!   gossip carrying a higher heartbeat can still revive it.
//! - `t_remove`: the record is dropped for good.
//!
//! Removals are collected during the scan and applied afterwards, so every
//! record is inspected exactly once per tick.

use super::table::MembershipTable;
use super::types::{Address, Timestamp};
use crate::config::ProtocolConfig;
use crate::error::{MembershipError, Result};

/// Changes made to peer records by one aging pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AgingOutcome {
    /// Peers that crossed `t_fail` in this pass
    pub suspected: Vec<Address>,
    /// Peers that crossed `t_remove` and are gone from the table
    pub removed: Vec<Address>,
}

/// Writes the node's new heartbeat into its own record.
pub fn refresh_self(
    table: &mut MembershipTable,
    self_id: u32,
    heartbeat: u64,
    now: Timestamp,
) -> Result<()> {
    let own = table.get_mut(self_id).ok_or_else(|| {
        MembershipError::InvariantViolation(format!(
            "node {} has no record of itself in its membership table",
            self_id
        ))
    })?;

    own.heartbeat = heartbeat;
    own.last_refresh = now;
    own.failed = false;
    Ok(())
}

/// Marks stale peers failed and evicts those past `t_remove`.
pub fn age_peers(
    table: &mut MembershipTable,
    self_id: u32,
    now: Timestamp,
    config: &ProtocolConfig,
) -> AgingOutcome {
    let mut outcome = AgingOutcome::default();

    let stale: Vec<(u32, u64)> = table
        .iter()
        .filter(|r| r.id != self_id)
        .map(|r| (r.id, r.age(now)))
        .filter(|(_, age)| *age >= config.t_fail)
        .collect();

    for (id, age) in stale {
        let Some(record) = table.get_mut(id) else {
            continue;
        };

        if !record.failed {
            record.failed = true;
            outcome.suspected.push(record.address());
        }

        if age >= config.t_remove {
            outcome.removed.push(record.address());
        }
    }

    if !outcome.removed.is_empty() {
        let removed = &outcome.removed;
        table.retain(|r| !removed.iter().any(|a| a.id == r.id));
    }

    outcome
}
