//! Membership Table
//!
//! Ordered, id-unique collection of [`MemberRecord`]s owned by a single node.
//! Records stay sorted by ascending id at all times, which gives deterministic
//! iteration for logs, reports and tests. Protocol correctness never depends
//! on the order.
//!
//! The table also carries the two population rules of the protocol:
//! - **Join population** (`populate_from_reply`): first fill from the
//!   introducer's table, no heartbeat comparison.
//! - **Anti-entropy merge** (`merge`): last-writer-wins on strictly greater
//!   heartbeat, no resurrection of records the sender already marked failed.

use super::types::{Address, MemberRecord, Timestamp};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipTable {
    records: Vec<MemberRecord>,
}

/// What a single anti-entropy merge changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Peers inserted because they were unknown until now.
    pub added: Vec<Address>,
    /// Existing records overwritten by a newer heartbeat.
    pub updated: usize,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MemberRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.id).collect()
    }

    fn position(&self, id: u32) -> Result<usize, usize> {
        self.records.binary_search_by_key(&id, |r| r.id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.position(id).is_ok()
    }

    pub fn get(&self, id: u32) -> Option<&MemberRecord> {
        self.position(id).ok().map(|idx| &self.records[idx])
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut MemberRecord> {
        match self.position(id) {
            Ok(idx) => Some(&mut self.records[idx]),
            Err(_) => None,
        }
    }

    /// Inserts a record in id order. Returns `false` (and leaves the table
    /// untouched) if a record with the same id is already present.
    pub fn insert(&mut self, record: MemberRecord) -> bool {
        match self.position(record.id) {
            Ok(_) => false,
            Err(idx) => {
                self.records.insert(idx, record);
                true
            }
        }
    }

    /// Sets the refresh time of a known peer. Returns whether it was known.
    pub fn touch(&mut self, id: u32, now: Timestamp) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.last_refresh = now;
                true
            }
            None => false,
        }
    }

    /// Drops every record for which `keep` returns false.
    pub fn retain(&mut self, keep: impl FnMut(&MemberRecord) -> bool) {
        self.records.retain(keep);
    }

    /// Index-based access used by the gossip target draw.
    pub fn nth(&self, index: usize) -> Option<&MemberRecord> {
        self.records.get(index)
    }

    /// Registers a peer that asked the introducer to join.
    ///
    /// A repeated request for a known id refreshes the existing row instead
    /// of duplicating it. Returns whether a new row was created.
    pub fn admit(&mut self, addr: Address, now: Timestamp) -> bool {
        if let Some(existing) = self.get_mut(addr.id) {
            existing.last_refresh = now;
            existing.failed = false;
            return false;
        }
        self.insert(MemberRecord::fresh(addr, 0, now))
    }

    /// First population from a JOIN_REPLY.
    ///
    /// Every record other than our own is inserted with a local refresh
    /// time. Heartbeats are taken as-is; ids already present are skipped.
    pub fn populate_from_reply(
        &mut self,
        incoming: &[MemberRecord],
        self_id: u32,
        now: Timestamp,
    ) -> Vec<Address> {
        let mut added = Vec::new();

        for record in incoming.iter().filter(|r| r.id != self_id) {
            let fresh = MemberRecord {
                last_refresh: now,
                failed: false,
                ..*record
            };
            if self.insert(fresh) {
                added.push(fresh.address());
            }
        }

        added
    }

    /// Anti-entropy merge of a peer's full table.
    ///
    /// The highest heartbeat ever seen for an id wins; equal heartbeats keep
    /// the local copy. Unknown ids are only adopted when the sender still
    /// considers them alive. Our own row is never overwritten.
    pub fn merge(
        &mut self,
        incoming: &[MemberRecord],
        self_id: u32,
        now: Timestamp,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for record in incoming {
            if record.id == self_id {
                continue;
            }

            match self.get_mut(record.id) {
                Some(local) => {
                    if record.heartbeat > local.heartbeat {
                        local.port = record.port;
                        local.heartbeat = record.heartbeat;
                        local.last_refresh = now;
                        local.failed = false;
                        outcome.updated += 1;
                    }
                }
                None => {
                    if record.failed {
                        continue;
                    }
                    let fresh = MemberRecord {
                        last_refresh: now,
                        failed: false,
                        ..*record
                    };
                    if self.insert(fresh) {
                        outcome.added.push(fresh.address());
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, heartbeat: u64, last_refresh: Timestamp, failed: bool) -> MemberRecord {
        MemberRecord {
            id,
            port: 0,
            heartbeat,
            last_refresh,
            failed,
        }
    }

    #[test]
    fn test_insert_keeps_order_and_uniqueness() {
        let mut table = MembershipTable::new();
        assert!(table.insert(record(5, 0, 0, false)));
        assert!(table.insert(record(2, 0, 0, false)));
        assert!(table.insert(record(9, 0, 0, false)));
        assert!(!table.insert(record(2, 7, 0, false)));

        assert_eq!(table.ids(), vec![2, 5, 9]);
        assert_eq!(table.get(2).unwrap().heartbeat, 0);
    }

    #[test]
    fn test_admit_refreshes_known_peer() {
        let mut table = MembershipTable::new();
        assert!(table.admit(Address::new(3, 0), 1));
        table.get_mut(3).unwrap().failed = true;

        assert!(!table.admit(Address::new(3, 0), 8));

        let row = table.get(3).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(row.last_refresh, 8);
        assert!(!row.failed);
    }

    #[test]
    fn test_populate_skips_self_and_resets_local_state() {
        let mut table = MembershipTable::new();
        let incoming = vec![
            record(3, 4, 99, true),
            record(1, 2, 50, false),
            record(7, 0, 12, false),
        ];

        let added = table.populate_from_reply(&incoming, 7, 10);

        assert_eq!(added, vec![Address::new(3, 0), Address::new(1, 0)]);
        assert_eq!(table.ids(), vec![1, 3]);
        for row in table.iter() {
            assert_eq!(row.last_refresh, 10);
            assert!(!row.failed);
        }
        assert_eq!(table.get(3).unwrap().heartbeat, 4);
    }

    #[test]
    fn test_merge_tie_keeps_local_copy() {
        let mut table = MembershipTable::new();
        table.insert(record(4, 6, 2, true));

        let outcome = table.merge(&[record(4, 6, 30, false)], 1, 30);

        assert_eq!(outcome.updated, 0);
        let row = table.get(4).unwrap();
        assert_eq!(row.last_refresh, 2);
        assert!(row.failed);
    }

    #[test]
    fn test_merge_never_overwrites_self() {
        let mut table = MembershipTable::new();
        table.insert(record(1, 3, 5, false));

        let outcome = table.merge(&[record(1, 100, 0, false)], 1, 6);

        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(table.get(1).unwrap().heartbeat, 3);
    }

    #[test]
    fn test_merge_adopts_port_of_newer_record() {
        let mut table = MembershipTable::new();
        table.insert(record(4, 1, 0, false));

        let mut newer = record(4, 2, 0, false);
        newer.port = 8;
        table.merge(&[newer], 1, 3);

        assert_eq!(table.get(4).unwrap().address(), Address::new(4, 8));
    }
}
