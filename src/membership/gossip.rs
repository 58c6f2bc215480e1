//! Gossip Target Selection
//!
//! Second phase of every tick: the full table is pushed to a small random
//! fanout instead of every known peer, which bounds per-round bandwidth while
//! still reaching the whole group in O(log N) rounds in expectation.
//!
//! Each fanout slot gets at most `max_draws` uniform draws over the table. A
//! draw that lands on ourselves, a failed record, or a peer already picked
//! this round is discarded. A slot whose draws are exhausted sends nothing.

use super::table::MembershipTable;
use super::types::Address;
use rand::Rng;

pub fn select_targets<R: Rng + ?Sized>(
    table: &MembershipTable,
    self_id: u32,
    fanout: usize,
    max_draws: usize,
    rng: &mut R,
) -> Vec<Address> {
    let mut targets: Vec<Address> = Vec::with_capacity(fanout);

    if table.len() < 2 {
        return targets;
    }

    for _ in 0..fanout {
        for _ in 0..max_draws {
            let Some(candidate) = table.nth(rng.gen_range(0..table.len())) else {
                break;
            };

            let usable = candidate.id != self_id
                && !candidate.failed
                && !targets.iter().any(|t| t.id == candidate.id);

            if usable {
                targets.push(candidate.address());
                break;
            }
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::types::MemberRecord;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table(rows: &[(u32, bool)]) -> MembershipTable {
        let mut table = MembershipTable::new();
        for (id, failed) in rows {
            let mut record = MemberRecord::fresh(Address::new(*id, 0), 0, 0);
            record.failed = *failed;
            table.insert(record);
        }
        table
    }

    #[test]
    fn test_alone_means_no_gossip() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_targets(&table(&[(1, false)]), 1, 3, 5, &mut rng).is_empty());
    }

    #[test]
    fn test_never_targets_self_or_failed() {
        let table = table(&[(1, false), (2, true), (3, false), (4, true), (5, false)]);

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            for target in select_targets(&table, 1, 2, 5, &mut rng) {
                assert!(target.id == 3 || target.id == 5, "picked {}", target);
            }
        }
    }

    #[test]
    fn test_all_failed_gives_up() {
        let table = table(&[(1, false), (2, true), (3, true)]);
        let mut rng = StdRng::seed_from_u64(3);

        assert!(select_targets(&table, 1, 4, 5, &mut rng).is_empty());
    }

    #[test]
    fn test_targets_are_distinct_and_bounded() {
        let rows: Vec<(u32, bool)> = (1..=20).map(|id| (id, false)).collect();
        let table = table(&rows);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let targets = select_targets(&table, 1, 3, 5, &mut rng);

            assert!(targets.len() <= 3);
            let mut ids: Vec<u32> = targets.iter().map(|t| t.id).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), targets.len());
        }
    }

    #[test]
    fn test_reaches_every_live_peer_eventually() {
        let table = table(&[(1, false), (2, false), (3, false), (4, false)]);
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..100 {
            for target in select_targets(&table, 1, 1, 5, &mut rng) {
                seen.insert(target.id);
            }
        }

        assert_eq!(seen.len(), 3);
    }
}
