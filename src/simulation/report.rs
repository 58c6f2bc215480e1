use crate::environment::{EventKind, MembershipEvent, TrafficStats};
use crate::membership::node::NodeSnapshot;
use crate::membership::types::{Address, Timestamp};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CrashRecord {
    pub address: Address,
    pub round: Timestamp,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub rounds: Timestamp,
    pub nodes: Vec<NodeSnapshot>,
    pub crashes: Vec<CrashRecord>,
    /// Node-added decisions about peers (self-registration excluded)
    pub joins: usize,
    pub removals: usize,
    /// Removals whose subject never crashed
    pub false_removals: usize,
    pub traffic: TrafficStats,
    /// Every running node's table holds exactly the running nodes
    pub converged: bool,
    pub problems: Vec<String>,
    pub events: Vec<MembershipEvent>,
}

impl SimulationReport {
    pub fn build(
        seed: u64,
        rounds: Timestamp,
        nodes: Vec<NodeSnapshot>,
        crashes: Vec<CrashRecord>,
        events: Vec<MembershipEvent>,
        traffic: TrafficStats,
    ) -> Self {
        let crashed: BTreeSet<u32> = crashes.iter().map(|c| c.address.id).collect();

        let joins = events
            .iter()
            .filter(|e| e.kind == EventKind::Added && e.observer != e.subject)
            .count();
        let removals = events
            .iter()
            .filter(|e| e.kind == EventKind::Removed)
            .count();
        let false_removals = events
            .iter()
            .filter(|e| e.kind == EventKind::Removed && !crashed.contains(&e.subject.id))
            .count();

        let problems = Self::check_views(&nodes);

        Self {
            seed,
            rounds,
            nodes,
            crashes,
            joins,
            removals,
            false_removals,
            traffic,
            converged: problems.is_empty(),
            problems,
            events,
        }
    }

    /// Compares each running node's view against the set of running nodes.
    fn check_views(nodes: &[NodeSnapshot]) -> Vec<String> {
        let running: Vec<&NodeSnapshot> = nodes.iter().filter(|n| !n.crashed).collect();
        let expected: BTreeSet<u32> = running.iter().map(|n| n.address.id).collect();
        let mut problems = Vec::new();

        for node in &running {
            if !node.in_group {
                problems.push(format!("{} never joined the group", node.address));
                continue;
            }

            let view: BTreeSet<u32> = node.members.iter().map(|r| r.id).collect();
            let missing: Vec<u32> = expected.difference(&view).copied().collect();
            let stale: Vec<u32> = view.difference(&expected).copied().collect();

            if !missing.is_empty() {
                problems.push(format!("{} is missing {:?}", node.address, missing));
            }
            if !stale.is_empty() {
                problems.push(format!("{} still lists crashed {:?}", node.address, stale));
            }
        }

        problems
    }

    /// Removal events `observer` emitted about `subject`.
    pub fn removals_of(&self, observer: Address, subject: Address) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Removed && e.observer == observer && e.subject == subject)
            .count()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "seed:           {}", self.seed)?;
        writeln!(f, "rounds:         {}", self.rounds)?;
        writeln!(f, "nodes:          {}", self.nodes.len())?;
        for crash in &self.crashes {
            writeln!(f, "crashed:        {} at round {}", crash.address, crash.round)?;
        }
        writeln!(f, "joins:          {}", self.joins)?;
        writeln!(
            f,
            "removals:       {} ({} of running nodes)",
            self.removals, self.false_removals
        )?;
        writeln!(
            f,
            "messages:       {} sent, {} received, {} dropped",
            self.traffic.sent, self.traffic.received, self.traffic.dropped
        )?;
        write!(
            f,
            "converged:      {}",
            if self.converged { "yes" } else { "no" }
        )?;
        for problem in &self.problems {
            write!(f, "\n  - {}", problem)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::types::MemberRecord;

    fn snapshot(id: u32, crashed: bool, members: &[u32]) -> NodeSnapshot {
        NodeSnapshot {
            address: Address::new(id, 0),
            in_group: true,
            crashed,
            heartbeat: 1,
            members: members
                .iter()
                .map(|m| MemberRecord::fresh(Address::new(*m, 0), 0, 0))
                .collect(),
        }
    }

    #[test]
    fn test_converged_views() {
        let nodes = vec![
            snapshot(1, false, &[1, 2]),
            snapshot(2, false, &[1, 2]),
            snapshot(3, true, &[1, 2, 3]),
        ];
        let report = SimulationReport::build(1, 10, nodes, vec![], vec![], TrafficStats::default());

        assert!(report.converged, "{:?}", report.problems);
    }

    #[test]
    fn test_missing_and_stale_entries_are_reported() {
        let nodes = vec![
            snapshot(1, false, &[1, 3]),
            snapshot(2, false, &[1, 2]),
            snapshot(3, true, &[3]),
        ];
        let report = SimulationReport::build(1, 10, nodes, vec![], vec![], TrafficStats::default());

        assert!(!report.converged);
        assert_eq!(report.problems.len(), 2);
        assert!(report.problems[0].contains("missing [2]"));
        assert!(report.problems[1].contains("crashed [3]"));
    }

    #[test]
    fn test_event_counters() {
        let a = Address::new(1, 0);
        let b = Address::new(2, 0);
        let c = Address::new(3, 0);
        let event = |observer, subject, kind| MembershipEvent {
            at: 0,
            observer,
            subject,
            kind,
        };
        let events = vec![
            event(a, a, EventKind::Added),
            event(a, b, EventKind::Added),
            event(a, c, EventKind::Added),
            event(a, c, EventKind::Removed),
            event(a, b, EventKind::Removed),
        ];
        let crashes = vec![CrashRecord { address: c, round: 5 }];

        let report = SimulationReport::build(1, 10, vec![], crashes, events, TrafficStats::default());

        assert_eq!(report.joins, 2);
        assert_eq!(report.removals, 2);
        assert_eq!(report.false_removals, 1);
        assert_eq!(report.removals_of(a, c), 1);
    }
}
