use super::report::{CrashRecord, SimulationReport};
use crate::config::{FailureMode, SimulationConfig};
use crate::environment::{Clock, RecordingEventLog, RoundClock, SimulatedNetwork};
use crate::error::{MembershipError, Result};
use crate::membership::node::{MembershipNode, NodeSnapshot};
use crate::membership::types::Address;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

pub struct Simulation {
    config: SimulationConfig,
    seed: u64,
    network: Arc<SimulatedNetwork>,
    clock: Arc<RoundClock>,
    events: Arc<RecordingEventLog>,
    nodes: Vec<MembershipNode>,
    started: Vec<bool>,
    crashes: Vec<CrashRecord>,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let introducer = config.protocol.introducer;
        if introducer.port != 0 || introducer.id == 0 || introducer.id as usize > config.nodes {
            return Err(MembershipError::InvalidConfig(format!(
                "introducer {} is not one of the {} simulated nodes",
                introducer, config.nodes
            )));
        }

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);

        let network = Arc::new(SimulatedNetwork::new(config.drop_probability, rng.r#gen()));
        let clock = Arc::new(RoundClock::new());
        let events = Arc::new(RecordingEventLog::new(clock.clone()).with_tracing());

        let nodes = (1..=config.nodes as u32)
            .map(|id| {
                MembershipNode::new(
                    Address::new(id, 0),
                    config.protocol.clone(),
                    network.clone(),
                    clock.clone(),
                    events.clone(),
                )
                .with_seed(rng.r#gen())
            })
            .collect();

        tracing::info!(
            "Simulating {} nodes for {} rounds (seed {})",
            config.nodes,
            config.total_rounds,
            seed
        );

        Ok(Self {
            started: vec![false; config.nodes],
            config,
            seed,
            network,
            clock,
            events,
            nodes,
            crashes: Vec::new(),
            rng,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn round(&self) -> u64 {
        self.clock.now()
    }

    pub fn nodes(&self) -> &[MembershipNode] {
        &self.nodes
    }

    pub fn node(&self, id: u32) -> Option<&MembershipNode> {
        self.nodes.get((id as usize).checked_sub(1)?)
    }

    pub fn started_count(&self) -> usize {
        self.started.iter().filter(|s| **s).count()
    }

    pub fn events(&self) -> &RecordingEventLog {
        &self.events
    }

    /// Runs every remaining round and builds the report.
    pub fn run(&mut self) -> Result<SimulationReport> {
        while self.clock.now() < self.config.total_rounds {
            self.step()?;
        }

        let snapshots = self.nodes.iter().map(|n| n.finish()).collect();
        Ok(self.build_report(snapshots))
    }

    /// Plays one round. A fatal node error aborts the simulation.
    pub fn step(&mut self) -> Result<()> {
        let now = self.clock.now();
        let (drop_start, drop_end) = self.config.drop_window;
        self.network
            .set_dropping(drop_start <= now && now < drop_end);

        for (idx, node) in self.nodes.iter_mut().enumerate() {
            if self.started[idx] && !node.is_crashed() {
                for buffer in self.network.recv(node.address()) {
                    node.enqueue(buffer);
                }
            }
        }

        for (idx, node) in self.nodes.iter_mut().enumerate() {
            if !self.started[idx] {
                if self.config.start_round(idx) <= now {
                    node.start()?;
                    self.started[idx] = true;
                }
                continue;
            }

            if let Err(e) = node.node_loop() {
                tracing::error!("{} halted the simulation at round {}: {}", node.address(), now, e);
                return Err(e);
            }
        }

        if now == self.config.failure_round {
            self.inject_failures(now);
        }

        self.clock.advance();
        Ok(())
    }

    fn inject_failures(&mut self, now: u64) {
        let introducer = self.config.protocol.introducer;
        let mut candidates: Vec<usize> = (0..self.nodes.len())
            .filter(|&idx| self.started[idx] && !self.nodes[idx].is_crashed())
            .filter(|&idx| self.nodes[idx].address() != introducer)
            .collect();

        let count = match self.config.failure {
            FailureMode::None => 0,
            FailureMode::Single => 1,
            FailureMode::Multi => self.nodes.len() / 2,
        }
        .min(candidates.len());

        candidates.shuffle(&mut self.rng);
        for &idx in candidates.iter().take(count) {
            let node = &mut self.nodes[idx];
            node.crash();
            self.network.mark_crashed(node.address());
            self.crashes.push(CrashRecord {
                address: node.address(),
                round: now,
            });
            tracing::info!("Node {} failed at round {}", node.address(), now);
        }
    }

    /// Report on the current state, without the final table dump.
    pub fn report(&self) -> SimulationReport {
        self.build_report(self.nodes.iter().map(|n| n.snapshot()).collect())
    }

    fn build_report(&self, snapshots: Vec<NodeSnapshot>) -> SimulationReport {
        SimulationReport::build(
            self.seed,
            self.clock.now(),
            snapshots,
            self.crashes.clone(),
            self.events.events(),
            self.network.total_stats(),
        )
    }
}
