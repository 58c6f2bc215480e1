//! Protocol, simulation and live-runtime configuration

use crate::error::{MembershipError, Result};
use crate::membership::types::Address;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Tunables of the membership protocol itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Rounds without a refresh before a peer is marked failed
    pub t_fail: u64,

    /// Rounds without a refresh before a peer is removed (must exceed `t_fail`)
    pub t_remove: u64,

    /// Gossip targets per round
    pub gossip_fanout: usize,

    /// Random draws allowed per gossip target before giving up for the round
    pub gossip_max_draws: usize,

    /// Well-known bootstrap address every node contacts to join
    pub introducer: Address,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            t_fail: 5,
            t_remove: 20,
            gossip_fanout: 2,
            gossip_max_draws: 5,
            introducer: Address::new(1, 0),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.t_fail == 0 {
            return Err(MembershipError::InvalidConfig(
                "t_fail must be at least one round".into(),
            ));
        }
        if self.t_fail >= self.t_remove {
            return Err(MembershipError::InvalidConfig(format!(
                "t_fail ({}) must be smaller than t_remove ({})",
                self.t_fail, self.t_remove
            )));
        }
        if self.gossip_fanout == 0 {
            return Err(MembershipError::InvalidConfig(
                "gossip_fanout must be at least 1".into(),
            ));
        }
        if self.gossip_max_draws == 0 {
            return Err(MembershipError::InvalidConfig(
                "gossip_max_draws must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Which nodes the simulation crashes at `failure_round`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    None,
    /// One randomly chosen non-introducer node
    #[default]
    Single,
    /// Half of the nodes, chosen at random
    Multi,
}

/// Round-based simulation of a whole group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Group size; node ids are `1..=nodes`, all on port 0
    pub nodes: usize,

    /// How many nodes start per round (staggered join)
    pub nodes_per_round: usize,

    pub total_rounds: u64,

    pub failure: FailureMode,

    pub failure_round: u64,

    /// Probability that a message is lost while inside `drop_window`
    pub drop_probability: f64,

    /// Rounds `[start, end)` during which messages may be dropped
    pub drop_window: (u64, u64),

    /// Seed for every random decision; `None` draws one from entropy
    pub seed: Option<u64>,

    pub protocol: ProtocolConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            nodes_per_round: 4,
            total_rounds: 700,
            failure: FailureMode::Single,
            failure_round: 100,
            drop_probability: 0.0,
            drop_window: (50, 300),
            seed: None,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Loads a JSON configuration file; absent fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.protocol.validate()?;

        if self.nodes == 0 {
            return Err(MembershipError::InvalidConfig(
                "simulation needs at least one node".into(),
            ));
        }
        if self.nodes > u32::MAX as usize {
            return Err(MembershipError::InvalidConfig(format!(
                "{} nodes exceed the id space",
                self.nodes
            )));
        }
        if self.nodes_per_round == 0 {
            return Err(MembershipError::InvalidConfig(
                "nodes_per_round must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(MembershipError::InvalidConfig(format!(
                "drop_probability {} is not within [0, 1]",
                self.drop_probability
            )));
        }
        if self.drop_window.0 > self.drop_window.1 {
            return Err(MembershipError::InvalidConfig(format!(
                "drop window [{}, {}) is inverted",
                self.drop_window.0, self.drop_window.1
            )));
        }
        Ok(())
    }

    /// Round at which node index `idx` (0-based) starts.
    pub fn start_round(&self, idx: usize) -> u64 {
        (idx / self.nodes_per_round) as u64
    }
}

/// In-process cluster driven by tokio timers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub nodes: usize,
    pub tick_interval_ms: u64,
    /// Stop after this many seconds; `None` runs until Ctrl+C
    pub run_for_secs: Option<u64>,
    pub http_addr: SocketAddr,
    pub protocol: ProtocolConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            tick_interval_ms: 200,
            run_for_secs: None,
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl LiveConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.protocol.validate()?;
        if self.nodes == 0 {
            return Err(MembershipError::InvalidConfig(
                "live cluster needs at least one node".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(MembershipError::InvalidConfig(
                "tick interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ProtocolConfig::default().validate().is_ok());
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(LiveConfig::default().validate().is_ok());
    }

    #[test]
    fn test_fail_must_precede_remove() {
        let config = ProtocolConfig {
            t_fail: 20,
            t_remove: 20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MembershipError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_gossip_needs_a_target() {
        let config = ProtocolConfig {
            gossip_fanout: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MembershipError::InvalidConfig(_))
        ));

        let simulation = SimulationConfig {
            protocol: config,
            ..Default::default()
        };
        assert!(simulation.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"nodes": 3, "failure": "multi", "protocol": {"t_fail": 3}}"#)
                .unwrap();

        assert_eq!(config.nodes, 3);
        assert_eq!(config.failure, FailureMode::Multi);
        assert_eq!(config.protocol.t_fail, 3);
        assert_eq!(config.protocol.t_remove, 20);
        assert_eq!(config.total_rounds, 700);
    }

    #[test]
    fn test_staggered_start() {
        let config = SimulationConfig {
            nodes_per_round: 4,
            ..Default::default()
        };
        assert_eq!(config.start_round(0), 0);
        assert_eq!(config.start_round(3), 0);
        assert_eq!(config.start_round(4), 1);
        assert_eq!(config.start_round(9), 2);
    }

    #[test]
    fn test_drop_probability_bounds() {
        let config = SimulationConfig {
            drop_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
