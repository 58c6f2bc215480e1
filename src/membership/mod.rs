//! Membership & Failure Detection Module
//!
//! Gossip-style group membership: every node keeps its own view of the group,
//! detects dead peers by heartbeat timeout and spreads changes by pushing its
//! whole table to random peers.
//!
//! ## Core Mechanisms
//! - **Join Handshake**: a new node sends JOIN_REQUEST to the well-known
//!   introducer and is populated from its JOIN_REPLY.
//! - **Heartbeats**: each node bumps its own counter once per round; the
//!   counter doubles as a per-node logical clock.
//! - **Failure Detection**: peers silent for `t_fail` rounds are suspected,
//!   for `t_remove` rounds are removed.
//! - **Anti-Entropy**: received tables are merged last-writer-wins on the
//!   heartbeat, without resurrecting records the sender considers failed.

pub mod codec;
pub mod detector;
pub mod gossip;
pub mod node;
pub mod service;
pub mod table;
pub mod types;
