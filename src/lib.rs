//! Gossip Membership Library
//!
//! Group membership and failure detection for a set of peers that talk over
//! an unreliable datagram network. Every node keeps a table of the peers it
//! believes alive, bumps its own heartbeat each round and pushes its table to
//! random peers; silent peers are suspected, then removed.
//!
//! ## Architecture Modules
//!
//! - **`membership`**: the protocol itself. Table, wire codec, failure
//!   detector, gossip target selection and the per-node engine, plus a tokio
//!   service wrapping the engine.
//! - **`environment`**: the clock, event log and transport the protocol is
//!   injected with, in simulated and live flavours.
//! - **`simulation`**: deterministic round-based runs of a whole group with
//!   staggered joins, crashes and message loss.
//! - **`cluster`**: an in-process live group of services on tokio timers.
//! - **`status`**: HTTP endpoints exposing a live cluster's views.
//! - **`config`** / **`error`**: shared configuration and error types.

pub mod cluster;
pub mod config;
pub mod environment;
pub mod error;
pub mod membership;
pub mod simulation;
pub mod status;
