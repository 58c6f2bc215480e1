//! Round-Based Simulation Module
//!
//! Runs a whole group of `MembershipNode`s on one thread against a lossy
//! `SimulatedNetwork` and a shared `RoundClock`.
//!
//! ## Round Structure
//! 1. **Receive**: every running node drains its network mailbox.
//! 2. **Protocol**: nodes due to start are started (staggered join), every
//!    other running node handles its queue and ticks.
//! 3. **Faults**: at `failure_round`, one or half of the nodes crash.
//! 4. **Clock**: the round counter advances for everyone at once.
//!
//! Every random decision flows from one seed, so a run is reproducible.

pub mod report;
pub mod runner;

pub use report::{CrashRecord, SimulationReport};
pub use runner::Simulation;
