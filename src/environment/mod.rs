//! Protocol Collaborators
//!
//! The membership core only talks to its surroundings through three narrow
//! contracts, each defined here with the implementations the crate ships:
//!
//! - **`clock`**: `Clock::now()` in rounds. `RoundClock` is advanced once per
//!   simulated round; `IntervalClock` quantizes wall time into ticks.
//! - **`events`**: `EventLog` receives one call per membership add/remove
//!   decision. `TracingEventLog` emits structured logs, `RecordingEventLog`
//!   keeps them for reports and assertions.
//! - **`network`**: best-effort `Transport::send`. `SimulatedNetwork` is a
//!   lossy in-memory mailbox for round-driven runs, `ChannelNetwork` routes
//!   over tokio channels for the live service.

pub mod clock;
pub mod events;
pub mod network;

pub use clock::{Clock, IntervalClock, RoundClock};
pub use events::{EventKind, EventLog, MembershipEvent, RecordingEventLog, TracingEventLog};
pub use network::{ChannelNetwork, SimulatedNetwork, TrafficStats, Transport};
