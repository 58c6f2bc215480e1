use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical time, measured in protocol rounds.
pub type Timestamp = u64;

/// Identity of a process in the group: a node id plus the port it listens on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub id: u32,
    pub port: u16,
}

impl Address {
    pub const fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

/// One row of a membership table.
///
/// `heartbeat` is owned by the subject node and only ever grows; every other
/// node holds a replicated copy. `last_refresh` and `failed` are local soft
/// state: they travel on the wire but are recomputed by the receiver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: u32,
    pub port: u16,
    pub heartbeat: u64,
    pub last_refresh: Timestamp,
    pub failed: bool,
}

impl MemberRecord {
    /// A record for a peer we just heard of.
    pub fn fresh(addr: Address, heartbeat: u64, now: Timestamp) -> Self {
        Self {
            id: addr.id,
            port: addr.port,
            heartbeat,
            last_refresh: now,
            failed: false,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.id, self.port)
    }

    /// Rounds elapsed since this record was last refreshed.
    pub fn age(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.last_refresh)
    }
}

/// The three message kinds exchanged by the protocol.
///
/// The discriminants are the on-wire header values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    JoinRequest = 0,
    JoinReply = 1,
    Update = 2,
}

impl MessageKind {
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(MessageKind::JoinRequest),
            1 => Some(MessageKind::JoinReply),
            2 => Some(MessageKind::Update),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u32 {
        self as u32
    }

    /// Whether this kind carries the sender's membership table.
    pub fn carries_table(self) -> bool {
        !matches!(self, MessageKind::JoinRequest)
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub sender: Address,
    pub records: Vec<MemberRecord>,
}
