use crate::error::{MembershipError, Result};
use crate::membership::types::Address;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc;

/// Best-effort datagram delivery between nodes.
///
/// `Ok(())` only means the message was handed to the network; it may still
/// be lost. An error means the send could not even be attempted.
pub trait Transport: Send + Sync {
    fn send(&self, from: Address, to: Address, payload: Bytes) -> Result<()>;
}

/// Per-address message counters.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TrafficStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

/// Default upper bound on messages buffered across all mailboxes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 30_000;

struct NetworkState {
    mailboxes: HashMap<Address, VecDeque<Bytes>>,
    stats: HashMap<Address, TrafficStats>,
    crashed: HashSet<Address>,
    buffered: usize,
    dropping: bool,
    rng: StdRng,
}

/// Lossy in-memory network for round-driven simulations.
///
/// Each address owns a mailbox; `recv` drains it. While dropping is switched
/// on, every send is lost with `drop_probability`.
pub struct SimulatedNetwork {
    state: Mutex<NetworkState>,
    drop_probability: f64,
    capacity: usize,
}

impl SimulatedNetwork {
    pub fn new(drop_probability: f64, seed: u64) -> Self {
        Self {
            state: Mutex::new(NetworkState {
                mailboxes: HashMap::new(),
                stats: HashMap::new(),
                crashed: HashSet::new(),
                buffered: 0,
                dropping: false,
                rng: StdRng::seed_from_u64(seed),
            }),
            drop_probability,
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn set_dropping(&self, dropping: bool) {
        self.state.lock().dropping = dropping;
    }

    /// Stops all delivery to and from `addr` and discards its mailbox.
    pub fn mark_crashed(&self, addr: Address) {
        let mut state = self.state.lock();
        if let Some(mailbox) = state.mailboxes.remove(&addr) {
            state.buffered -= mailbox.len();
        }
        state.crashed.insert(addr);
    }

    /// Takes every message currently waiting for `addr`.
    pub fn recv(&self, addr: Address) -> Vec<Bytes> {
        let mut state = self.state.lock();
        let drained: Vec<Bytes> = match state.mailboxes.get_mut(&addr) {
            Some(mailbox) => mailbox.drain(..).collect(),
            None => return Vec::new(),
        };
        state.buffered -= drained.len();
        state.stats.entry(addr).or_default().received += drained.len() as u64;
        drained
    }

    pub fn stats(&self, addr: Address) -> TrafficStats {
        self.state.lock().stats.get(&addr).copied().unwrap_or_default()
    }

    pub fn total_stats(&self) -> TrafficStats {
        self.state
            .lock()
            .stats
            .values()
            .fold(TrafficStats::default(), |acc, s| TrafficStats {
                sent: acc.sent + s.sent,
                received: acc.received + s.received,
                dropped: acc.dropped + s.dropped,
            })
    }
}

impl Transport for SimulatedNetwork {
    fn send(&self, from: Address, to: Address, payload: Bytes) -> Result<()> {
        let mut state = self.state.lock();

        if state.buffered >= self.capacity {
            return Err(MembershipError::Transport(format!(
                "network buffer full ({} messages)",
                self.capacity
            )));
        }

        state.stats.entry(from).or_default().sent += 1;

        if state.crashed.contains(&from) || state.crashed.contains(&to) {
            return Ok(());
        }

        if state.dropping && self.drop_probability > 0.0 {
            let p = self.drop_probability;
            if state.rng.gen_bool(p) {
                state.stats.entry(from).or_default().dropped += 1;
                tracing::trace!("Dropped message {} -> {}", from, to);
                return Ok(());
            }
        }

        state.mailboxes.entry(to).or_default().push_back(payload);
        state.buffered += 1;
        Ok(())
    }
}

/// Routes messages over unbounded tokio channels, one per registered node.
#[derive(Default)]
pub struct ChannelNetwork {
    routes: DashMap<Address, mpsc::UnboundedSender<Bytes>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the inbox for `addr`, replacing any previous registration.
    pub fn register(&self, addr: Address) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(addr, tx);
        rx
    }

    pub fn unregister(&self, addr: Address) {
        self.routes.remove(&addr);
    }

    pub fn is_registered(&self, addr: Address) -> bool {
        self.routes.contains_key(&addr)
    }
}

impl Transport for ChannelNetwork {
    fn send(&self, from: Address, to: Address, payload: Bytes) -> Result<()> {
        let route = self
            .routes
            .get(&to)
            .ok_or_else(|| MembershipError::Transport(format!("no route from {} to {}", from, to)))?;

        route
            .send(payload)
            .map_err(|_| MembershipError::Transport(format!("inbox of {} is closed", to)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: u32) -> Address {
        Address::new(id, 0)
    }

    #[test]
    fn test_simulated_delivery_and_stats() {
        let net = SimulatedNetwork::new(0.0, 7);
        net.send(addr(1), addr(2), Bytes::from_static(b"a")).unwrap();
        net.send(addr(1), addr(2), Bytes::from_static(b"b")).unwrap();

        let inbox = net.recv(addr(2));
        assert_eq!(inbox, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert!(net.recv(addr(2)).is_empty());

        assert_eq!(net.stats(addr(1)).sent, 2);
        assert_eq!(net.stats(addr(2)).received, 2);
    }

    #[test]
    fn test_drops_only_while_enabled() {
        let net = SimulatedNetwork::new(1.0, 7);
        net.send(addr(1), addr(2), Bytes::from_static(b"kept")).unwrap();

        net.set_dropping(true);
        net.send(addr(1), addr(2), Bytes::from_static(b"lost")).unwrap();

        assert_eq!(net.recv(addr(2)).len(), 1);
        assert_eq!(net.stats(addr(1)).dropped, 1);
    }

    #[test]
    fn test_crashed_nodes_are_isolated() {
        let net = SimulatedNetwork::new(0.0, 7);
        net.send(addr(1), addr(3), Bytes::from_static(b"x")).unwrap();
        net.mark_crashed(addr(3));

        net.send(addr(1), addr(3), Bytes::from_static(b"y")).unwrap();
        net.send(addr(3), addr(1), Bytes::from_static(b"z")).unwrap();

        assert!(net.recv(addr(3)).is_empty());
        assert!(net.recv(addr(1)).is_empty());
    }

    #[test]
    fn test_full_buffer_rejects_send() {
        let net = SimulatedNetwork::new(0.0, 7).with_capacity(1);
        net.send(addr(1), addr(2), Bytes::from_static(b"a")).unwrap();

        let err = net.send(addr(1), addr(2), Bytes::from_static(b"b")).unwrap_err();
        assert!(matches!(err, MembershipError::Transport(_)));

        net.recv(addr(2));
        assert!(net.send(addr(1), addr(2), Bytes::from_static(b"c")).is_ok());
    }

    #[tokio::test]
    async fn test_channel_network_routes_to_registered_inbox() {
        let net = ChannelNetwork::new();
        let mut inbox = net.register(addr(2));

        net.send(addr(1), addr(2), Bytes::from_static(b"hello")).unwrap();
        assert_eq!(inbox.recv().await.unwrap(), Bytes::from_static(b"hello"));

        let err = net.send(addr(1), addr(9), Bytes::new()).unwrap_err();
        assert!(matches!(err, MembershipError::Transport(_)));

        net.unregister(addr(2));
        assert!(!net.is_registered(addr(2)));
    }
}
