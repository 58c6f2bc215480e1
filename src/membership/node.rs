//! Protocol Engine
//!
//! `MembershipNode` is the single owner of one node's membership table. It is
//! driven from two places, which must never run concurrently on the same
//! node (the simulation calls them in sequence, the live service serializes
//! them behind one lock):
//!
//! - **Message path** (`enqueue` + `check_messages`): drains every queued
//!   buffer and dispatches JOIN_REQUEST, JOIN_REPLY and UPDATE.
//! - **Tick path** (`tick`): failure detection, then gossip.
//!
//! Recoverable errors (malformed/unknown messages, failed sends) are logged
//! and dropped. Fatal ones are returned to the driver, which must stop.

use super::codec;
use super::detector::{self, AgingOutcome};
use super::gossip;
use super::table::MembershipTable;
use super::types::{Address, MemberRecord, Message, MessageKind, Timestamp};
use crate::config::ProtocolConfig;
use crate::environment::{Clock, EventLog, Transport};
use crate::error::{MembershipError, Result};

use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Address nobody may use.
pub const NULL_ADDRESS: Address = Address::new(0, 0);

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub heartbeat: u64,
    pub suspected: Vec<Address>,
    pub removed: Vec<Address>,
    pub gossiped_to: Vec<Address>,
}

/// Read-only view of a node, used by reports and the status API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub address: Address,
    pub in_group: bool,
    pub crashed: bool,
    pub heartbeat: u64,
    pub members: Vec<MemberRecord>,
}

pub struct MembershipNode {
    addr: Address,
    config: ProtocolConfig,
    table: MembershipTable,
    heartbeat: u64,
    inited: bool,
    in_group: bool,
    crashed: bool,
    inbound: VecDeque<Bytes>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventLog>,
    rng: StdRng,
}

impl MembershipNode {
    pub fn new(
        addr: Address,
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            addr,
            config,
            table: MembershipTable::new(),
            heartbeat: 0,
            inited: false,
            in_group: false,
            crashed: false,
            inbound: VecDeque::new(),
            transport,
            clock,
            events,
            rng: StdRng::from_entropy(),
        }
    }

    /// Makes gossip target selection reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    pub fn is_inited(&self) -> bool {
        self.inited
    }

    pub fn is_in_group(&self) -> bool {
        self.in_group
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    pub fn is_introducer(&self) -> bool {
        self.addr == self.config.introducer
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            address: self.addr,
            in_group: self.in_group,
            crashed: self.crashed,
            heartbeat: self.heartbeat,
            members: self.table.records().to_vec(),
        }
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ============================================================
    // BOOTSTRAP
    // ============================================================

    /// Initializes the node and introduces it to the group.
    ///
    /// The introducer forms the group on its own; every other node sends a
    /// JOIN_REQUEST and stays outside the group until the reply arrives.
    pub fn start(&mut self) -> Result<()> {
        self.init_self()?;

        if self.is_introducer() {
            info!("{} starting up group", self.addr);
            self.in_group = true;
            return Ok(());
        }

        let introducer = self.config.introducer;
        let request = codec::encode(MessageKind::JoinRequest, self.addr, &[]);
        self.transport
            .send(self.addr, introducer, request)
            .map_err(|e| MembershipError::BootstrapFailure {
                introducer,
                reason: e.to_string(),
            })?;

        info!("{} trying to join via {}", self.addr, introducer);
        Ok(())
    }

    fn init_self(&mut self) -> Result<()> {
        if self.inited {
            return Err(MembershipError::InitializationFailure(format!(
                "node {} is already initialized",
                self.addr
            )));
        }
        if self.addr == NULL_ADDRESS {
            return Err(MembershipError::InitializationFailure(
                "node has no address".into(),
            ));
        }

        let now = self.now();
        self.heartbeat = 0;
        self.in_group = false;
        self.table = MembershipTable::new();
        self.table
            .insert(MemberRecord::fresh(self.addr, self.heartbeat, now));
        self.events.node_added(self.addr, self.addr);
        self.inited = true;

        Ok(())
    }

    /// Simulates a crash: the node stops receiving, ticking and sending.
    pub fn crash(&mut self) {
        warn!("{} crashed", self.addr);
        self.crashed = true;
        self.inbound.clear();
    }

    /// Final dump of the table at shutdown.
    pub fn finish(&self) -> NodeSnapshot {
        for record in self.table.iter() {
            debug!(
                "[{}] id {} hb {} ts {} failed {}",
                self.addr, record.id, record.heartbeat, record.last_refresh, record.failed
            );
        }
        self.snapshot()
    }

    // ============================================================
    // MESSAGE PATH
    // ============================================================

    /// Queues a complete message buffer for the next `check_messages`.
    pub fn enqueue(&mut self, buffer: Bytes) {
        if !self.crashed {
            self.inbound.push_back(buffer);
        }
    }

    /// Handles every queued message. Returns how many were processed.
    pub fn check_messages(&mut self) -> Result<usize> {
        let mut processed = 0;

        while let Some(buffer) = self.inbound.pop_front() {
            processed += 1;
            if let Err(e) = self.handle_bytes(&buffer) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("{} discarded message: {}", self.addr, e);
            }
        }

        Ok(processed)
    }

    pub fn handle_bytes(&mut self, buffer: &[u8]) -> Result<()> {
        let message = codec::decode(buffer)?;
        self.handle_message(message)
    }

    pub fn handle_message(&mut self, message: Message) -> Result<()> {
        if self.crashed {
            return Ok(());
        }
        if !self.inited {
            debug!(
                "{} dropped {:?} from {}: not started",
                self.addr, message.kind, message.sender
            );
            return Ok(());
        }

        debug!(
            "{} received {:?} from {} ({} records)",
            self.addr,
            message.kind,
            message.sender,
            message.records.len()
        );

        match message.kind {
            MessageKind::JoinRequest => self.handle_join_request(message.sender),
            MessageKind::JoinReply => {
                self.handle_join_reply(&message.records);
                Ok(())
            }
            MessageKind::Update => {
                self.handle_update(message.sender, &message.records);
                Ok(())
            }
        }
    }

    /// Introducer side of the join handshake.
    fn handle_join_request(&mut self, requester: Address) -> Result<()> {
        if !self.is_introducer() {
            warn!(
                "{} ignoring join request from {}: not the introducer",
                self.addr, requester
            );
            return Ok(());
        }
        if requester == self.addr {
            return Ok(());
        }

        let now = self.now();
        if self.table.admit(requester, now) {
            info!("{} admitted {}", self.addr, requester);
            self.events.node_added(self.addr, requester);
        } else {
            debug!("{} re-admitted known node {}", self.addr, requester);
        }

        self.send_table(MessageKind::JoinReply, requester)
    }

    /// Requester side: first population of the table from the introducer.
    fn handle_join_reply(&mut self, records: &[MemberRecord]) {
        let now = self.now();
        let added = self.table.populate_from_reply(records, self.addr.id, now);

        for peer in &added {
            self.events.node_added(self.addr, *peer);
        }

        if !self.in_group {
            info!(
                "{} joined the group with {} peers",
                self.addr,
                added.len()
            );
        }
        self.in_group = true;
    }

    /// Anti-entropy merge of a peer's pushed table.
    fn handle_update(&mut self, sender: Address, records: &[MemberRecord]) {
        let now = self.now();

        // direct contact proves liveness regardless of heartbeats
        self.table.touch(sender.id, now);

        let outcome = self.table.merge(records, self.addr.id, now);
        for peer in &outcome.added {
            info!("{} learned about {} from {}", self.addr, peer, sender);
            self.events.node_added(self.addr, *peer);
        }

        trace!(
            "{} merged table from {}: {} updated, {} added",
            self.addr,
            sender,
            outcome.updated,
            outcome.added.len()
        );
    }

    // ============================================================
    // TICK PATH
    // ============================================================

    /// One protocol round: receive, then (once in the group) tick.
    pub fn node_loop(&mut self) -> Result<Option<TickOutcome>> {
        if self.crashed {
            return Ok(None);
        }

        self.check_messages()?;

        if !self.in_group {
            return Ok(None);
        }

        self.tick().map(Some)
    }

    /// Failure detection followed by gossip. No-op outside the group.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.crashed || !self.in_group {
            return Ok(TickOutcome::default());
        }

        let now = self.now();

        let next = self.heartbeat + 1;
        detector::refresh_self(&mut self.table, self.addr.id, next, now)?;
        self.heartbeat = next;

        let AgingOutcome { suspected, removed } =
            detector::age_peers(&mut self.table, self.addr.id, now, &self.config);

        for peer in &suspected {
            debug!("{} suspects {}", self.addr, peer);
        }
        for peer in &removed {
            info!("{} removed {}", self.addr, peer);
            self.events.node_removed(self.addr, *peer);
        }

        let gossiped_to = self.gossip();

        Ok(TickOutcome {
            heartbeat: self.heartbeat,
            suspected,
            removed,
            gossiped_to,
        })
    }

    fn gossip(&mut self) -> Vec<Address> {
        let targets = gossip::select_targets(
            &self.table,
            self.addr.id,
            self.config.gossip_fanout,
            self.config.gossip_max_draws,
            &mut self.rng,
        );

        if targets.is_empty() {
            trace!("{} found no gossip target this round", self.addr);
            return targets;
        }

        let update = codec::encode(MessageKind::Update, self.addr, self.table.records());
        for target in &targets {
            if let Err(e) = self.transport.send(self.addr, *target, update.clone()) {
                warn!("{} failed to gossip to {}: {}", self.addr, target, e);
            }
        }

        targets
    }

    fn send_table(&self, kind: MessageKind, to: Address) -> Result<()> {
        let payload = codec::encode(kind, self.addr, self.table.records());
        self.transport.send(self.addr, to, payload)
    }
}
