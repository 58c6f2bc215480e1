use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use super::node::{MembershipNode, NodeSnapshot};
use super::types::{Address, MemberRecord};
use crate::config::ProtocolConfig;
use crate::environment::{ChannelNetwork, Clock, EventLog};
use crate::error::{MembershipError, Result};

/// A membership node running on tokio tasks.
///
/// The receive loop and the tick loop both go through the same mutex, so a
/// message handler and a tick never interleave on the table.
pub struct MembershipService {
    pub local_addr: Address,
    node: Arc<Mutex<MembershipNode>>,
    network: Arc<ChannelNetwork>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    tick_interval: Duration,
}

impl MembershipService {
    /// Registers the node on the network and runs the join handshake.
    pub async fn new(
        addr: Address,
        config: ProtocolConfig,
        network: Arc<ChannelNetwork>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventLog>,
        tick_interval: Duration,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        if network.is_registered(addr) {
            return Err(MembershipError::InitializationFailure(format!(
                "address {} is already taken",
                addr
            )));
        }

        let inbox = network.register(addr);
        let mut node = MembershipNode::new(addr, config, network.clone(), clock, events);

        if let Err(e) = node.start() {
            network.unregister(addr);
            return Err(e);
        }

        Ok(Arc::new(Self {
            local_addr: addr,
            node: Arc::new(Mutex::new(node)),
            network,
            inbox: Mutex::new(Some(inbox)),
            tick_interval,
        }))
    }

    /// Spawns the receive and tick loops. Calling it twice is a no-op.
    pub async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let Some(inbox) = self.inbox.lock().await.take() else {
            return Vec::new();
        };

        info!("Starting membership service for {}", self.local_addr);

        let receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop(inbox).await;
            })
        };

        let tick_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.tick_loop().await;
            })
        };

        vec![receive_handle, tick_handle]
    }

    async fn receive_loop(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Bytes>) {
        while let Some(first) = inbox.recv().await {
            let mut node = self.node.lock().await;
            if node.is_crashed() {
                break;
            }

            node.enqueue(first);
            while let Ok(more) = inbox.try_recv() {
                node.enqueue(more);
            }

            if let Err(e) = node.check_messages() {
                tracing::error!("{} halted on fatal error: {}", self.local_addr, e);
                node.crash();
                self.network.unregister(self.local_addr);
                break;
            }
        }

        tracing::debug!("Receive loop of {} stopped", self.local_addr);
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.tick_interval);

        loop {
            interval.tick().await;

            let mut node = self.node.lock().await;
            if node.is_crashed() {
                break;
            }

            if let Err(e) = node.tick() {
                tracing::error!("{} halted on fatal error: {}", self.local_addr, e);
                node.crash();
                self.network.unregister(self.local_addr);
                break;
            }
        }

        tracing::debug!("Tick loop of {} stopped", self.local_addr);
    }

    /// Stops the node abruptly, as if the process died.
    pub async fn crash(&self) {
        self.network.unregister(self.local_addr);
        self.node.lock().await.crash();
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        self.node.lock().await.snapshot()
    }

    pub async fn is_in_group(&self) -> bool {
        self.node.lock().await.is_in_group()
    }

    pub async fn get_alive_members(&self) -> Vec<MemberRecord> {
        self.node
            .lock()
            .await
            .table()
            .iter()
            .filter(|r| !r.failed)
            .copied()
            .collect()
    }

    pub async fn get_member(&self, id: u32) -> Option<MemberRecord> {
        self.node.lock().await.table().get(id).copied()
    }
}
