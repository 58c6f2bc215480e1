//! Live Cluster Module
//!
//! Runs a whole group of `MembershipService`s inside one process, wired
//! together by a `ChannelNetwork` and sharing one `IntervalClock`.
//!
//! The introducer is launched first so that every other node finds its
//! inbox registered when it sends JOIN_REQUEST.

use crate::config::LiveConfig;
use crate::environment::{ChannelNetwork, Clock, EventLog, IntervalClock, TracingEventLog};
use crate::error::{MembershipError, Result};
use crate::membership::node::NodeSnapshot;
use crate::membership::service::MembershipService;
use crate::membership::types::Address;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct LiveCluster {
    config: LiveConfig,
    network: Arc<ChannelNetwork>,
    services: Vec<Arc<MembershipService>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl LiveCluster {
    /// Launches `config.nodes` services logging their decisions via tracing.
    pub async fn launch(config: LiveConfig) -> Result<Arc<Self>> {
        Self::launch_with_events(config, Arc::new(TracingEventLog)).await
    }

    pub async fn launch_with_events(
        config: LiveConfig,
        events: Arc<dyn EventLog>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let introducer = config.protocol.introducer;
        if introducer.port != 0 || introducer.id == 0 || introducer.id as usize > config.nodes {
            return Err(MembershipError::InvalidConfig(format!(
                "introducer {} is not one of the {} live nodes",
                introducer, config.nodes
            )));
        }

        let network = Arc::new(ChannelNetwork::new());
        let clock: Arc<dyn Clock> = Arc::new(IntervalClock::new(config.tick_interval()));

        let mut order: Vec<Address> = (1..=config.nodes as u32)
            .map(|id| Address::new(id, 0))
            .filter(|addr| *addr != introducer)
            .collect();
        order.insert(0, introducer);

        let mut services = Vec::with_capacity(order.len());
        for addr in order {
            let service = MembershipService::new(
                addr,
                config.protocol.clone(),
                network.clone(),
                clock.clone(),
                events.clone(),
                config.tick_interval(),
            )
            .await?;
            services.push(service);
        }

        let mut handles = Vec::new();
        for service in &services {
            handles.extend(service.clone().start().await);
        }

        tracing::info!(
            "Live cluster of {} nodes running (tick {:?})",
            services.len(),
            config.tick_interval()
        );

        Ok(Arc::new(Self {
            config,
            network,
            services,
            handles: Mutex::new(handles),
        }))
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn services(&self) -> &[Arc<MembershipService>] {
        &self.services
    }

    pub fn service(&self, id: u32) -> Option<&Arc<MembershipService>> {
        self.services.iter().find(|s| s.local_addr.id == id)
    }

    /// Crashes node `id`. Returns false if no such node exists.
    pub async fn crash(&self, id: u32) -> bool {
        match self.service(id) {
            Some(service) => {
                tracing::warn!("Crashing node {}", service.local_addr);
                service.crash().await;
                true
            }
            None => false,
        }
    }

    /// Snapshots of every node, ordered by id.
    pub async fn snapshots(&self) -> Vec<NodeSnapshot> {
        let mut snapshots = Vec::with_capacity(self.services.len());
        for service in &self.services {
            snapshots.push(service.snapshot().await);
        }
        snapshots.sort_by_key(|s| s.address);
        snapshots
    }

    pub async fn snapshot(&self, id: u32) -> Option<NodeSnapshot> {
        match self.service(id) {
            Some(service) => Some(service.snapshot().await),
            None => None,
        }
    }

    /// Number of nodes still reachable on the network.
    pub fn running(&self) -> usize {
        self.services
            .iter()
            .filter(|s| self.network.is_registered(s.local_addr))
            .count()
    }

    /// Logs every running node's view of the group once per `period`.
    pub fn spawn_stats_reporter(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cluster = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                tracing::info!("Cluster stats: {} running nodes", cluster.running());
                for snapshot in cluster.snapshots().await {
                    if snapshot.crashed {
                        continue;
                    }
                    let suspected = snapshot.members.iter().filter(|r| r.failed).count();
                    tracing::info!(
                        "  - {} hb={} members={} suspected={}",
                        snapshot.address,
                        snapshot.heartbeat,
                        snapshot.members.len(),
                        suspected
                    );
                }
            }
        })
    }

    /// Stops every node loop.
    pub fn shutdown(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        for service in &self.services {
            self.network.unregister(service.local_addr);
        }
        tracing::info!("Live cluster stopped");
    }
}
