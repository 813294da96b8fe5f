use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::{
        mpsc::{Receiver, Sender},
        watch,
    },
    task::{JoinError, JoinSet},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use super::{
    broadcast::{deliver, DeliveryOutcome, DeliveryReport},
    correlation::{CorrelationKey, CorrelationTable},
    crdt::GSet,
    peers::Peers,
    retry::RetryPolicy,
    store::MessageLog,
};
use crate::{
    common::{
        config::{NodeConfig, Workload},
        error::{Error, Result},
    },
    network::message::{Body, Envelope, Item, MsgId, NodeId, Payload},
};

/*
    A node processor owns one node's state and is the only task that mutates
    it. Inbound envelopes, replication ticks and finished deliveries are all
    taken from one select loop, one at a time. Delivery tasks only share the
    correlation table and the outbound sender with it.
*/

pub struct NodeProcessor {
    pub state: NodeState,
    pub pending: CorrelationTable,
    pub policy: RetryPolicy,
    pub replicate_interval: Duration,
    pub msg_rx: Receiver<Envelope>,
    pub msg_tx: Sender<Envelope>,
    pub shutdown: watch::Receiver<()>,
    next_msg_id: MsgId,
    deliveries: JoinSet<DeliveryReport>,
}

pub struct NodeState {
    pub id: NodeId,
    /// Every other node named at init.
    pub cluster: Vec<NodeId>,
    /// Neighbors from the first topology message.
    pub peers: Option<Peers>,
    pub data: NodeData,
}

pub enum NodeData {
    Log(MessageLog),
    Set(GSet<Item>),
}

impl NodeState {
    pub fn new(id: NodeId, node_ids: Vec<NodeId>, workload: Workload) -> Self {
        let cluster = node_ids.into_iter().filter(|n| *n != id).collect();
        let data = match workload {
            Workload::Broadcast => NodeData::Log(MessageLog::new()),
            Workload::GSet => NodeData::Set(GSet::new()),
        };
        NodeState {
            id,
            cluster,
            peers: None,
            data,
        }
    }

    pub fn workload(&self) -> Workload {
        match self.data {
            NodeData::Log(_) => Workload::Broadcast,
            NodeData::Set(_) => Workload::GSet,
        }
    }

    /// Returns false if a topology was already applied.
    pub fn set_topology(&mut self, topology: &HashMap<NodeId, Vec<NodeId>>) -> bool {
        if self.peers.is_some() {
            return false;
        }
        self.peers = Some(Peers::from_topology(&self.id, topology));
        true
    }

    pub fn neighbors(&self) -> Vec<NodeId> {
        self.peers
            .as_ref()
            .map(|peers| peers.members.clone())
            .unwrap_or_default()
    }

    /// Anti-entropy targets: the topology if there is one, else the whole cluster.
    pub fn replication_targets(&self) -> Vec<NodeId> {
        match &self.peers {
            Some(peers) => peers.members.clone(),
            None => self.cluster.clone(),
        }
    }

    pub fn read(&self) -> Payload {
        match &self.data {
            NodeData::Log(log) => Payload::ReadOk {
                messages: Some(log.messages().to_vec()),
                value: None,
            },
            NodeData::Set(set) => Payload::ReadOk {
                messages: None,
                value: Some(set.to_vec()),
            },
        }
    }
}

impl NodeProcessor {
    pub fn new(
        id: NodeId,
        node_ids: Vec<NodeId>,
        config: &NodeConfig,
        msg_rx: Receiver<Envelope>,
        msg_tx: Sender<Envelope>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        NodeProcessor {
            state: NodeState::new(id, node_ids, config.workload),
            pending: CorrelationTable::new(),
            policy: config.retry.clone(),
            replicate_interval: config.replicate_interval,
            msg_rx,
            msg_tx,
            shutdown,
            next_msg_id: 0,
            deliveries: JoinSet::new(),
        }
    }

    pub async fn run(mut self) {
        let workload = self.state.workload();
        info!(node = %self.state.id, %workload, "node started");

        let replicating = workload == Workload::GSet;
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.replicate_interval,
            self.replicate_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.msg_rx.recv() => match message {
                    Some(envelope) => {
                        let kind = envelope.kind();
                        let src = envelope.src.clone();
                        if let Err(e) = self.handle(envelope).await {
                            warn!(node = %self.state.id, %src, kind, error = %e, "failed to handle message");
                        }
                    }
                    None => break,
                },
                _ = ticker.tick(), if replicating => {
                    if let Err(e) = self.replicate().await {
                        warn!(node = %self.state.id, error = %e, "replication failed");
                    }
                }
                Some(joined) = self.deliveries.join_next() => self.record_delivery(joined),
                _ = self.shutdown.changed() => break,
            }
        }

        self.deliveries.shutdown().await;
        info!(node = %self.state.id, "node stopped");
    }

    pub async fn handle(&mut self, envelope: Envelope) -> Result<()> {
        trace!(node = %self.state.id, src = %envelope.src, kind = envelope.kind(), "handling message");
        if envelope.body.payload == Payload::BroadcastOk {
            self.handle_ack(envelope);
            return Ok(());
        }
        match &envelope.body.payload {
            Payload::Echo { echo } => {
                let echo = echo.clone();
                self.reply(&envelope, Payload::EchoOk { echo }).await
            }
            Payload::Topology { topology } => {
                if self.state.set_topology(topology) {
                    debug!(node = %self.state.id, peers = ?self.state.neighbors(), "topology set");
                } else {
                    debug!(node = %self.state.id, "topology already fixed, ignoring");
                }
                self.reply(&envelope, Payload::TopologyOk).await
            }
            Payload::Read => {
                let payload = self.state.read();
                self.reply(&envelope, payload).await
            }
            Payload::Broadcast { message } => {
                let message = message.clone();
                self.handle_broadcast(&envelope, message).await
            }
            Payload::Add { element } => {
                let element = element.clone();
                self.handle_add(&envelope, element).await
            }
            Payload::Replicate { value } => {
                let value = value.clone();
                self.handle_replicate(&envelope, value)
            }
            _ => Err(self.unexpected(&envelope)),
        }
    }

    async fn handle_broadcast(&mut self, envelope: &Envelope, message: Item) -> Result<()> {
        if self.state.workload() != Workload::Broadcast {
            return Err(self.unexpected(envelope));
        }

        // Ack receipt even for duplicates: the sender may have lost our
        // earlier ack and will keep retransmitting until it gets one.
        if envelope.body.msg_id.is_some() {
            self.reply(envelope, Payload::BroadcastOk).await?;
        }

        let recorded = match &mut self.state.data {
            NodeData::Log(log) => log.record(message.clone()),
            NodeData::Set(_) => false,
        };
        if !recorded {
            trace!(node = %self.state.id, %message, "already seen");
            return Ok(());
        }

        let peers = self.state.neighbors();
        debug!(node = %self.state.id, %message, fanout = peers.len(), "new message");
        for peer in peers {
            self.spawn_delivery(peer, message.clone())?;
        }
        Ok(())
    }

    fn spawn_delivery(&mut self, peer: NodeId, message: Item) -> Result<()> {
        let msg_id = self.next_msg_id();
        let slot = self.pending.register(CorrelationKey::new(peer.clone(), msg_id))?;
        let envelope = Envelope::new(
            self.state.id.clone(),
            peer,
            Body::request(Payload::Broadcast { message }, msg_id),
        );
        self.deliveries.spawn(deliver(
            envelope,
            slot,
            self.policy.clone(),
            self.msg_tx.clone(),
            self.shutdown.clone(),
        ));
        Ok(())
    }

    fn handle_ack(&self, envelope: Envelope) {
        let Some(key) = CorrelationKey::for_reply(&envelope) else {
            debug!(node = %self.state.id, src = %envelope.src, "broadcast_ok without in_reply_to");
            return;
        };
        if !self.pending.signal(&key, envelope) {
            debug!(node = %self.state.id, %key, "late or unknown ack dropped");
        }
    }

    async fn handle_add(&mut self, envelope: &Envelope, element: Item) -> Result<()> {
        let NodeData::Set(set) = &mut self.state.data else {
            return Err(self.unexpected(envelope));
        };
        if set.add(element.clone()) {
            debug!(node = %self.state.id, %element, "element added");
        }
        self.reply(envelope, Payload::AddOk).await
    }

    fn handle_replicate(&mut self, envelope: &Envelope, value: Vec<Item>) -> Result<()> {
        let NodeData::Set(set) = &mut self.state.data else {
            return Err(self.unexpected(envelope));
        };
        let added = set.merge_elements(value);
        if added > 0 {
            debug!(node = %self.state.id, src = %envelope.src, added, "merged replica state");
        }
        Ok(())
    }

    async fn replicate(&self) -> Result<()> {
        let NodeData::Set(set) = &self.state.data else {
            return Ok(());
        };
        let value = set.to_vec();
        for peer in self.state.replication_targets() {
            let envelope = Envelope::new(
                self.state.id.clone(),
                peer,
                Body::notify(Payload::Replicate {
                    value: value.clone(),
                }),
            );
            self.send(envelope).await?;
        }
        Ok(())
    }

    fn record_delivery(&self, joined: std::result::Result<DeliveryReport, JoinError>) {
        match joined {
            Ok(report) => match report.outcome {
                DeliveryOutcome::Acked => {
                    trace!(node = %self.state.id, key = %report.key, attempts = report.attempts, "delivery acked")
                }
                DeliveryOutcome::Cancelled => {
                    debug!(node = %self.state.id, key = %report.key, attempts = report.attempts, "delivery cancelled")
                }
                DeliveryOutcome::Exhausted | DeliveryOutcome::Closed => {
                    warn!(node = %self.state.id, key = %report.key, attempts = report.attempts, outcome = ?report.outcome, "delivery abandoned")
                }
            },
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(node = %self.state.id, error = %e, "delivery task failed"),
        }
    }

    fn next_msg_id(&mut self) -> MsgId {
        self.next_msg_id += 1;
        self.next_msg_id
    }

    fn unexpected(&self, envelope: &Envelope) -> Error {
        Error::Unexpected {
            kind: envelope.kind(),
            workload: self.state.workload().as_str(),
        }
    }

    async fn reply(&self, request: &Envelope, payload: Payload) -> Result<()> {
        self.send(request.reply(payload)?).await
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.msg_tx
            .send(envelope)
            .await
            .map_err(|_| Error::OutboundClosed)
    }
}
