use std::collections::HashMap;

use tokio::sync::{
    mpsc::{self, Receiver, Sender},
    watch,
};
use tracing::{debug, info, trace, warn};

use super::{
    message::{Envelope, NodeId, Payload},
    node::Node,
};
use crate::{
    common::{
        config::NodeConfig,
        error::{Error, Result},
    },
    gossip::processor::NodeProcessor,
};

/// Routes inbound envelopes to node processors by destination and starts a
/// processor for every `init`. Nodes are never removed.
pub struct Dispatcher {
    config: NodeConfig,
    outbound: Sender<Envelope>,
    shutdown: watch::Receiver<()>,
    nodes: HashMap<NodeId, Node>,
}

impl Dispatcher {
    pub fn new(config: NodeConfig, outbound: Sender<Envelope>, shutdown: watch::Receiver<()>) -> Self {
        Dispatcher {
            config,
            outbound,
            shutdown,
            nodes: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut inbound: Receiver<Envelope>) {
        while let Some(envelope) = inbound.recv().await {
            let kind = envelope.kind();
            let dest = envelope.dest.clone();
            if let Err(e) = self.dispatch(envelope).await {
                warn!(%dest, kind, error = %e, "failed to dispatch message");
            }
        }
        info!(nodes = self.nodes.len(), "inbound closed, dispatcher stopping");
    }

    pub async fn dispatch(&mut self, envelope: Envelope) -> Result<()> {
        match &envelope.body.payload {
            Payload::Init { node_id, node_ids } => {
                let node_id = node_id.clone();
                let node_ids = node_ids.clone();
                self.init(&envelope, node_id, node_ids).await
            }
            _ => {
                self.route(envelope).await;
                Ok(())
            }
        }
    }

    /// Registers the node before acknowledging, so an `init` that cannot be
    /// answered still brings the node up.
    async fn init(&mut self, envelope: &Envelope, node_id: NodeId, node_ids: Vec<NodeId>) -> Result<()> {
        if self.nodes.contains_key(&node_id) {
            debug!(node = %node_id, "node already initialised, acknowledging again");
            return self.acknowledge(envelope).await;
        }

        let (inbox, msg_rx) = mpsc::channel(self.config.inbox_capacity);
        let processor = NodeProcessor::new(
            node_id.clone(),
            node_ids,
            &self.config,
            msg_rx,
            self.outbound.clone(),
            self.shutdown.clone(),
        );
        let task = tokio::spawn(processor.run());
        info!(node = %node_id, cluster = self.nodes.len() + 1, "node initialised");
        self.nodes.insert(
            node_id,
            Node {
                inbox,
                workload: self.config.workload,
                task,
            },
        );

        self.acknowledge(envelope).await
    }

    async fn acknowledge(&self, init: &Envelope) -> Result<()> {
        self.outbound
            .send(init.reply(Payload::InitOk)?)
            .await
            .map_err(|_| Error::OutboundClosed)
    }

    async fn route(&self, envelope: Envelope) {
        let Some(node) = self.nodes.get(&envelope.dest) else {
            trace!(dest = %envelope.dest, kind = envelope.kind(), "no such node, dropping");
            return;
        };
        if node.inbox.send(envelope).await.is_err() {
            warn!(workload = %node.workload, "node inbox closed, dropping");
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        common::config::Workload,
        network::message::{Body, Item, MsgId},
    };

    struct Harness {
        dispatcher: Dispatcher,
        outbound_rx: Receiver<Envelope>,
        _shutdown_tx: watch::Sender<()>,
    }

    fn harness(workload: Workload) -> Harness {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        Harness {
            dispatcher: Dispatcher::new(NodeConfig::new(workload), outbound_tx, shutdown_rx),
            outbound_rx,
            _shutdown_tx: shutdown_tx,
        }
    }

    fn to(dest: &str, src: &str, payload: Payload, msg_id: MsgId) -> Envelope {
        Envelope::new(NodeId::from(src), NodeId::from(dest), Body::request(payload, msg_id))
    }

    fn init(node_id: &str, node_ids: &[&str]) -> Envelope {
        to(
            node_id,
            "c0",
            Payload::Init {
                node_id: NodeId::from(node_id),
                node_ids: node_ids.iter().map(|n| NodeId::from(*n)).collect(),
            },
            1,
        )
    }

    #[tokio::test]
    async fn test_init_and_route() {
        let mut h = harness(Workload::Broadcast);

        h.dispatcher.dispatch(init("n1", &["n1", "n2"])).await.unwrap();
        let init_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(init_ok.src, NodeId::from("n1"));
        assert_eq!(init_ok.dest, NodeId::from("c0"));
        assert_eq!(init_ok.body.payload, Payload::InitOk);
        assert_eq!(init_ok.body.in_reply_to, Some(1));
        assert!(h.dispatcher.node(&NodeId::from("n1")).unwrap().is_running());

        h.dispatcher
            .dispatch(to("n1", "c1", Payload::Echo { echo: json!(17) }, 4))
            .await
            .unwrap();
        let echo_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(echo_ok.body.payload, Payload::EchoOk { echo: json!(17) });
        assert_eq!(echo_ok.body.in_reply_to, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_destination_is_dropped() {
        let mut h = harness(Workload::Broadcast);
        h.dispatcher.dispatch(init("n1", &["n1"])).await.unwrap();
        h.outbound_rx.recv().await.unwrap();

        h.dispatcher
            .dispatch(to("n9", "c1", Payload::Echo { echo: json!("lost") }, 2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(h.outbound_rx.try_recv().is_err());
        assert!(h.dispatcher.node(&NodeId::from("n9")).is_none());
    }

    #[tokio::test]
    async fn test_repeated_init_keeps_node() {
        let mut h = harness(Workload::GSet);
        h.dispatcher.dispatch(init("n1", &["n1", "n2"])).await.unwrap();
        h.outbound_rx.recv().await.unwrap();
        h.dispatcher
            .dispatch(to("n1", "c1", Payload::Add { element: Item::from(1) }, 2))
            .await
            .unwrap();
        h.outbound_rx.recv().await.unwrap();

        h.dispatcher.dispatch(init("n1", &["n1", "n2"])).await.unwrap();
        assert_eq!(h.outbound_rx.recv().await.unwrap().body.payload, Payload::InitOk);
        assert_eq!(h.dispatcher.nodes.len(), 1);

        h.dispatcher.dispatch(to("n1", "c1", Payload::Read, 3)).await.unwrap();
        let read_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(
            read_ok.body.payload,
            Payload::ReadOk {
                messages: None,
                value: Some(vec![Item::from(1)]),
            }
        );
    }

    #[tokio::test]
    async fn test_init_without_msg_id_still_starts_node() {
        let mut h = harness(Workload::Broadcast);
        let init = Envelope::new(
            NodeId::from("c0"),
            NodeId::from("n1"),
            Body::notify(Payload::Init {
                node_id: NodeId::from("n1"),
                node_ids: vec![NodeId::from("n1")],
            }),
        );

        let result = h.dispatcher.dispatch(init).await;
        assert!(matches!(result, Err(Error::MissingMsgId { kind: "init" })));
        assert!(h.dispatcher.node(&NodeId::from("n1")).unwrap().is_running());

        h.dispatcher
            .dispatch(to("n1", "c1", Payload::Echo { echo: json!("up") }, 2))
            .await
            .unwrap();
        let echo_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(echo_ok.body.payload, Payload::EchoOk { echo: json!("up") });
        assert_eq!(echo_ok.body.in_reply_to, Some(2));
    }

    #[tokio::test]
    async fn test_init_with_last_msg_id_still_starts_node() {
        let mut h = harness(Workload::GSet);
        let init = to(
            "n1",
            "c0",
            Payload::Init {
                node_id: NodeId::from("n1"),
                node_ids: vec![NodeId::from("n1")],
            },
            MsgId::MAX,
        );

        let result = h.dispatcher.dispatch(init).await;
        assert!(matches!(result, Err(Error::MsgIdOverflow { kind: "init", .. })));

        h.dispatcher.dispatch(to("n1", "c1", Payload::Read, 3)).await.unwrap();
        let read_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(read_ok.body.in_reply_to, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_retries_until_acked() {
        let mut h = harness(Workload::Broadcast);

        h.dispatcher.dispatch(init("n1", &["n1", "n2"])).await.unwrap();
        h.outbound_rx.recv().await.unwrap();

        let topology = HashMap::from([(NodeId::from("n1"), vec![NodeId::from("n2")])]);
        h.dispatcher
            .dispatch(to("n1", "c1", Payload::Topology { topology }, 2))
            .await
            .unwrap();
        let topology_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(topology_ok.body.payload, Payload::TopologyOk);

        h.dispatcher
            .dispatch(to("n1", "c1", Payload::Broadcast { message: Item::from(42) }, 1))
            .await
            .unwrap();
        let broadcast_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(broadcast_ok.dest, NodeId::from("c1"));
        assert_eq!(broadcast_ok.body.payload, Payload::BroadcastOk);
        assert_eq!(broadcast_ok.body.in_reply_to, Some(1));

        // n2 never sees the first attempt; the retransmission is identical.
        let first = h.outbound_rx.recv().await.unwrap();
        assert_eq!(first.dest, NodeId::from("n2"));
        let second = h.outbound_rx.recv().await.unwrap();
        assert_eq!(second, first);

        h.dispatcher
            .dispatch(second.reply(Payload::BroadcastOk).unwrap())
            .await
            .unwrap();

        h.dispatcher.dispatch(to("n1", "c1", Payload::Read, 3)).await.unwrap();
        let read_ok = h.outbound_rx.recv().await.unwrap();
        assert_eq!(
            read_ok.body.payload,
            Payload::ReadOk {
                messages: Some(vec![Item::from(42)]),
                value: None,
            }
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_inbound_closes() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(100);
        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        let (inbound_tx, inbound_rx) = mpsc::channel(100);
        let dispatcher = Dispatcher::new(NodeConfig::new(Workload::Broadcast), outbound_tx, shutdown_rx);
        let task = tokio::spawn(dispatcher.run(inbound_rx));

        inbound_tx.send(init("n1", &["n1"])).await.unwrap();
        assert_eq!(outbound_rx.recv().await.unwrap().body.payload, Payload::InitOk);
        drop(inbound_tx);
        task.await.unwrap();

        // Dropping the dispatcher closes every inbox, so the outbound side drains.
        assert!(outbound_rx.recv().await.is_none());
    }
}
