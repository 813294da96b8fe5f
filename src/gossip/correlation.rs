use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    common::error::{Error, Result},
    network::message::{Envelope, MsgId, NodeId},
};

/// Identifies one in-flight delivery: the peer it targets and the msg_id the
/// request carried. The peer's ack arrives with `src = peer` and
/// `in_reply_to = msg_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub peer: NodeId,
    pub msg_id: MsgId,
}

impl CorrelationKey {
    pub fn new(peer: NodeId, msg_id: MsgId) -> Self {
        CorrelationKey { peer, msg_id }
    }

    /// Key an acknowledgement resolves, if it is a reply at all.
    pub fn for_reply(reply: &Envelope) -> Option<Self> {
        reply
            .body
            .in_reply_to
            .map(|msg_id| CorrelationKey::new(reply.src.clone(), msg_id))
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.peer, self.msg_id)
    }
}

/// Pending-ack table shared between a node actor and its delivery tasks.
///
/// Each entry is a one-shot slot. `signal` removes the entry before
/// delivering into it, so a key resolves at most once and late or duplicate
/// acks find nothing.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    slots: Arc<Mutex<HashMap<CorrelationKey, oneshot::Sender<Envelope>>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        CorrelationTable::default()
    }

    pub fn register(&self, key: CorrelationKey) -> Result<ResponseSlot> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.slots.lock();
            if slots.contains_key(&key) {
                return Err(Error::DuplicateKey(key));
            }
            slots.insert(key.clone(), tx);
        }
        Ok(ResponseSlot {
            key,
            rx,
            table: self.clone(),
        })
    }

    /// Hands `value` to the slot under `key`. Returns false when nothing was
    /// waiting.
    pub fn signal(&self, key: &CorrelationKey, value: Envelope) -> bool {
        let waiting = self.slots.lock().remove(key);
        match waiting {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn deregister(&self, key: &CorrelationKey) -> bool {
        self.slots.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.slots.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[derive(Debug)]
pub enum SlotWait {
    Signaled(Envelope),
    TimedOut,
    /// The entry was removed without a value.
    Closed,
}

/// Receiving half of a registered key. Dropping it deregisters the key.
#[derive(Debug)]
pub struct ResponseSlot {
    key: CorrelationKey,
    rx: oneshot::Receiver<Envelope>,
    table: CorrelationTable,
}

impl ResponseSlot {
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    pub async fn wait(&mut self, timeout: Duration) -> SlotWait {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(envelope)) => SlotWait::Signaled(envelope),
            Ok(Err(_)) => SlotWait::Closed,
            Err(_) => SlotWait::TimedOut,
        }
    }
}

impl Drop for ResponseSlot {
    fn drop(&mut self) {
        self.table.deregister(&self.key);
    }
}
