use tokio::sync::{mpsc::Sender, watch};
use tracing::{debug, trace};

use super::{
    correlation::{CorrelationKey, ResponseSlot, SlotWait},
    retry::RetryPolicy,
};
use crate::network::message::Envelope;

/*
    Reliable delivery of one broadcast to one peer. The envelope is sent, then
    the task waits on the slot registered for (peer, msg_id). Every time the
    wait expires the identical envelope is sent again, so an ack for any
    earlier attempt still resolves the same key. The task ends when the ack
    arrives, when the policy's attempt cap is hit, on node shutdown, or when
    the outbound channel is gone. The slot is deregistered on every exit path
    because it is dropped with the task.
*/

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeliveryOutcome {
    Acked,
    Exhausted,
    Cancelled,
    Closed,
}

#[derive(Clone, Debug)]
pub struct DeliveryReport {
    pub key: CorrelationKey,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

pub async fn deliver(
    envelope: Envelope,
    mut slot: ResponseSlot,
    policy: RetryPolicy,
    outbound: Sender<Envelope>,
    mut shutdown: watch::Receiver<()>,
) -> DeliveryReport {
    let key = slot.key().clone();
    let mut attempts: u32 = 0;
    let mut wait = policy.interval;

    let outcome = loop {
        if outbound.send(envelope.clone()).await.is_err() {
            break DeliveryOutcome::Closed;
        }
        attempts += 1;
        trace!(peer = %key.peer, msg_id = key.msg_id, attempts, "sent broadcast");

        tokio::select! {
            result = slot.wait(policy.spread(wait)) => match result {
                SlotWait::Signaled(_) => break DeliveryOutcome::Acked,
                SlotWait::Closed => break DeliveryOutcome::Cancelled,
                SlotWait::TimedOut => {}
            },
            _ = shutdown.changed() => break DeliveryOutcome::Cancelled,
        }

        if policy.exhausted(attempts) {
            break DeliveryOutcome::Exhausted;
        }
        wait = policy.next_interval(wait);
        debug!(peer = %key.peer, msg_id = key.msg_id, attempts, "no ack, retransmitting");
    };

    DeliveryReport {
        key,
        attempts,
        outcome,
    }
}
