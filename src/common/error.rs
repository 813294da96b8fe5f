use thiserror::Error;

use crate::{gossip::correlation::CorrelationKey, network::message::MsgId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot reply to {kind} without msg_id")]
    MissingMsgId { kind: &'static str },

    #[error("cannot reply to {kind} with msg_id {msg_id}: no successor id")]
    MsgIdOverflow { kind: &'static str, msg_id: MsgId },

    #[error("unexpected {kind} message for {workload} node")]
    Unexpected {
        kind: &'static str,
        workload: &'static str,
    },

    #[error("correlation key {0} is already registered")]
    DuplicateKey(CorrelationKey),

    #[error("outbound channel closed")]
    OutboundClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
