use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::common::error::{Error, Result};

/*
    An envelope is the unit exchanged over the transport: one JSON object per
    line, {"src", "dest", "body"}. The body is tagged by "type" and may carry
    a sender-assigned "msg_id" and an "in_reply_to" echoing the msg_id of the
    request it answers. A reply swaps src/dest, takes msg_id + 1 of the
    request as its own msg_id and the request's msg_id as in_reply_to.
*/

pub type MsgId = u64;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// An opaque application value (a broadcast message or a set element).
///
/// Identity is the compact JSON encoding, so `1` and `1.0` are distinct items
/// while objects compare equal regardless of key order.
#[derive(Clone)]
pub struct Item {
    value: Value,
    canonical: String,
}

impl Item {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        let canonical = value.to_string();
        Item { value, canonical }
    }
}

impl From<i64> for Item {
    fn from(n: i64) -> Self {
        Item::from(Value::from(n))
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Item::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,
    Echo {
        echo: Value,
    },
    EchoOk {
        echo: Value,
    },
    Topology {
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
    TopologyOk,
    Read,
    ReadOk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        messages: Option<Vec<Item>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Vec<Item>>,
    },
    Broadcast {
        message: Item,
    },
    BroadcastOk,
    Add {
        element: Item,
    },
    AddOk,
    Replicate {
        value: Vec<Item>,
    },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Echo { .. } => "echo",
            Payload::EchoOk { .. } => "echo_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
            Payload::Read => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::Add { .. } => "add",
            Payload::AddOk => "add_ok",
            Payload::Replicate { .. } => "replicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<MsgId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MsgId>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Body {
    /// A body that expects no reply.
    pub fn notify(payload: Payload) -> Self {
        Body {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }

    pub fn request(payload: Payload, msg_id: MsgId) -> Self {
        Body {
            msg_id: Some(msg_id),
            in_reply_to: None,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

impl Envelope {
    pub fn new(src: NodeId, dest: NodeId, body: Body) -> Self {
        Envelope { src, dest, body }
    }

    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(Error::Decode)
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Encode)
    }

    pub fn kind(&self) -> &'static str {
        self.body.payload.kind()
    }

    /// Builds the response to this envelope.
    pub fn reply(&self, payload: Payload) -> Result<Envelope> {
        let kind = self.kind();
        let msg_id = self.body.msg_id.ok_or(Error::MissingMsgId { kind })?;
        let next = msg_id
            .checked_add(1)
            .ok_or(Error::MsgIdOverflow { kind, msg_id })?;
        Ok(Envelope {
            src: self.dest.clone(),
            dest: self.src.clone(),
            body: Body {
                msg_id: Some(next),
                in_reply_to: Some(msg_id),
                payload,
            },
        })
    }
}
