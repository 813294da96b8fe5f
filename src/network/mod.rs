pub mod dispatcher;
pub mod message;
pub mod node;
pub mod transport;

/*
    The transport is one JSON envelope per line on stdin/stdout and is
    unreliable: messages between nodes may be dropped or duplicated, and
    nothing is assumed about delivery order. Several nodes may share one
    process, so inbound envelopes are routed by their dest field to the node
    registered under that id.
*/

pub use dispatcher::*;
pub use message::*;
pub use node::*;
