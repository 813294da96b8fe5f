//! Nodes for a simulated gossip cluster speaking line-delimited JSON over
//! stdio: reliable broadcast with per-peer acknowledgement, and a grow-only
//! set replicated by anti-entropy.

pub mod common;
pub mod gossip;
pub mod network;
