use std::{fmt, time::Duration};

use clap::{Parser, ValueEnum};

use super::error::{Error, Result};
use crate::gossip::retry::RetryPolicy;

/// Which application a node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    /// Reliable broadcast with per-peer acknowledgement.
    Broadcast,
    /// Grow-only set replicated by periodic anti-entropy.
    GSet,
}

impl Workload {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workload::Broadcast => "broadcast",
            Workload::GSet => "g-set",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Gossip cluster node speaking line-delimited JSON on stdio", long_about = None)]
pub struct Config {
    /// Application served by every node in this process
    #[arg(long, env = "GOSSIP_WORKLOAD", value_enum, default_value_t = Workload::Broadcast)]
    pub workload: Workload,

    /// Wait before the first retransmission of an unacknowledged broadcast
    #[arg(long, env = "GOSSIP_RETRY_INTERVAL_MS", default_value_t = 1000)]
    pub retry_interval_ms: u64,

    /// Multiplier applied to the retry interval after every attempt
    #[arg(long, env = "GOSSIP_RETRY_BACKOFF", default_value_t = 1.0)]
    pub retry_backoff: f64,

    /// Upper bound for the retry interval once backoff applies
    #[arg(long, env = "GOSSIP_RETRY_MAX_INTERVAL_MS", default_value_t = 30_000)]
    pub retry_max_interval_ms: u64,

    /// Give up on a peer after this many attempts (unbounded if unset)
    #[arg(long, env = "GOSSIP_RETRY_MAX_ATTEMPTS")]
    pub retry_max_attempts: Option<u32>,

    /// Random spread added to each wait, as a fraction of the interval
    #[arg(long, env = "GOSSIP_RETRY_JITTER", default_value_t = 0.0)]
    pub retry_jitter: f64,

    /// Period of the g-set anti-entropy broadcast
    #[arg(long, env = "GOSSIP_REPLICATE_INTERVAL_MS", default_value_t = 5000)]
    pub replicate_interval_ms: u64,

    /// Capacity of every inbox and of the outbound queue
    #[arg(long, env = "GOSSIP_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// Default tracing directive, overridden by RUST_LOG
    #[arg(long, env = "GOSSIP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Runtime settings handed to every node actor.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub workload: Workload,
    pub retry: RetryPolicy,
    pub replicate_interval: Duration,
    pub inbox_capacity: usize,
}

impl Config {
    pub fn node_config(&self) -> Result<NodeConfig> {
        if self.retry_interval_ms == 0 {
            return Err(Error::Config("retry interval must be positive".into()));
        }
        if self.retry_max_interval_ms < self.retry_interval_ms {
            return Err(Error::Config(
                "retry max interval is shorter than the retry interval".into(),
            ));
        }
        if !self.retry_backoff.is_finite() || self.retry_backoff < 1.0 {
            return Err(Error::Config(format!(
                "retry backoff must be at least 1.0, got {}",
                self.retry_backoff
            )));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(Error::Config(format!(
                "retry jitter must be within [0, 1], got {}",
                self.retry_jitter
            )));
        }
        if self.replicate_interval_ms == 0 {
            return Err(Error::Config("replicate interval must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel capacity must be positive".into()));
        }

        Ok(NodeConfig {
            workload: self.workload,
            retry: RetryPolicy {
                interval: Duration::from_millis(self.retry_interval_ms),
                backoff: self.retry_backoff,
                max_interval: Duration::from_millis(self.retry_max_interval_ms),
                max_attempts: self.retry_max_attempts,
                jitter: self.retry_jitter,
            },
            replicate_interval: Duration::from_millis(self.replicate_interval_ms),
            inbox_capacity: self.channel_capacity,
        })
    }
}

impl NodeConfig {
    pub fn new(workload: Workload) -> Self {
        NodeConfig {
            workload,
            retry: RetryPolicy::default(),
            replicate_interval: Duration::from_secs(5),
            inbox_capacity: 1024,
        }
    }
}
