/*
    A gossip node for a simulated cluster. Envelopes arrive one JSON object
    per line on stdin and leave the same way on stdout; diagnostics go to
    stderr. Every `init` starts a node processor. In the broadcast workload a
    node acknowledges each broadcast on receipt and then delivers it to each
    of its topology neighbors, retransmitting until that neighbor
    acknowledges. In the g-set workload a node keeps a grow-only set and
    periodically sends its full state to its peers, so replicas converge
    without acknowledgements.
*/

use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use gossip_node::{
    common::{config::Config, error::Result, logging},
    network::{dispatcher::Dispatcher, transport},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::init(&config.log_level);

    let node_config = config.node_config()?;
    info!(workload = %node_config.workload, retry = ?node_config.retry, "starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (outbound, writer) = transport::spawn_writer(tokio::io::stdout(), config.channel_capacity);
    let (inbound, _reader) = transport::spawn_reader(tokio::io::stdin(), config.channel_capacity);

    let dispatcher = Dispatcher::new(node_config, outbound, shutdown_rx);
    tokio::select! {
        _ = dispatcher.run(inbound) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(Duration::from_secs(1), writer).await {
        Ok(Ok(Err(e))) => error!(error = %e, "writer failed"),
        Ok(Err(e)) => error!(error = %e, "writer task panicked"),
        _ => {}
    }
    info!("stopped");
    Ok(())
}
