//! DU operator entry point.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;

use du_operator::config::Config;
use du_operator::host::HostFeed;
use du_operator::operator::DuOperator;
use du_operator::relation::RelationBoard;
use du_operator::workload::DockerWorkload;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting DU operator with config: {:?}", cfg);

    // Relation data shared between the host feed and the operator
    let board = RelationBoard::new();

    // Hook channel
    let (hook_tx, hook_rx) = mpsc::channel(128);

    // Host feed (stdin)
    let feed = HostFeed::new(board.clone(), cfg.app_name.clone(), cfg.relation_name.clone());
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = feed.run(BufReader::new(tokio::io::stdin()), hook_tx).await {
            error!("Host feed failed: {}", e);
        }
    });

    // Operator
    let workload = DockerWorkload::new(
        cfg.container_name.clone(),
        cfg.config_dir.clone(),
        Duration::from_secs(cfg.restart_timeout_secs),
    );
    let store = Arc::new(board.store_for(&cfg.app_name));
    let operator = DuOperator::new(cfg, store, workload);
    let mut operator_handle = tokio::spawn(operator.run(hook_rx));

    // Graceful Shutdown
    tokio::select! {
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
        res = &mut operator_handle => match res {
            Ok(Ok(())) => info!("Operator finished"),
            Ok(Err(e)) => {
                error!("Operator stopped: {}", e);
                feed_handle.abort();
                return Err(e.into());
            }
            Err(e) => error!("Operator task panicked: {}", e),
        },
    }

    // Abort tasks
    feed_handle.abort();
    operator_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
