use clap::Parser;
use log::{error, info, warn};
use server::config::{Args, ServerConfig};
use server::dispatch::Dispatcher;
use server::network::Server;
use server::persistence::{restore_active, FileSessionRepository, PersistOp, PersistenceWorker};
use server::session::SessionStore;
use shared::MapTopology;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Loads configuration and the board, restores saved sessions, then runs
/// the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::from(Args::parse());

    let map = match &config.map_path {
        Some(path) => {
            info!("Loading map from {}", path.display());
            MapTopology::from_json_file(path)?
        }
        None => MapTopology::classic(),
    };
    info!(
        "Map ready: {} territories, min reinforcement {}",
        map.territory_count(),
        config.rules.min_reinforcement
    );

    let repo = FileSessionRepository::new(&config.data_dir)?;
    let mut store = SessionStore::new(Arc::new(map), config.rules.clone());
    restore_active(&repo, &mut store, shared::get_timestamp());

    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(PersistenceWorker::new(repo, persist_rx).run());

    let mut server = Server::new(&config, Dispatcher::new(store), persist_tx.clone()).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server loop failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    // Flush-on-shutdown: wait until queued writes have reached disk.
    let (ack_tx, ack_rx) = oneshot::channel();
    if persist_tx.send(PersistOp::Flush(ack_tx)).is_ok() {
        match tokio::time::timeout(Duration::from_secs(5), ack_rx).await {
            Ok(_) => info!("Pending session writes flushed"),
            Err(_) => warn!("Timed out waiting for session writes to flush"),
        }
    }
    drop(persist_tx);
    drop(server);
    let _ = worker.await;

    Ok(())
}
