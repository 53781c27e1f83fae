//! Cinder node entry point
//!
//! Wires the archive, chain, UTXO set, mempool, miner, gossip node,
//! and HTTP façade together, then serves until SIGINT or SIGTERM.

use cinder::api::{create_router, ApiState};
use cinder::core::{Blockchain, UtxoSet};
use cinder::mining::{Mempool, Miner, ProofOfWork};
use cinder::network::Node;
use cinder::storage::{BlockArchive, SledArchive};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "cinder", version, about = "An educational proof-of-work blockchain node")]
struct Cli {
    /// API server port
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    api_port: u16,

    /// P2P network port
    #[arg(long = "port", env = "P2P_PORT", default_value_t = 6000)]
    port: u16,

    /// Database directory path
    #[arg(long, env = "DB_PATH", default_value = "./data")]
    db_path: PathBuf,

    /// Comma-separated list of bootstrap peers
    #[arg(long, env = "BOOTSTRAP_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Enable automatic mining
    #[arg(long, env = "ENABLE_MINING")]
    mining: bool,

    /// Address to receive mining rewards
    #[arg(long, env = "MINER_ADDRESS", default_value = "")]
    miner_address: String,

    /// Mining difficulty (leading zero hex characters)
    #[arg(long, env = "DIFFICULTY", default_value_t = 4)]
    difficulty: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("initializing blockchain node...");

    let archive: Arc<dyn BlockArchive> = Arc::new(SledArchive::open(&cli.db_path)?);
    info!("database initialized at {}", cli.db_path.display());

    let mut utxo_set = UtxoSet::new();
    let mut blockchain = Blockchain::new(Arc::clone(&archive));
    blockchain.initialize(&mut utxo_set)?;
    info!("blockchain initialized (height: {})", blockchain.height());
    info!("utxo set rebuilt ({} outputs)", utxo_set.len());

    let chain = Arc::new(RwLock::new(blockchain));
    let utxos = Arc::new(RwLock::new(utxo_set));
    let mempool = Arc::new(RwLock::new(Mempool::new()));
    let pow = Arc::new(ProofOfWork::new(cli.difficulty, Duration::from_secs(10)));
    info!("proof-of-work consensus initialized (difficulty: {})", pow.difficulty());

    let miner = Arc::new(Miner::new(
        Arc::clone(&chain),
        Arc::clone(&utxos),
        Arc::clone(&mempool),
        Arc::clone(&pow),
    ));

    let node = Arc::new(Node::new(
        cli.port,
        Arc::clone(&chain),
        Arc::clone(&utxos),
        Arc::clone(&mempool),
        Arc::clone(&pow),
    ));
    node.connect_bootstrap(&cli.peers).await;
    let p2p_port = Arc::clone(&node).start().await?;
    info!("p2p node started on port {p2p_port}");

    let mut miner_task = None;
    if cli.mining {
        if cli.miner_address.is_empty() {
            warn!("mining enabled but no miner address specified");
        } else {
            info!("miner initialized (reward address: {})", cli.miner_address);
            miner_task = Some(Arc::clone(&miner).start(&cli.miner_address, Arc::clone(&node)));
        }
    }

    let state = ApiState {
        chain,
        utxos,
        mempool,
        miner: Arc::clone(&miner),
        node: Arc::clone(&node),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.api_port)).await?;
    info!("api server listening on port {}", cli.api_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down node...");
    miner.stop();
    if let Some(task) = miner_task {
        task.abort();
    }
    node.stop().await;
    archive.close()?;
    info!("node stopped successfully");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
