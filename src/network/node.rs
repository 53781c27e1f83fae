//! Gossip node
//!
//! Listens for newline-delimited JSON frames from peers, validates and
//! applies what arrives, and floods accepted messages onward. A
//! bounded cache of recently-seen identifiers keeps the flood from
//! looping. There is no fork resolution: a block that does not extend
//! the local tip is dropped.

use crate::core::blockchain::BlockchainError;
use crate::core::{Block, Blockchain, Transaction, TransactionError, UtxoError, UtxoSet, BLOCK_REWARD};
use crate::mining::{Mempool, MempoolError, PowError, ProofOfWork};
use crate::network::message::Message;
use crate::network::peer::{Peer, PeerError};
use crate::wallet::verify_transaction_signature;
use futures::StreamExt;
use log::{debug, error, info, warn};
use lru::LruCache;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::codec::{FramedRead, LinesCodec};

/// Idle read deadline per peer connection
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest accepted message line, in bytes
const MAX_LINE_LENGTH: usize = 1 << 20;

/// Capacity of the recently-seen identifier cache
const SEEN_CACHE_SIZE: usize = 4096;

/// Gossip handling errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error(transparent)]
    Utxo(#[from] UtxoError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    #[error(transparent)]
    Pow(#[from] PowError),
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error("consensus invariant violated: {0}")]
    ConsensusInvariantViolated(String),
}

/// The gossip overlay endpoint of this node
pub struct Node {
    port: u16,
    peers: RwLock<Vec<Arc<Peer>>>,
    chain: Arc<RwLock<Blockchain>>,
    utxos: Arc<RwLock<UtxoSet>>,
    mempool: Arc<RwLock<Mempool>>,
    pow: Arc<ProofOfWork>,
    running: AtomicBool,
    seen: StdMutex<LruCache<String, ()>>,
    accept_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Node {
    pub fn new(
        port: u16,
        chain: Arc<RwLock<Blockchain>>,
        utxos: Arc<RwLock<UtxoSet>>,
        mempool: Arc<RwLock<Mempool>>,
        pow: Arc<ProofOfWork>,
    ) -> Self {
        let capacity = NonZeroUsize::new(SEEN_CACHE_SIZE).expect("seen cache capacity is non-zero");
        Self {
            port,
            peers: RwLock::new(Vec::new()),
            chain,
            utxos,
            mempool,
            pow,
            running: AtomicBool::new(false),
            seen: StdMutex::new(LruCache::new(capacity)),
            accept_task: StdMutex::new(None),
        }
    }

    /// Dial the configured bootstrap peers eagerly. Failures are
    /// logged and the peer is not added.
    pub async fn connect_bootstrap(&self, addresses: &[String]) {
        for address in addresses {
            match self.add_peer(address).await {
                Ok(()) => info!("connected to bootstrap peer {address}"),
                Err(e) => warn!("failed to connect to peer {address}: {e}"),
            }
        }
    }

    /// Dial a peer and add it to the broadcast list
    pub async fn add_peer(&self, address: &str) -> Result<(), PeerError> {
        let peer = Peer::connect(address).await?;
        self.peers.write().await.push(Arc::new(peer));
        Ok(())
    }

    /// Addresses of the current peers
    pub async fn peer_addresses(&self) -> Vec<String> {
        self.peers
            .read()
            .await
            .iter()
            .map(|p| p.address.clone())
            .collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Bind the listener and run the accept loop in the background.
    /// Returns the bound port (useful when configured with port 0).
    pub async fn start(self: Arc<Self>) -> std::io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let local_port = listener.local_addr()?.port();
        self.running.store(true, Ordering::Relaxed);
        info!("gossip node listening on port {local_port}");

        let node = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("incoming connection from {addr}");
                        let node = Arc::clone(&node);
                        tokio::spawn(handle_connection(node, stream, addr));
                    }
                    Err(e) => {
                        if !node.running.load(Ordering::Relaxed) {
                            break;
                        }
                        warn!("accept error: {e}");
                    }
                }
            }
        });
        *self.accept_task.lock().expect("accept task lock poisoned") = Some(handle);

        Ok(local_port)
    }

    /// Stop accepting connections and close every peer
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self
            .accept_task
            .lock()
            .expect("accept task lock poisoned")
            .take()
        {
            handle.abort();
        }
        for peer in self.peers.read().await.iter() {
            peer.close().await;
        }
        info!("gossip node stopped");
    }

    /// Record an identifier in the seen cache. Returns true when it
    /// was already there.
    fn mark_seen(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().expect("seen cache lock poisoned");
        seen.put(id.to_string(), ()).is_some()
    }

    /// Dispatch one parsed gossip message
    async fn handle_message(&self, message: Message) {
        debug!("received {}", message.type_name());

        match message {
            Message::NewTransaction(tx) => {
                if self.mark_seen(&tx.id) {
                    return;
                }
                match self.admit_transaction(&tx).await {
                    Ok(()) => self.broadcast(&Message::NewTransaction(tx)).await,
                    Err(NodeError::Mempool(MempoolError::DuplicateTransaction)) => {}
                    Err(e) => debug!("rejected gossip transaction {}: {e}", tx.id),
                }
            }
            Message::NewBlock(block) => {
                if self.mark_seen(&block.hash) {
                    return;
                }
                match self.accept_block(&block).await {
                    Ok(()) => {
                        info!("accepted block {} from gossip", block.index);
                        self.broadcast(&Message::NewBlock(block)).await;
                    }
                    Err(e @ NodeError::ConsensusInvariantViolated(_)) => {
                        error!("{e}; halting node");
                        std::process::exit(1);
                    }
                    Err(e) => warn!("rejected gossip block {}: {e}", block.index),
                }
            }
        }
    }

    /// Validate a transaction (structure, signature, spendability) and
    /// admit it to the mempool
    pub async fn admit_transaction(&self, tx: &Transaction) -> Result<(), NodeError> {
        tx.validate()?;

        if !verify_transaction_signature(tx).map_err(|_| NodeError::InvalidSignature)? {
            return Err(NodeError::InvalidSignature);
        }

        self.utxos.read().await.validate_transaction(tx)?;
        self.mempool.write().await.add_transaction(tx.clone())?;
        Ok(())
    }

    /// Validate a block received from a peer and commit it: check the
    /// proof of work, the coinbase placement and amount, and every
    /// transfer signature, then append to the chain, apply to the UTXO
    /// set, and drop the included transactions from the mempool.
    pub async fn accept_block(&self, block: &Block) -> Result<(), NodeError> {
        self.pow.validate_block(block)?;
        self.validate_block_transactions(block)?;

        {
            let mut chain = self.chain.write().await;
            match chain.add_block(block.clone()) {
                Ok(()) => {}
                Err(BlockchainError::Archive(e)) => {
                    warn!("block {} not persisted, kept in memory: {e}", block.index)
                }
                Err(e) => return Err(e.into()),
            }

            let mut utxos = self.utxos.write().await;
            utxos.apply_block(block).map_err(|e| {
                NodeError::ConsensusInvariantViolated(format!(
                    "block {} appended but state update failed: {e}",
                    block.index
                ))
            })?;
        }

        let mut mempool = self.mempool.write().await;
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                mempool.remove_transaction(&tx.id);
            }
        }

        Ok(())
    }

    /// Reward and signature checks for blocks arriving off the wire
    fn validate_block_transactions(&self, block: &Block) -> Result<(), NodeError> {
        let coinbase_count = block
            .transactions
            .iter()
            .filter(|tx| tx.is_coinbase())
            .count();
        if coinbase_count != 1 || !block.transactions[0].is_coinbase() {
            return Err(NodeError::InvalidBlock(
                "block must lead with exactly one coinbase".to_string(),
            ));
        }

        let expected = BLOCK_REWARD + block.total_fees();
        let minted = block.transactions[0].amount;
        if minted != expected {
            return Err(NodeError::InvalidBlock(format!(
                "coinbase mints {minted}, expected {expected}"
            )));
        }

        for tx in &block.transactions[1..] {
            if !verify_transaction_signature(tx).map_err(|_| NodeError::InvalidSignature)? {
                return Err(NodeError::InvalidSignature);
            }
        }

        Ok(())
    }

    /// Serialise a message once and push it to every peer. Send
    /// failures are logged; the peer stays on the list.
    pub async fn broadcast(&self, message: &Message) {
        let line = match message.to_line() {
            Ok(line) => line,
            Err(e) => {
                error!("failed to encode {} message: {e}", message.type_name());
                return;
            }
        };

        for peer in self.peers.read().await.iter() {
            if let Err(e) = peer.send_line(&line).await {
                warn!("failed to send to peer {}: {e}", peer.address);
            }
        }
    }

    /// Flood a locally-admitted transaction
    pub async fn broadcast_transaction(&self, tx: &Transaction) {
        self.mark_seen(&tx.id);
        self.broadcast(&Message::NewTransaction(tx.clone())).await;
    }

    /// Flood a locally-mined block
    pub async fn broadcast_block(&self, block: &Block) {
        self.mark_seen(&block.hash);
        self.broadcast(&Message::NewBlock(block.clone())).await;
    }
}

/// Read newline-delimited messages from one peer connection until EOF,
/// a read error, or the idle deadline
async fn handle_connection(node: Arc<Node>, stream: TcpStream, addr: SocketAddr) {
    let mut frames = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        match tokio::time::timeout(READ_IDLE_TIMEOUT, frames.next()).await {
            Err(_) => {
                debug!("peer {addr} idle, closing connection");
                break;
            }
            Ok(None) => {
                debug!("peer {addr} disconnected");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!("read error from {addr}: {e}");
                break;
            }
            Ok(Some(Ok(line))) => match Message::from_line(&line) {
                Ok(message) => node.handle_message(message).await,
                Err(e) => debug!("ignoring unparseable message from {addr}: {e}"),
            },
        }
    }
}
