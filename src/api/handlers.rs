//! REST API handlers
//!
//! A thin façade over the core components: each handler validates its
//! input, calls into the chain, mempool, UTXO set, miner, or gossip
//! node, and maps component errors to HTTP status codes.

use crate::core::{Block, Blockchain, Transaction, Utxo, UtxoSet};
use crate::mining::{Mempool, Miner, MinerError};
use crate::network::Node;
use crate::wallet::{verify_transaction_signature, Wallet};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub chain: Arc<RwLock<Blockchain>>,
    pub utxos: Arc<RwLock<UtxoSet>>,
    pub mempool: Arc<RwLock<Mempool>>,
    pub miner: Arc<Miner>,
    pub node: Arc<Node>,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

type ErrorResponse = (StatusCode, Json<ApiError>);

fn bad_request(message: impl Into<String>) -> ErrorResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

fn not_found(message: impl Into<String>) -> ErrorResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> ErrorResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

// ============================================================================
// Responses and requests
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub height: u64,
    pub mempool: usize,
    pub peers: usize,
}

#[derive(Serialize)]
pub struct BlocksResponse {
    pub blocks: Vec<Block>,
    pub start: u64,
    pub limit: u64,
    pub total: u64,
}

#[derive(Deserialize)]
pub struct BlocksQuery {
    pub start: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Serialize)]
pub struct TransactionStatusResponse {
    pub transaction: Transaction,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_index: Option<u64>,
}

#[derive(Deserialize)]
pub struct WalletQuery {
    pub consent: Option<String>,
}

#[derive(Serialize)]
pub struct NewWalletResponse {
    pub address: String,
    pub private_key: String,
    pub warning: &'static str,
}

#[derive(Deserialize)]
pub struct SignRequest {
    pub private_key: String,
    pub transaction: TransactionPayload,
}

#[derive(Deserialize)]
pub struct TransactionPayload {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub fee: u64,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub message: &'static str,
    pub tx_id: String,
}

#[derive(Serialize)]
pub struct MempoolResponse {
    pub transactions: Vec<Transaction>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct MineRequest {
    pub miner_address: String,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: &'static str,
    pub block: Block,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
    pub utxos: Vec<Utxo>,
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub address: String,
}

#[derive(Serialize)]
pub struct AddPeerResponse {
    pub message: &'static str,
    pub address: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let height = state.chain.read().await.height();
    let mempool = state.mempool.read().await.len();
    let peers = state.node.peer_count().await;

    Json(HealthResponse {
        status: "healthy",
        height,
        mempool,
        peers,
    })
}

/// GET /blockchain/blocks?start=0&limit=10
pub async fn get_blocks(
    State(state): State<ApiState>,
    Query(query): Query<BlocksQuery>,
) -> Json<BlocksResponse> {
    let start = query.start.unwrap_or(0);
    let limit = query.limit.unwrap_or(10).min(100);

    let chain = state.chain.read().await;
    let blocks = chain.blocks(start, limit).to_vec();

    Json(BlocksResponse {
        blocks,
        start,
        limit,
        total: chain.height() + 1,
    })
}

/// GET /blockchain/block/{hash}
pub async fn get_block(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> Result<Json<Block>, ErrorResponse> {
    let chain = state.chain.read().await;
    chain
        .block_by_hash(&hash)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("block not found"))
}

/// GET /blockchain/tx/{txid}
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(txid): Path<String>,
) -> Result<Json<TransactionStatusResponse>, ErrorResponse> {
    if let Some(tx) = state.mempool.read().await.transaction(&txid) {
        return Ok(Json(TransactionStatusResponse {
            transaction: tx.clone(),
            status: "pending",
            block: None,
            block_index: None,
        }));
    }

    let chain = state.chain.read().await;
    if let Some((block, tx)) = chain.find_transaction(&txid) {
        return Ok(Json(TransactionStatusResponse {
            transaction: tx.clone(),
            status: "confirmed",
            block: Some(block.hash.clone()),
            block_index: Some(block.index),
        }));
    }

    Err(not_found("transaction not found"))
}

/// GET /wallet/new?consent=true
pub async fn new_wallet(
    Query(query): Query<WalletQuery>,
) -> Result<Json<NewWalletResponse>, ErrorResponse> {
    if query.consent.as_deref() != Some("true") {
        return Err(bad_request(
            "you must add ?consent=true to generate a wallet",
        ));
    }

    let wallet = Wallet::new();
    let (private_key, address) = wallet.export();

    Ok(Json(NewWalletResponse {
        address,
        private_key,
        warning: "NEVER share your private key! Store it securely offline.",
    }))
}

/// POST /wallet/sign
pub async fn sign_transaction(
    Json(request): Json<SignRequest>,
) -> Result<Json<Transaction>, ErrorResponse> {
    let wallet = Wallet::from_private_key(&request.private_key)
        .map_err(|_| bad_request("invalid private key"))?;

    if wallet.address() != request.transaction.from {
        return Err(bad_request("private key does not match from address"));
    }

    let tx = wallet
        .create_and_sign(
            &request.transaction.to,
            request.transaction.amount,
            request.transaction.fee,
        )
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(Json(tx))
}

/// POST /tx
pub async fn broadcast_transaction(
    State(state): State<ApiState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<BroadcastResponse>, ErrorResponse> {
    tx.validate()
        .map_err(|e| bad_request(format!("invalid transaction: {e}")))?;

    let valid = verify_transaction_signature(&tx).unwrap_or(false);
    if !valid {
        return Err(bad_request("invalid signature"));
    }

    state
        .utxos
        .read()
        .await
        .validate_transaction(&tx)
        .map_err(|e| bad_request(format!("transaction validation failed: {e}")))?;

    state
        .mempool
        .write()
        .await
        .add_transaction(tx.clone())
        .map_err(|e| bad_request(e.to_string()))?;

    state.node.broadcast_transaction(&tx).await;

    Ok(Json(BroadcastResponse {
        message: "transaction broadcast successfully",
        tx_id: tx.id,
    }))
}

/// GET /mempool
pub async fn get_mempool(State(state): State<ApiState>) -> Json<MempoolResponse> {
    let transactions = state.mempool.read().await.transactions_by_fee(1000);
    let count = transactions.len();

    Json(MempoolResponse {
        transactions,
        count,
    })
}

/// POST /mine
pub async fn mine_block(
    State(state): State<ApiState>,
    Json(request): Json<MineRequest>,
) -> Result<Json<MineResponse>, ErrorResponse> {
    if request.miner_address.is_empty() {
        return Err(bad_request("miner_address is required"));
    }

    match state.miner.mine_block(&request.miner_address).await {
        Ok(block) => {
            state.node.broadcast_block(&block).await;
            Ok(Json(MineResponse {
                message: "block mined successfully",
                block,
            }))
        }
        Err(e @ MinerError::ConsensusInvariantViolated(_)) => {
            error!("{e}; halting node");
            std::process::exit(1);
        }
        Err(e) => Err(internal_error(format!("mining failed: {e}"))),
    }
}

/// GET /balance/{address}
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let utxos = state.utxos.read().await;
    let balance = utxos.balance(&address);
    let owned = utxos.utxos_for_address(&address);

    Json(BalanceResponse {
        address,
        balance,
        utxos: owned,
    })
}

/// GET /peers
pub async fn get_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state.node.peer_addresses().await;
    let count = peers.len();
    Json(PeersResponse { peers, count })
}

/// POST /peers
pub async fn add_peer(
    State(state): State<ApiState>,
    Json(request): Json<AddPeerRequest>,
) -> Result<Json<AddPeerResponse>, ErrorResponse> {
    state
        .node
        .add_peer(&request.address)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(Json(AddPeerResponse {
        message: "peer added successfully",
        address: request.address,
    }))
}

/// GET /metrics
pub async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let height = state.chain.read().await.height();
    let mempool = state.mempool.read().await.len();
    let peers = state.node.peer_count().await;
    let utxos = state.utxos.read().await.len();

    let body = format!(
        "# HELP cinder_blockchain_height Current blockchain height\n\
         # TYPE cinder_blockchain_height gauge\n\
         cinder_blockchain_height {height}\n\
         \n\
         # HELP cinder_mempool_size Number of transactions in mempool\n\
         # TYPE cinder_mempool_size gauge\n\
         cinder_mempool_size {mempool}\n\
         \n\
         # HELP cinder_peers_count Number of connected peers\n\
         # TYPE cinder_peers_count gauge\n\
         cinder_peers_count {peers}\n\
         \n\
         # HELP cinder_utxo_count Number of unspent transaction outputs\n\
         # TYPE cinder_utxo_count gauge\n\
         cinder_utxo_count {utxos}\n"
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
