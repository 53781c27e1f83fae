//! REST API routes

use crate::api::handlers::{self, ApiState};
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Log method, path, status, and duration for every request
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        "[{method}] {path} - status: {} - duration: {:?}",
        response.status(),
        start.elapsed()
    );
    response
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Chain
        .route("/blockchain/blocks", get(handlers::get_blocks))
        .route("/blockchain/block/{hash}", get(handlers::get_block))
        .route("/blockchain/tx/{txid}", get(handlers::get_transaction))
        // Wallet
        .route("/wallet/new", get(handlers::new_wallet))
        .route("/wallet/sign", post(handlers::sign_transaction))
        // Transactions
        .route("/tx", post(handlers::broadcast_transaction))
        .route("/mempool", get(handlers::get_mempool))
        // Mining
        .route("/mine", post(handlers::mine_block))
        // Balances
        .route("/balance/{address}", get(handlers::get_balance))
        // Peers
        .route("/peers", get(handlers::get_peers).post(handlers::add_peer))
        // Observability
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
}
