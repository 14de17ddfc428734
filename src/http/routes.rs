use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::http::handlers::{get_block_by_id, get_blocks, get_transaction_by_hash};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

pub fn build_router(store: Arc<dyn Store>) -> Router {
    Router::new()
        .route("/blocks", get(get_blocks))
        .route("/blocks/:id", get(get_block_by_id))
        .route("/transaction/:tx_hash", get(get_transaction_by_hash))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}
