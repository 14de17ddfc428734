//! Read-only HTTP surface. Every handler returns one of two error shapes:
//! `{"error": "record not found, please revise your condition"}` for a 404,
//! `{"error": "<message>"}` for a 500.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::error::StoreError;
use crate::http::routes::AppState;
use crate::store::BlockId;

pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            StoreError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "record not found, please revise your condition" })),
            )
                .into_response(),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    1
}

pub async fn get_blocks(
    State(state): State<AppState>,
    Query(query): Query<BlocksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let blocks = state.store.recent_blocks(query.limit).await?;
    Ok(Json(blocks))
}

pub async fn get_block_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let block_id = match id.parse::<u64>() {
        Ok(number) => BlockId::Number(number),
        Err(_) => BlockId::Hash(id),
    };

    let block = state
        .store
        .block_by_id(&block_id)
        .await?
        .ok_or(StoreError::NotFound)?;

    Ok(Json(block))
}

pub async fn get_transaction_by_hash(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction = state
        .store
        .transaction_by_hash(&tx_hash)
        .await?
        .ok_or(StoreError::NotFound)?;

    Ok(Json(transaction))
}
