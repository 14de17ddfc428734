//! Exercises the read-only HTTP surface against a [`FakeStore`], using
//! `tower::ServiceExt::oneshot` rather than a bound TCP listener.

mod support;

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use chain_indexer::http::build_router;
use chain_indexer::model::{Block, Transaction};
use chain_indexer::store::Store;

use support::FakeStore;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn seeded_store() -> Arc<FakeStore> {
    let store = Arc::new(FakeStore::new());
    store
}

#[tokio::test]
async fn get_blocks_defaults_to_limit_one_and_returns_newest_first() {
    let store = seeded_store();
    for n in 1..=3u64 {
        let block = Block::new(B256::repeat_byte(n as u8), n, 1_700_000_000 + n, B256::ZERO);
        store.insert_block_with_transactions(&block, &[]).await.unwrap();
    }

    let router = build_router(Arc::clone(&store) as Arc<dyn Store>);
    let response = router
        .oneshot(Request::builder().uri("/blocks").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let blocks = body.as_array().expect("array response");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["number"], 3);
}

#[tokio::test]
async fn get_blocks_honors_limit_query_param() {
    let store = seeded_store();
    for n in 1..=5u64 {
        let block = Block::new(B256::repeat_byte(n as u8), n, 1_700_000_000 + n, B256::ZERO);
        store.insert_block_with_transactions(&block, &[]).await.unwrap();
    }

    let router = build_router(Arc::clone(&store) as Arc<dyn Store>);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/blocks?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let blocks = body.as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["number"], 5);
    assert_eq!(blocks[1]["number"], 4);
}

#[tokio::test]
async fn get_block_by_id_accepts_number_or_hash() {
    let store = seeded_store();
    let hash = B256::repeat_byte(9);
    let block = Block::new(hash, 9, 1_700_000_000, B256::ZERO);
    store.insert_block_with_transactions(&block, &[]).await.unwrap();

    let router = build_router(Arc::clone(&store) as Arc<dyn Store>);
    let by_number = router
        .clone()
        .oneshot(Request::builder().uri("/blocks/9").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(by_number.status(), StatusCode::OK);

    let by_hash = router
        .oneshot(
            Request::builder()
                .uri(format!("/blocks/{hash}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(by_hash.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_block_by_id_returns_spec_shaped_404() {
    let store = seeded_store();
    let router = build_router(store as Arc<dyn Store>);

    let response = router
        .oneshot(Request::builder().uri("/blocks/404").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "record not found, please revise your condition");
}

#[tokio::test]
async fn get_transaction_by_hash_returns_the_row() {
    let store = seeded_store();
    let block_hash = B256::repeat_byte(1);
    let tx_hash = B256::repeat_byte(2);
    store
        .insert_block_with_transactions(
            &Block::new(block_hash, 1, 1_700_000_000, B256::ZERO),
            &[Transaction::new_pending(
                tx_hash,
                block_hash,
                Address::repeat_byte(3),
                Some(Address::repeat_byte(4)),
                0,
                &Bytes::new(),
                U256::from(100u64),
            )],
        )
        .await
        .unwrap();

    let router = build_router(store as Arc<dyn Store>);
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/transaction/{tx_hash}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["value"], "100");
    assert_eq!(body["nonce"], 0);
}

#[tokio::test]
async fn get_transaction_by_hash_returns_spec_shaped_404() {
    let store = seeded_store();
    let router = build_router(store as Arc<dyn Store>);

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/transaction/{}", B256::repeat_byte(7)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "record not found, please revise your condition");
}
