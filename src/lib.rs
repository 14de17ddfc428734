//! Library crate for the block indexer: the ingestion pipeline (coordinator,
//! worker pools, task queue, chain client, store) plus the HTTP read surface
//! and the supervisor that wires them together. See `main.rs` for the
//! process entry point.

pub mod chain;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod model;
pub mod queue;
pub mod store;
pub mod supervisor;
pub mod workers;
