mod redis_queue;

pub use redis_queue::RedisTaskQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A classified broker-connectivity event, sent on the channel returned by
/// [`RedisTaskQueue::connect`] so the supervisor's logging loop can report it
/// at the right severity without re-deriving the failure kind from a string.
#[derive(Debug, Clone)]
pub enum QueueAlert {
    /// The periodic connection liveness check failed.
    Heartbeat(String),
    /// A `consume` call failed.
    Consume(String),
    /// A `publish`/`ack`/`reject`/`requeue_rejected` call failed.
    Delivery(String),
}

/// A unit of work. Both worker pools share one payload shape: the queue name
/// alone distinguishes block work from receipt work, and the body only ever
/// needs a block number or a transaction hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    IndexBlock { number: u64 },
    FetchReceipt { tx_hash: String },
}

/// A delivery handed to a worker: the opaque payload needed to ack/reject it
/// against the broker. Deliberately left undecoded here: the worker parses
/// it and rejects the delivery itself on a malformed payload, so parse
/// failure is the worker's responsibility rather than the queue's.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub raw_payload: String,
}

/// Snapshot of one queue's list sizes, used by the telemetry loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub ready: u64,
    pub unacked: u64,
    pub rejected: u64,
}

/// A durable task queue built on a ready/unacked/rejected three-list
/// protocol over Redis. `queue` names one of the two logical queues
/// (`"blocks"` or `"receipts"`).
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Appends a task to the named queue's ready list.
    async fn publish(&self, queue: &str, task: &Task) -> Result<(), QueueError>;

    /// Atomically moves up to one task from the ready list to the unacked
    /// list and returns it, or `None` if the ready list is empty.
    async fn consume(&self, queue: &str) -> Result<Option<Delivery>, QueueError>;

    /// Removes a delivery from the unacked list once its work is durably
    /// persisted.
    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<(), QueueError>;

    /// Moves a delivery from the unacked list to the rejected list.
    async fn reject(&self, queue: &str, delivery: &Delivery) -> Result<(), QueueError>;

    /// Moves up to `limit` rejected entries back onto the ready list, called
    /// periodically by the supervisor's requeue loop.
    async fn requeue_rejected(&self, queue: &str, limit: u32) -> Result<u64, QueueError>;

    /// Current list sizes, for telemetry.
    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError>;

    /// Checks broker connectivity (`PING`, for the Redis backend). Used by
    /// the supervisor's heartbeat task; fakes may treat this as a no-op.
    async fn ping(&self) -> Result<(), QueueError>;
}
