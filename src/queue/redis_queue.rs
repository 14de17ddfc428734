use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use crate::error::QueueError;
use crate::queue::{Delivery, QueueAlert, QueueStats, Task, TaskQueue};

/// Blocking-pop timeout used by `consume`. Short enough that a shutdown
/// signal is noticed promptly; the worker loop simply calls `consume` again
/// if it returns `None`.
const CONSUME_BLOCK: Duration = Duration::from_secs(1);

fn ready_key(queue: &str) -> String {
    format!("queue:{queue}:ready")
}

/// Per-process unacked list, scoped by the `REDIS_TAG` identifying this
/// consumer process. Ties each consumer's in-flight deliveries to its own
/// unacked list rather than a queue-wide one, so a crashed process's stuck
/// deliveries are attributable to it.
fn unacked_key(queue: &str, tag: &str) -> String {
    format!("queue:{queue}:unacked:{tag}")
}

fn rejected_key(queue: &str) -> String {
    format!("queue:{queue}:rejected")
}

/// Redis-backed [`TaskQueue`] implementing a ready/unacked/rejected
/// three-list protocol: `publish` is `LPUSH` onto the ready list, `consume`
/// is a blocking `RPOPLPUSH` from ready into this process's tagged unacked
/// list, `ack`/`reject` remove the delivered value from unacked (by value,
/// since every payload embeds a unique block number or tx hash), and
/// `requeue_rejected` walks rejected entries back onto ready.
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    tag: String,
    alerts: mpsc::UnboundedSender<QueueAlert>,
}

impl RedisTaskQueue {
    /// Opens the connection, tagged with an identifier for this consumer
    /// process. Returns the queue plus the receiving half of its alert
    /// channel, which a logging loop drains and classifies (heartbeat,
    /// consume, delivery, other).
    pub async fn connect(
        redis_url: &str,
        tag: impl Into<String>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<QueueAlert>), QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let (alerts, alerts_rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                conn,
                tag: tag.into(),
                alerts,
            },
            alerts_rx,
        ))
    }

    fn classify_delivery(&self, err: impl std::fmt::Display) -> QueueError {
        let message = err.to_string();
        let _ = self.alerts.send(QueueAlert::Delivery(message.clone()));
        QueueError::Delivery(message)
    }

    fn classify_consume(&self, err: impl std::fmt::Display) -> QueueError {
        let message = err.to_string();
        let _ = self.alerts.send(QueueAlert::Consume(message.clone()));
        QueueError::Delivery(message)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn publish(&self, queue: &str, task: &Task) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)
            .map_err(|e| self.classify_delivery(format!("encode task: {e}")))?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(ready_key(queue), payload)
            .await
            .map_err(|e| self.classify_delivery(e))
    }

    async fn consume(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .brpoplpush(
                ready_key(queue),
                unacked_key(queue, &self.tag),
                CONSUME_BLOCK.as_secs_f64(),
            )
            .await
            .map_err(|e| self.classify_consume(e))?;

        let Some(raw_payload) = raw else { return Ok(None) };

        Ok(Some(Delivery { raw_payload }))
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(unacked_key(queue, &self.tag), 1, &delivery.raw_payload)
            .await
            .map_err(|e| self.classify_delivery(e))
    }

    async fn reject(&self, queue: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(unacked_key(queue, &self.tag), 1, &delivery.raw_payload)
            .await
            .map_err(|e| self.classify_delivery(e))?;
        conn.lpush::<_, _, ()>(rejected_key(queue), &delivery.raw_payload)
            .await
            .map_err(|e| self.classify_delivery(e))
    }

    async fn requeue_rejected(&self, queue: &str, limit: u32) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let mut moved = 0u64;
        for _ in 0..limit {
            let result: Option<String> = conn
                .rpoplpush(rejected_key(queue), ready_key(queue))
                .await
                .map_err(|e| self.classify_delivery(e))?;
            match result {
                Some(_) => moved += 1,
                None => break,
            }
        }
        Ok(moved)
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let mut conn = self.conn.clone();
        let ready: u64 = conn
            .llen(ready_key(queue))
            .await
            .map_err(|e| self.classify_consume(e))?;
        let unacked: u64 = conn
            .llen(unacked_key(queue, &self.tag))
            .await
            .map_err(|e| self.classify_consume(e))?;
        let rejected: u64 = conn
            .llen(rejected_key(queue))
            .await
            .map_err(|e| self.classify_consume(e))?;
        Ok(QueueStats {
            ready,
            unacked,
            rejected,
        })
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| {
                let message = e.to_string();
                let _ = self.alerts.send(QueueAlert::Heartbeat(message.clone()));
                QueueError::Connection(message)
            })
    }
}
