//! The Supervisor: wires every other component together, runs the
//! telemetry and requeue loops, and owns the shutdown sequence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::chain::ChainClient;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::http::build_router;
use crate::queue::{QueueAlert, TaskQueue};
use crate::store::Store;
use crate::workers::{BlockWorkerPool, ReceiptWorkerPool};

/// Both the telemetry loop and the requeue loop tick on this interval.
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(3);
const REQUEUE_INTERVAL: Duration = Duration::from_secs(3);
/// Interval for the broker connectivity check.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Up to this many rejected deliveries are returned to the ready set per
/// queue, per tick.
const REQUEUE_BATCH: u32 = 100;
/// Bound on how long the HTTP server is given to drain in-flight requests
/// once a shutdown signal arrives.
const HTTP_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(3);

pub struct Supervisor {
    config: Config,
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    queue: Arc<dyn TaskQueue>,
}

impl Supervisor {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            config,
            store,
            chain,
            queue,
        }
    }

    /// Starts every component and blocks until a termination signal arrives
    /// or the coordinator exits (which is always treated as fatal), then
    /// drains the worker pools before shutting down the HTTP server.
    /// `alerts` is the broker's classified-error channel, drained by a
    /// logging loop for the lifetime of the process. Returns `Err` only if
    /// the coordinator was the reason shutdown began.
    pub async fn run(self, alerts: mpsc::UnboundedReceiver<QueueAlert>) -> eyre::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(broker_alert_logger(alerts));

        let router = build_router(Arc::clone(&self.store));
        let listener = tokio::net::TcpListener::bind(self.config.server.addr()).await?;
        tracing::info!(addr = %self.config.server.addr(), "http server listening");

        let mut http_shutdown_rx = shutdown_rx.clone();
        let http_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown_rx.changed().await;
                })
                .await
        });

        tokio::spawn(telemetry_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.config.indexer.block_task_queue_name.clone(),
            self.config.indexer.tx_receipt_task_queue_name.clone(),
            shutdown_rx.clone(),
        ));

        tokio::spawn(requeue_loop(
            Arc::clone(&self.queue),
            self.config.indexer.block_task_queue_name.clone(),
            self.config.indexer.tx_receipt_task_queue_name.clone(),
            shutdown_rx.clone(),
        ));

        tokio::spawn(heartbeat_loop(Arc::clone(&self.queue), shutdown_rx.clone()));

        let block_pool = BlockWorkerPool::new(
            Arc::clone(&self.store),
            Arc::clone(&self.chain),
            Arc::clone(&self.queue),
            self.config.indexer.block_task_queue_name.clone(),
            self.config.indexer.tx_receipt_task_queue_name.clone(),
            self.config.indexer.block_worker_concurrency,
            shutdown_rx.clone(),
        );
        let block_pool_handle = tokio::spawn(Arc::clone(&block_pool).run());

        let receipt_pool = ReceiptWorkerPool::new(
            Arc::clone(&self.store),
            Arc::clone(&self.chain),
            Arc::clone(&self.queue),
            self.config.indexer.tx_receipt_task_queue_name.clone(),
            self.config.indexer.receipt_worker_concurrency,
            shutdown_rx.clone(),
        );
        let receipt_pool_handle = tokio::spawn(Arc::clone(&receipt_pool).run());

        let coordinator = Coordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.chain),
            Arc::clone(&self.queue),
            self.config.indexer.block_task_queue_name.clone(),
            self.config.indexer.tx_receipt_task_queue_name.clone(),
        );
        let mut coordinator_handle = tokio::spawn(async move { coordinator.run().await });

        // The coordinator running out is always fatal: with it dead there is
        // nothing left deciding what to index, even though the worker pools
        // and HTTP server would otherwise keep running. Treat it the same as
        // a termination signal and shut the rest of the process down.
        let mut fatal: Option<eyre::Report> = None;
        tokio::select! {
            _ = wait_for_termination_signal() => {
                tracing::info!("termination signal received, shutting down");
            }
            join_result = &mut coordinator_handle => {
                let err = match join_result {
                    Ok(Ok(())) => eyre::eyre!("coordinator exited unexpectedly"),
                    Ok(Err(err)) => eyre::Report::new(err).wrap_err("coordinator failed"),
                    Err(err) => eyre::Report::new(err).wrap_err("coordinator task panicked"),
                };
                tracing::error!(error = %err, "shutting down");
                fatal = Some(err);
            }
        }

        // Stop accepting new deliveries; in-flight deliveries on the worker
        // pools run to completion because the shutdown check only gates the
        // next `consume` call, never an already-started one.
        let _ = shutdown_tx.send(true);

        if let Err(err) = block_pool_handle.await {
            tracing::warn!(error = %err, "block worker pool task join error");
        }
        if let Err(err) = receipt_pool_handle.await {
            tracing::warn!(error = %err, "receipt worker pool task join error");
        }
        coordinator_handle.abort();

        match tokio::time::timeout(HTTP_SHUTDOWN_DEADLINE, http_handle).await {
            Ok(Ok(Ok(()))) => tracing::info!("http server drained cleanly"),
            Ok(Ok(Err(err))) => tracing::warn!(error = %err, "http server exited with error"),
            Ok(Err(err)) => tracing::warn!(error = %err, "http server task join error"),
            Err(_) => tracing::warn!("http server did not drain within deadline, abandoning"),
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Drains the broker's alert channel for the process lifetime, logging each
/// classified event at the severity appropriate to its kind.
async fn broker_alert_logger(mut alerts: mpsc::UnboundedReceiver<QueueAlert>) {
    while let Some(alert) = alerts.recv().await {
        match alert {
            QueueAlert::Heartbeat(msg) => tracing::warn!(kind = "heartbeat", %msg, "broker alert"),
            QueueAlert::Consume(msg) => tracing::warn!(kind = "consume", %msg, "broker alert"),
            QueueAlert::Delivery(msg) => tracing::error!(kind = "delivery", %msg, "broker alert"),
        }
    }
}

/// Checks broker connectivity every [`HEARTBEAT_INTERVAL`]. A failed ping is
/// reported through `queue`'s own alert channel (see
/// [`crate::queue::RedisTaskQueue::ping`]); this loop only needs to keep
/// calling it.
async fn heartbeat_loop(queue: Arc<dyn TaskQueue>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        let _ = queue.ping().await;
    }
}

/// Samples queue depths and store counters every [`TELEMETRY_INTERVAL`] and
/// logs them as a single structured event.
async fn telemetry_loop(
    store: Arc<dyn Store>,
    queue: Arc<dyn TaskQueue>,
    block_queue_name: String,
    tx_receipt_queue_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(TELEMETRY_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        let block_stats = queue.stats(&block_queue_name).await;
        let receipt_stats = queue.stats(&tx_receipt_queue_name).await;
        let block_count = store.block_count().await;
        let tx_count = store.transaction_count().await;
        let pending_receipts = store.pending_receipt_count().await;

        tracing::info!(
            ?block_stats,
            ?receipt_stats,
            ?block_count,
            ?tx_count,
            ?pending_receipts,
            "telemetry"
        );
    }
}

/// Returns up to [`REQUEUE_BATCH`] rejected deliveries per queue to the
/// ready set every [`REQUEUE_INTERVAL`].
async fn requeue_loop(
    queue: Arc<dyn TaskQueue>,
    block_queue_name: String,
    tx_receipt_queue_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(REQUEUE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        for name in [&block_queue_name, &tx_receipt_queue_name] {
            match queue.requeue_rejected(name, REQUEUE_BATCH).await {
                Ok(moved) if moved > 0 => {
                    tracing::info!(queue = %name, moved, "requeued rejected deliveries")
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(queue = %name, error = %err, "requeue failed"),
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
