use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use chain_indexer::chain::JsonRpcChainClient;
use chain_indexer::cli::Cli;
use chain_indexer::config::Config;
use chain_indexer::queue::RedisTaskQueue;
use chain_indexer::store::PgStore;
use chain_indexer::supervisor::Supervisor;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.effective_log_level());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup failure");
            ExitCode::FAILURE
        }
    }
}

/// Builds every dependency in order (config, database, chain client,
/// broker) and hands them to the [`Supervisor`] by explicit construction,
/// rather than through any global or lazily-initialized state.
async fn run() -> eyre::Result<()> {
    let config = Config::load()?;

    let store = Arc::new(PgStore::connect(&config.database.dsn()).await?);

    let chain = Arc::new(JsonRpcChainClient::new(&config.indexer.rpc_url)?);

    let (queue, alerts) = RedisTaskQueue::connect(
        &format!("redis://{}", config.indexer.redis_endpoint),
        config.indexer.redis_tag.clone(),
    )
    .await?;
    let queue = Arc::new(queue);

    let supervisor = Supervisor::new(config, store, chain, queue);
    supervisor.run(alerts).await
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
