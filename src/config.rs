//! Process configuration, loaded once from the environment.
//!
//! No global singleton: [`Config::load`] is called once in `main` and the
//! result is passed by value into the [`crate::supervisor::Supervisor`],
//! which hands pieces of it to each component it constructs.

use serde::Deserialize;

fn default_db_user() -> String {
    "admin".to_string()
}
fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> String {
    "5432".to_string()
}
fn default_db_name() -> String {
    "db".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> String {
    "8080".to_string()
}
fn default_redis_endpoint() -> String {
    "localhost:6379".to_string()
}
fn default_redis_tag() -> String {
    "block indexer".to_string()
}
fn default_block_queue_name() -> String {
    "block".to_string()
}
fn default_tx_receipt_queue_name() -> String {
    "txReceipt".to_string()
}
const fn default_block_worker_concurrency() -> usize {
    50
}
const fn default_receipt_worker_concurrency() -> usize {
    50
}
const fn default_db_max_connections() -> u32 {
    10
}

/// Database connection settings.
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "db_user", default = "default_db_user")]
    pub user: String,
    #[serde(rename = "db_password", default)]
    pub password: String,
    #[serde(rename = "db_host", default = "default_db_host")]
    pub host: String,
    #[serde(rename = "db_port", default = "default_db_port")]
    pub port: String,
    #[serde(rename = "db_name", default = "default_db_name")]
    pub name: String,
    #[serde(rename = "db_max_connections", default = "default_db_max_connections")]
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// Builds the `postgres://` DSN consumed by `sqlx::PgPool`.
    pub fn dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// HTTP server bind settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "host", default = "default_host")]
    pub host: String,
    #[serde(rename = "port", default = "default_port")]
    pub port: String,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ingestion pipeline settings: chain RPC endpoint, broker location, queue
/// names, and worker pool sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(rename = "rpc_url", default)]
    pub rpc_url: String,
    #[serde(rename = "redis_endpoint", default = "default_redis_endpoint")]
    pub redis_endpoint: String,
    #[serde(rename = "redis_tag", default = "default_redis_tag")]
    pub redis_tag: String,
    #[serde(rename = "block_task_queue_name", default = "default_block_queue_name")]
    pub block_task_queue_name: String,
    #[serde(
        rename = "tx_receipt_task_queue_name",
        default = "default_tx_receipt_queue_name"
    )]
    pub tx_receipt_task_queue_name: String,
    #[serde(
        rename = "block_worker_concurrency",
        default = "default_block_worker_concurrency"
    )]
    pub block_worker_concurrency: usize,
    #[serde(
        rename = "receipt_worker_concurrency",
        default = "default_receipt_worker_concurrency"
    )]
    pub receipt_worker_concurrency: usize,
}

/// Root configuration, assembled from the three sub-structs above.
///
/// `envy::from_env` can't deserialize nested structs with flat env keys
/// directly, so [`Config::load`] parses each section from the same
/// flattened environment map instead of one big `#[serde(flatten)]` struct.
/// This keeps each section's defaults colocated with its fields.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub indexer: IndexerConfig,
}

impl Config {
    /// Loads configuration from the process environment, applying a
    /// default for every recognized key that isn't set.
    pub fn load() -> Result<Self, envy::Error> {
        let database: DatabaseConfig = envy::from_env()?;
        let server: ServerConfig = envy::from_env()?;
        let indexer: IndexerConfig = envy::from_env()?;

        tracing::info!(?database, ?server, ?indexer, "config loaded");

        Ok(Self {
            database,
            server,
            indexer,
        })
    }
}
