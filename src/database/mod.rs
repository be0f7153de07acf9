/// SQLite database backend for the local settings store

pub mod migrations;
pub mod schema;
pub mod sqlite;

use crate::error::{Error, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{str::FromStr, time::Duration};

pub use sqlite::SqliteLocalStore;

/// Database connection pool type
pub type DatabasePool = Pool<Sqlite>;

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path
    pub database_url: String,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
    /// Enable WAL mode for better concurrency
    pub enable_wal: bool,
}

impl DatabaseConfig {
    /// Private in-memory database, for tests and ephemeral sessions
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_string(),
            max_connections: 1,
            connection_timeout: 10,
            enable_wal: false,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url == IN_MEMORY_URL
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:prefsync.db".to_string(),
            max_connections: 5,
            connection_timeout: 30,
            enable_wal: true,
        }
    }
}

/// Main database manager
pub struct Database {
    pool: DatabasePool,
    config: DatabaseConfig,
}

impl Database {
    /// Open the database and run pending migrations
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let (options, max_connections) = if config.is_in_memory() {
            // Every connection to :memory: is a separate database
            let options = SqliteConnectOptions::from_str(&config.database_url)
                .map_err(|e| Error::Database(format!("Invalid database url: {}", e)))?;
            (options, 1)
        } else {
            let options = SqliteConnectOptions::new()
                .filename(config.database_url.trim_start_matches("sqlite:"))
                .create_if_missing(true)
                .pragma("journal_mode", if config.enable_wal { "WAL" } else { "DELETE" })
                .pragma("synchronous", "NORMAL")
                .pragma("temp_store", "MEMORY");
            (options, config.max_connections.max(1))
        };

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout));
        if config.is_in_memory() {
            // Closing the only connection would drop the database
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        let database = Self { pool, config };
        database.migrate().await?;

        Ok(database)
    }

    async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Local store backed by this database
    pub fn local_store(&self) -> SqliteLocalStore {
        SqliteLocalStore::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
