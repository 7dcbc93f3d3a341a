//! Database layer for Achievo
//!
//! Provides:
//! - SeaORM entity models
//! - PostgreSQL implementations of the store and directory contracts
//! - Connection pool management
//! - Embedded migrations

mod content_store;
mod directory;
pub mod models;
mod reference_store;

pub use content_store::PgContentStore;
pub use directory::PgDirectory;
pub use reference_store::PgReferenceStore;

use crate::config::{AppConfig, DatabaseConfig};
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

fn connect_options(url: &str, max: u32, min: u32, config: &DatabaseConfig) -> ConnectOptions {
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(max)
        .min_connections(min)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(true);
    opts
}

async fn connect(opts: ConnectOptions, target: &str) -> Result<DatabaseConnection> {
    Database::connect(opts)
        .await
        .map_err(|e| AppError::Upstream {
            message: format!("Failed to connect to {}: {}", target, e),
        })
}

async fn ping_connection(conn: &DatabaseConnection, target: &str) -> Result<()> {
    conn.execute_unprepared("SELECT 1")
        .await
        .map_err(|e| AppError::Upstream {
            message: format!("{} ping failed: {}", target, e),
        })?;
    Ok(())
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");
        let primary = connect(
            connect_options(&config.url, config.max_connections, config.min_connections, config),
            "primary",
        )
        .await?;

        // Connect to replica if configured
        let replica = match config.read_url {
            Some(ref read_url) => {
                info!("Connecting to read replica...");
                let opts = connect_options(
                    read_url,
                    config.max_connections,
                    config.min_connections,
                    config,
                );
                Some(connect(opts, "replica").await?)
            }
            None => None,
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        ping_connection(&self.primary, "Primary").await?;
        if let Some(ref replica) = self.replica {
            ping_connection(replica, "Replica").await?;
        }
        Ok(())
    }
}

/// Connect to the content store, which defaults to the primary database
pub async fn connect_content(config: &AppConfig) -> Result<DatabaseConnection> {
    info!("Connecting to content store...");
    let opts = connect_options(
        config.content_database_url(),
        config.content_store.max_connections,
        config.content_store.min_connections,
        &config.database,
    );
    connect(opts, "content store").await
}

/// Apply both embedded migration sets.
///
/// The sets share a migrations table when they point at the same database,
/// so each one ignores versions it does not own.
pub async fn run_migrations(pool: &DbPool, content: &DatabaseConnection) -> Result<()> {
    // Reference store and directory schema
    let mut reference = sqlx::migrate!("./migrations/reference");
    reference.set_ignore_missing(true);
    reference
        .run(pool.write().get_postgres_connection_pool())
        .await
        .map_err(migration_error)?;

    // Content document schema
    let mut documents = sqlx::migrate!("./migrations/content");
    documents.set_ignore_missing(true);
    documents
        .run(content.get_postgres_connection_pool())
        .await
        .map_err(migration_error)?;

    info!("Migrations applied");
    Ok(())
}

fn migration_error(err: sqlx::migrate::MigrateError) -> AppError {
    AppError::Configuration {
        message: format!("Migration failed: {}", err),
    }
}
