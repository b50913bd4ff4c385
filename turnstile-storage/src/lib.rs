//! PostgreSQL + Redis storage backend for turnstile.
//!
//! PostgreSQL holds the durable user and session records and is the
//! authority for session existence; Redis holds the denormalized
//! session snapshots that serve fast-path lookups. [`DualStorage`]
//! owns the connections to both and hands out the repositories built
//! over them.

pub mod migrations;
pub mod repositories;

pub use repositories::{DualStoreSessionRepository, PostgresUserRepository};

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use turnstile_core::Error;

use migrations::{
    CreateSessionIndexes, CreateSessionsTable, CreateUsersTable, Migration, MigrationManager,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connected handles to both session stores plus the repositories built
/// over them.
#[derive(Clone)]
pub struct DualStorage {
    pool: PgPool,
    cache: ConnectionManager,
    users: Arc<PostgresUserRepository>,
    sessions: Arc<DualStoreSessionRepository>,
}

impl DualStorage {
    /// Connect to both stores. Postgres failures surface as
    /// [`Error::Relational`], Redis failures as [`Error::Cache`].
    pub async fn connect(postgres_url: &str, redis_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(postgres_url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to connect to postgres");
                Error::Relational(Box::new(e))
            })?;

        let client = redis::Client::open(redis_url).map_err(|e| {
            tracing::error!(error = %e, "invalid redis url");
            Error::Cache(Box::new(e))
        })?;
        let cache = client.get_connection_manager().await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to redis");
            Error::Cache(Box::new(e))
        })?;

        Ok(Self::new(pool, cache))
    }

    pub fn new(pool: PgPool, cache: ConnectionManager) -> Self {
        let users = Arc::new(PostgresUserRepository::new(pool.clone()));
        let sessions = Arc::new(DualStoreSessionRepository::new(pool.clone(), cache.clone()));
        Self {
            pool,
            cache,
            users,
            sessions,
        }
    }

    /// Apply any pending schema migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        let manager = MigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "failed to initialize migrations");
            Error::Relational(Box::new(e))
        })?;

        let migrations: Vec<Box<dyn Migration>> = vec![
            Box::new(CreateUsersTable),
            Box::new(CreateSessionsTable),
            Box::new(CreateSessionIndexes),
        ];
        manager.up(&migrations).await.map_err(|e| {
            tracing::error!(error = %e, "failed to run migrations");
            Error::Relational(Box::new(e))
        })
    }

    /// Round-trip both stores.
    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Relational(Box::new(e)))?;

        let mut cache = self.cache.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut cache)
            .await
            .map_err(|e| Error::Cache(Box::new(e)))?;

        Ok(())
    }

    pub fn users(&self) -> Arc<PostgresUserRepository> {
        self.users.clone()
    }

    pub fn sessions(&self) -> Arc<DualStoreSessionRepository> {
        self.sessions.clone()
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
