//! Versioned schema migrations for the relational store.
//!
//! Migrations are applied in order inside a transaction each, and
//! recorded in `_turnstile_migrations` so reruns are no-ops.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique version number for ordering migrations.
    fn version(&self) -> i64;

    /// Human readable name of the migration.
    fn name(&self) -> &str;

    async fn up(&self, conn: &mut PgConnection) -> Result<(), MigrationError>;

    async fn down(&self, conn: &mut PgConnection) -> Result<(), MigrationError>;
}

const MIGRATION_TABLE: &str = "_turnstile_migrations";

pub struct MigrationManager {
    pool: PgPool,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the migration tracking table.
    pub async fn initialize(&self) -> Result<(), MigrationError> {
        sqlx::query(
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                    version BIGINT PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );"#
            )
            .as_str(),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply pending migrations in version order.
    pub async fn up(&self, migrations: &[Box<dyn Migration>]) -> Result<(), MigrationError> {
        for migration in migrations {
            if !self.is_applied(migration.version()).await? {
                let mut tx = self.pool.begin().await?;

                tracing::info!(
                    "applying migration {} ({})",
                    migration.name(),
                    migration.version()
                );

                migration.up(&mut *tx).await?;

                sqlx::query(
                    format!(
                        "INSERT INTO {MIGRATION_TABLE} (version, name, applied_at) VALUES ($1, $2, $3)"
                    )
                    .as_str(),
                )
                .bind(migration.version())
                .bind(migration.name())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
            }
        }
        Ok(())
    }

    /// Roll back applied migrations, newest first.
    pub async fn down(&self, migrations: &[Box<dyn Migration>]) -> Result<(), MigrationError> {
        for migration in migrations.iter().rev() {
            if self.is_applied(migration.version()).await? {
                let mut tx = self.pool.begin().await?;

                tracing::info!(
                    "rolling back migration {} ({})",
                    migration.name(),
                    migration.version()
                );

                migration.down(&mut *tx).await?;

                sqlx::query(format!("DELETE FROM {MIGRATION_TABLE} WHERE version = $1").as_str())
                    .bind(migration.version())
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
            }
        }
        Ok(())
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, MigrationError> {
        let applied: bool = sqlx::query_scalar(
            format!("SELECT EXISTS(SELECT 1 FROM {MIGRATION_TABLE} WHERE version = $1)").as_str(),
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(applied)
    }
}

pub struct CreateUsersTable;

#[async_trait]
impl Migration for CreateUsersTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateUsersTable"
    }

    async fn up(&self, conn: &mut PgConnection) -> Result<(), MigrationError> {
        sqlx::query(r#"CREATE EXTENSION IF NOT EXISTS "pgcrypto""#)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_name TEXT NOT NULL,
                user_phone TEXT NOT NULL UNIQUE,
                user_role TEXT NOT NULL DEFAULT 'user'
                    CHECK (user_role IN ('user', 'manager', 'admin'))
            )"#,
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut PgConnection) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS users CASCADE")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateSessionsTable;

#[async_trait]
impl Migration for CreateSessionsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateSessionsTable"
    }

    async fn up(&self, conn: &mut PgConnection) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id UUID NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                session_role TEXT NOT NULL
                    CHECK (session_role IN ('user', 'manager', 'admin')),
                expires_at TIMESTAMPTZ NOT NULL,
                refresh_expires_at TIMESTAMPTZ NOT NULL
            )"#,
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut PgConnection) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS sessions CASCADE")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateSessionIndexes;

#[async_trait]
impl Migration for CreateSessionIndexes {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateSessionIndexes"
    }

    async fn up(&self, conn: &mut PgConnection) -> Result<(), MigrationError> {
        // Serves both the live-session count and the oldest-first
        // eviction scan.
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_user_role_refresh
            ON sessions (user_id, session_role, refresh_expires_at)"#,
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down(&self, conn: &mut PgConnection) -> Result<(), MigrationError> {
        sqlx::query("DROP INDEX IF EXISTS idx_sessions_user_role_refresh")
            .execute(conn)
            .await?;
        Ok(())
    }
}
