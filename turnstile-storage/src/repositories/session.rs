//! The dual-store session repository.
//!
//! Creation stages the PostgreSQL row inside a transaction, populates
//! the Redis hash, and commits only once the cache write has succeeded,
//! so a cache failure leaves no trace in either store. A crash after
//! commit but before the caller learns the result can still leave a row
//! with no cache entry; such a row stays visible to the count and
//! eviction queries and ages out at its refresh deadline, it is just
//! unreachable through the fast-path lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

use turnstile_core::repositories::SessionRepository;
use turnstile_core::{Error, NewSession, SessionId, SessionInfo, UserId, UserRole};

use super::is_foreign_key_violation;

pub struct DualStoreSessionRepository {
    pool: PgPool,
    cache: ConnectionManager,
}

fn cache_key(id: &SessionId) -> String {
    format!("sessions:{id}")
}

impl DualStoreSessionRepository {
    pub fn new(pool: PgPool, cache: ConnectionManager) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl SessionRepository for DualStoreSessionRepository {
    async fn create(&self, session: NewSession) -> Result<SessionId, Error> {
        let now = Utc::now();
        let expires_at = now + session.ttl;
        let refresh_expires_at = now + session.refresh_ttl;

        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "failed to open session transaction");
            Error::Relational(Box::new(e))
        })?;

        let session_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO sessions (user_id, session_role, expires_at, refresh_expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING session_id
            "#,
        )
        .bind(session.user_id.into_inner())
        .bind(session.session_role.as_str())
        .bind(expires_at)
        .bind(refresh_expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            // The user can be deleted between the directory lookup and
            // this insert; that is a missing user, not a store fault.
            if is_foreign_key_violation(&e) {
                return Error::UserNotFound;
            }
            tracing::error!(error = %e, "failed to insert session row");
            Error::Relational(Box::new(e))
        })?;

        let id = SessionId::new(session_id);
        let key = cache_key(&id);
        let fields = [
            ("user_id", session.user_id.to_string()),
            ("user_name", session.user_name.clone()),
            ("user_role", session.session_role.to_string()),
        ];

        let mut cache = self.cache.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, session.ttl.num_seconds())
            .ignore();
        let populated: Result<(), redis::RedisError> = pipe.query_async(&mut cache).await;

        if let Err(e) = populated {
            tracing::error!(error = %e, session_id = %id, "failed to populate session cache, rolling back");
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(error = %rollback, "failed to roll back session transaction");
            }
            return Err(Error::Cache(Box::new(e)));
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "failed to commit session transaction");
            Error::Relational(Box::new(e))
        })?;

        Ok(id)
    }

    async fn find_info(&self, id: &SessionId) -> Result<SessionInfo, Error> {
        let mut cache = self.cache.clone();
        let fields: HashMap<String, String> =
            cache.hgetall(cache_key(id)).await.map_err(|e| {
                tracing::error!(error = %e, "failed to read session cache");
                Error::Cache(Box::new(e))
            })?;

        if fields.is_empty() {
            return Err(Error::SessionNotFound);
        }
        decode_info(&fields)
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        // Cache first: a row without a cache entry is merely unreachable
        // via the fast path, while a cache entry without a row would
        // resurrect a revoked session.
        let mut cache = self.cache.clone();
        let _: () = cache.del(cache_key(id)).await.map_err(|e| {
            tracing::error!(error = %e, "failed to delete session cache entry");
            Error::Cache(Box::new(e))
        })?;

        // Zero rows affected means the session was already gone.
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to delete session row");
                Error::Relational(Box::new(e))
            })?;

        Ok(())
    }

    async fn count_for_role(&self, user_id: &UserId, role: UserRole) -> Result<i64, Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE user_id = $1 AND session_role = $2 AND refresh_expires_at > $3
            "#,
        )
        .bind(user_id.into_inner())
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to count sessions");
            Error::Relational(Box::new(e))
        })
    }

    async fn delete_oldest(&self, user_id: &UserId, role: UserRole) -> Result<(), Error> {
        let oldest: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT session_id FROM sessions
            WHERE user_id = $1 AND session_role = $2
            ORDER BY refresh_expires_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id.into_inner())
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to select oldest session");
            Error::Relational(Box::new(e))
        })?;

        match oldest {
            Some(session_id) => self.delete(&SessionId::new(session_id)).await,
            None => Ok(()),
        }
    }
}

fn decode_info(fields: &HashMap<String, String>) -> Result<SessionInfo, Error> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| Error::Cache(format!("session hash missing field {name:?}").into()))
    };

    let user_id = Uuid::parse_str(field("user_id")?).map_err(|e| Error::Cache(Box::new(e)))?;
    let user_role: UserRole = field("user_role")?
        .parse()
        .map_err(|e| Error::Cache(Box::new(e)))?;

    Ok(SessionInfo {
        user_id: UserId::new(user_id),
        user_name: field("user_name")?.clone(),
        user_role,
    })
}
