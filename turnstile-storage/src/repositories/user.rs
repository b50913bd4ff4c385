//! PostgreSQL-backed user repository.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use turnstile_core::repositories::{UserDirectory, UserRepository};
use turnstile_core::{Error, NewUser, User, UserId, UserProfile, UserRole, UserUpdate};

use super::is_unique_violation;

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PgUser {
    user_id: Uuid,
    user_name: String,
    user_phone: String,
    user_role: String,
}

impl TryFrom<PgUser> for User {
    type Error = Error;

    fn try_from(row: PgUser) -> Result<Self, Error> {
        // The CHECK constraint keeps roles within the known set, so a
        // parse failure here means the schema and the enum disagree.
        let role: UserRole = row
            .user_role
            .parse()
            .map_err(|e: turnstile_core::FieldError| Error::Relational(Box::new(e)))?;
        Ok(User {
            id: UserId::new(row.user_id),
            name: row.user_name,
            phone: row.user_phone,
            role,
        })
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: NewUser) -> Result<UserId, Error> {
        let role = user.role.unwrap_or(UserRole::User);
        let user_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (user_name, user_phone, user_role)
            VALUES ($1, $2, $3)
            RETURNING user_id
            "#,
        )
        .bind(&user.name)
        .bind(&user.phone)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return Error::UniqueViolation(user.phone.clone());
            }
            tracing::error!(error = %e, "failed to insert user");
            Error::Relational(Box::new(e))
        })?;

        Ok(UserId::new(user_id))
    }

    async fn find_by_id(&self, id: &UserId) -> Result<User, Error> {
        let row: Option<PgUser> = sqlx::query_as(
            "SELECT user_id, user_name, user_phone, user_role FROM users WHERE user_id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to fetch user by id");
            Error::Relational(Box::new(e))
        })?;

        row.ok_or(Error::UserNotFound)?.try_into()
    }

    async fn find_by_phone(&self, phone: &str) -> Result<User, Error> {
        let row: Option<PgUser> = sqlx::query_as(
            "SELECT user_id, user_name, user_phone, user_role FROM users WHERE user_phone = $1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to fetch user by phone");
            Error::Relational(Box::new(e))
        })?;

        row.ok_or(Error::UserNotFound)?.try_into()
    }

    async fn update(&self, changes: UserUpdate) -> Result<(), Error> {
        if changes.name.is_none() && changes.phone.is_none() && changes.role.is_none() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut fields = builder.separated(", ");
        if let Some(name) = &changes.name {
            fields.push("user_name = ");
            fields.push_bind_unseparated(name);
        }
        if let Some(phone) = &changes.phone {
            fields.push("user_phone = ");
            fields.push_bind_unseparated(phone);
        }
        if let Some(role) = changes.role {
            fields.push("user_role = ");
            fields.push_bind_unseparated(role.as_str());
        }
        builder.push(" WHERE user_id = ");
        builder.push_bind(changes.id.into_inner());

        let result = builder.build().execute(&self.pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                return Error::UniqueViolation(changes.phone.clone().unwrap_or_default());
            }
            tracing::error!(error = %e, "failed to update user");
            Error::Relational(Box::new(e))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        // Sessions go with the user via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to delete user");
                Error::Relational(Box::new(e))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PostgresUserRepository {
    async fn lookup(&self, id: &UserId) -> Result<UserProfile, Error> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT user_name, user_role FROM users WHERE user_id = $1")
                .bind(id.into_inner())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "failed to look up user profile");
                    Error::Relational(Box::new(e))
                })?;

        let (name, role) = row.ok_or(Error::UserNotFound)?;
        let role: UserRole = role
            .parse()
            .map_err(|e: turnstile_core::FieldError| Error::Relational(Box::new(e)))?;
        Ok(UserProfile { name, role })
    }
}
