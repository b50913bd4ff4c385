//! Repository implementations over PostgreSQL and Redis.

pub mod session;
pub mod user;

pub use session::DualStoreSessionRepository;
pub use user::PostgresUserRepository;

/// SQLSTATE for foreign-key violations.
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for unique-constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate(err) == Some(FOREIGN_KEY_VIOLATION.to_string())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err) == Some(UNIQUE_VIOLATION.to_string())
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}
