//! Session model and the DTOs the lifecycle operations accept.
//!
//! A session is one logical entity split across two physical stores:
//!
//! | Field                | Type            | Description                                       |
//! | -------------------- | --------------- | ------------------------------------------------- |
//! | `id`                 | `SessionId`     | Generated by the relational store on insert.      |
//! | `user_id`            | `UserId`        | Owning user; must exist at creation time.         |
//! | `session_role`       | `UserRole`      | Granted role, never above the user's own role.    |
//! | `expires_at`         | `DateTime<Utc>` | Short usability deadline; drives the cache TTL.   |
//! | `refresh_expires_at` | `DateTime<Utc>` | Renewability deadline; drives eviction ordering.  |
//!
//! The cache holds only the denormalized [`SessionInfo`] projection, and
//! only while the entry's TTL has not elapsed. Sessions are immutable
//! once issued; there is no partial update.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationErrors;
use crate::user::{UserId, UserRole};
use crate::validation::{validate_role, validate_user_id};

/// A unique identifier for a session, opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The relational row: the authority for a session's existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub session_role: UserRole,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl Session {
    /// Past the short deadline: no longer usable for fast lookup.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Still within the refresh deadline: counts as live for the
    /// concurrency cap.
    pub fn is_live(&self) -> bool {
        Utc::now() < self.refresh_expires_at
    }
}

/// The denormalized snapshot served from the cache. `user_role` is the
/// granted session role, not necessarily the user's top role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub user_name: String,
    pub user_role: UserRole,
}

/// Raw request to create a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub user_id: String,
    pub session_role: String,
}

impl CreateSession {
    pub fn validate(&self) -> Result<(UserId, UserRole), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let user_id = errors.record(validate_user_id(&self.user_id));
        let role = errors.record(validate_role(&self.session_role));

        match (user_id, role) {
            (Some(user_id), Some(role)) if errors.is_empty() => Ok((user_id, role)),
            _ => Err(errors),
        }
    }
}

/// Raw (user, role) pair for the count and eviction operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFilter {
    pub user_id: String,
    pub session_role: String,
}

impl SessionFilter {
    pub fn validate(&self) -> Result<(UserId, UserRole), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let user_id = errors.record(validate_user_id(&self.user_id));
        let role = errors.record(validate_role(&self.session_role));

        match (user_id, role) {
            (Some(user_id), Some(role)) if errors.is_empty() => Ok((user_id, role)),
            _ => Err(errors),
        }
    }
}

/// Everything the repository needs to insert a session and populate its
/// cache entry. Built by the service after the directory lookup, so the
/// snapshot name is the one the user store holds right now.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: UserId,
    pub session_role: UserRole,
    pub user_name: String,
    pub ttl: Duration,
    pub refresh_ttl: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    #[test]
    fn create_session_joins_all_causes() {
        let request = CreateSession {
            user_id: "not-a-uuid".to_string(),
            session_role: "root".to_string(),
        };
        let errors = request.validate().unwrap_err();
        assert_eq!(
            errors.causes(),
            [
                FieldError::InvalidIdentifier { field: "user_id" },
                FieldError::InvalidRole {
                    value: "root".to_string()
                },
            ]
        );
    }

    #[test]
    fn create_session_yields_typed_values() {
        let user_id = Uuid::new_v4();
        let request = CreateSession {
            user_id: user_id.to_string(),
            session_role: "manager".to_string(),
        };
        let (id, role) = request.validate().unwrap();
        assert_eq!(id.into_inner(), user_id);
        assert_eq!(role, UserRole::Manager);
    }

    #[test]
    fn expiry_deadlines_are_nested() {
        let now = Utc::now();
        let session = Session {
            id: SessionId::new_random(),
            user_id: UserId::new_random(),
            session_role: UserRole::User,
            expires_at: now - Duration::minutes(1),
            refresh_expires_at: now + Duration::hours(1),
        };
        // Usability elapsed, but the session still counts toward the cap.
        assert!(session.is_expired());
        assert!(session.is_live());
    }
}
