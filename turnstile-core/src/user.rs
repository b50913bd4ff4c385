//! User model and the DTOs the user-store collaborator accepts.
//!
//! Users are owned by the user store; the session lifecycle only reads
//! them (name and role) while authorizing a creation. The core user
//! record is:
//!
//! | Field   | Type       | Description                                  |
//! | ------- | ---------- | -------------------------------------------- |
//! | `id`    | `UserId`   | Unique identifier, generated by the store.   |
//! | `name`  | `String`   | Display name, whitespace-normalized.         |
//! | `phone` | `String`   | Unique contact number, `+7` plus ten digits. |
//! | `role`  | `UserRole` | Highest role the user may act under.         |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FieldError, ValidationErrors};
use crate::validation::{validate_name, validate_phone, validate_role, validate_user_id};

/// A unique, stable identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
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

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a user (or a session) acts under.
///
/// The declaration order is the privilege order, so the derived `Ord`
/// gives `User < Manager < Admin`. Keeping this a closed enum (rather
/// than a level table) makes the ordering impossible to mutate at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Manager,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::User, UserRole::Manager, UserRole::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
        }
    }

    /// Numeric privilege level, `0` for the lowest role.
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "manager" => Ok(UserRole::Manager),
            "admin" => Ok(UserRole::Admin),
            other => Err(FieldError::InvalidRole {
                value: other.to_string(),
            }),
        }
    }
}

/// A user record as stored by the user-store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
}

/// The narrow projection the session lifecycle needs: display name and
/// the role the user currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub role: UserRole,
}

/// Raw request to create a user. `role` defaults to `user` when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub phone: String,
    pub role: Option<String>,
}

/// A validated, normalized user ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub phone: String,
    pub role: Option<UserRole>,
}

impl CreateUser {
    /// Validate every field, reporting all failures together. The name is
    /// whitespace-normalized before matching and before storage.
    pub fn validate(&self) -> Result<NewUser, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = errors.record(validate_name(&self.name));
        let phone = errors.record(validate_phone(&self.phone));
        let role = match self.role.as_deref() {
            Some(raw) => errors.record(validate_role(raw)),
            None => None,
        };

        match (name, phone) {
            (Some(name), Some(phone)) if errors.is_empty() => Ok(NewUser { name, phone, role }),
            _ => Err(errors),
        }
    }
}

/// Raw partial-update request; only the present fields are validated and
/// changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUser {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

/// A validated partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub id: UserId,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
}

impl UpdateUser {
    pub fn validate(&self) -> Result<UserUpdate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let id = errors.record(validate_user_id(&self.id));
        let name = match self.name.as_deref() {
            Some(raw) => errors.record(validate_name(raw)),
            None => None,
        };
        let phone = match self.phone.as_deref() {
            Some(raw) => errors.record(validate_phone(raw)),
            None => None,
        };
        let role = match self.role.as_deref() {
            Some(raw) => errors.record(validate_role(raw)),
            None => None,
        };

        match id {
            Some(id) if errors.is_empty() => Ok(UserUpdate {
                id,
                name,
                phone,
                role,
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_matches_privilege() {
        assert!(UserRole::User < UserRole::Manager);
        assert!(UserRole::Manager < UserRole::Admin);
        assert_eq!(UserRole::User.level(), 0);
        assert_eq!(UserRole::Admin.level(), 2);
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!(matches!(
            "root".parse::<UserRole>(),
            Err(FieldError::InvalidRole { .. })
        ));
    }

    #[test]
    fn create_user_normalizes_name() {
        let request = CreateUser {
            name: "  Anna   Petrova ".to_string(),
            phone: "+79161234567".to_string(),
            role: None,
        };
        let new_user = request.validate().unwrap();
        assert_eq!(new_user.name, "Anna Petrova");
        assert_eq!(new_user.role, None);
    }

    #[test]
    fn create_user_reports_every_failure() {
        let request = CreateUser {
            name: "42".to_string(),
            phone: "12345".to_string(),
            role: Some("root".to_string()),
        };
        let errors = request.validate().unwrap_err();
        assert_eq!(
            errors.causes(),
            [
                FieldError::InvalidName,
                FieldError::InvalidPhone {
                    value: "12345".to_string()
                },
                FieldError::InvalidRole {
                    value: "root".to_string()
                },
            ]
        );
    }

    #[test]
    fn update_user_validates_only_present_fields() {
        let request = UpdateUser {
            id: Uuid::new_v4().to_string(),
            name: None,
            phone: Some("+79160000000".to_string()),
            role: None,
        };
        let update = request.validate().unwrap();
        assert_eq!(update.phone.as_deref(), Some("+79160000000"));
        assert_eq!(update.name, None);

        let bad = UpdateUser {
            id: "nope".to_string(),
            name: None,
            phone: None,
            role: Some("root".to_string()),
        };
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
