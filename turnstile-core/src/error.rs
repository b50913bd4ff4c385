use thiserror::Error;

use crate::user::UserRole;

/// Transport-level error from an underlying store driver, carried as a
/// source so diagnostics are never swallowed.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// One or more field-level validation failures, all of them reported.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("user not found")]
    UserNotFound,

    #[error("session not found")]
    SessionNotFound,

    /// The requested session role exceeds the role the user actually holds.
    #[error("role mismatch: requested {requested}, user has {actual}")]
    RoleMismatch {
        requested: UserRole,
        actual: UserRole,
    },

    /// A uniqueness constraint was violated, e.g. a duplicate phone number.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("relational store failure")]
    Relational(#[source] StoreError),

    #[error("cache store failure")]
    Cache(#[source] StoreError),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::UserNotFound | Error::SessionNotFound)
    }

    /// True when the failure came from one of the two stores rather than
    /// from the request itself.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::Relational(_) | Error::Cache(_))
    }
}

impl From<FieldError> for Error {
    fn from(cause: FieldError) -> Self {
        Error::Validation(ValidationErrors::from(cause))
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("invalid identifier in {field:?}: expected a well-formed non-nil uuid")]
    InvalidIdentifier { field: &'static str },

    #[error("invalid name: expected letters and spaces, 1 to 100 characters")]
    InvalidName,

    #[error("invalid phone {value:?}: expected +7 followed by 10 digits")]
    InvalidPhone { value: String },

    #[error("invalid role {value:?}: expected one of \"user\", \"manager\", \"admin\"")]
    InvalidRole { value: String },
}

/// Every failure found while validating a request, in field order.
///
/// Tests and callers inspect [`causes`](Self::causes) structurally instead
/// of matching on the rendered message.
#[derive(Debug, Default)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cause: FieldError) {
        self.0.push(cause);
    }

    /// Record the outcome of a single field validator, keeping the value
    /// on success and the cause on failure.
    pub fn record<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(cause) => {
                self.0.push(cause);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn causes(&self) -> &[FieldError] {
        &self.0
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(cause: FieldError) -> Self {
        Self(vec![cause])
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed")?;
        for (i, cause) in self.0.iter().enumerate() {
            if i == 0 {
                write!(f, ": {cause}")?;
            } else {
                write!(f, "; {cause}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_every_cause() {
        let mut errors = ValidationErrors::new();
        errors.push(FieldError::InvalidIdentifier { field: "user_id" });
        errors.push(FieldError::InvalidRole {
            value: "root".to_string(),
        });

        let rendered = errors.to_string();
        assert!(rendered.contains("user_id"));
        assert!(rendered.contains("root"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn causes_are_matched_structurally() {
        let mut errors = ValidationErrors::new();
        errors.push(FieldError::InvalidPhone {
            value: "12345".to_string(),
        });

        assert_eq!(
            errors.causes(),
            [FieldError::InvalidPhone {
                value: "12345".to_string()
            }]
        );
    }

    #[test]
    fn error_classification_helpers() {
        let validation = Error::from(FieldError::InvalidName);
        assert!(validation.is_validation());
        assert!(!validation.is_store_failure());

        assert!(Error::UserNotFound.is_not_found());
        assert!(Error::SessionNotFound.is_not_found());

        let cache = Error::Cache("connection reset".into());
        assert!(cache.is_store_failure());
        assert!(!cache.is_not_found());
    }

    #[test]
    fn role_mismatch_names_both_roles() {
        let err = Error::RoleMismatch {
            requested: UserRole::Admin,
            actual: UserRole::Manager,
        };
        assert_eq!(err.to_string(), "role mismatch: requested admin, user has manager");
    }
}
