//! Field validators shared by every mutating entry point.
//!
//! Each validator returns the typed (and, for names, normalized) value,
//! so repositories only ever see input that has already passed here.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::FieldError;
use crate::session::SessionId;
use crate::user::{UserId, UserRole};

/// Latin or Cyrillic letters and spaces, 1 to 100 characters, checked
/// after whitespace normalization.
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Zа-яА-Я\s]{1,100}$").expect("invalid name regex"));

/// National format: country prefix and exactly ten digits.
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+7\d{10}$").expect("invalid phone regex"));

fn parse_id(value: &str, field: &'static str) -> Result<Uuid, FieldError> {
    let id = Uuid::parse_str(value).map_err(|_| FieldError::InvalidIdentifier { field })?;
    if id.is_nil() {
        return Err(FieldError::InvalidIdentifier { field });
    }
    Ok(id)
}

pub fn validate_user_id(value: &str) -> Result<UserId, FieldError> {
    parse_id(value, "user_id").map(UserId::new)
}

pub fn validate_session_id(value: &str) -> Result<SessionId, FieldError> {
    parse_id(value, "session_id").map(SessionId::new)
}

/// Collapses internal whitespace runs to single spaces, trims, then
/// matches. Returns the normalized name, which is what gets stored.
pub fn validate_name(value: &str) -> Result<String, FieldError> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() || !NAME_REGEX.is_match(&normalized) {
        return Err(FieldError::InvalidName);
    }
    Ok(normalized)
}

pub fn validate_phone(value: &str) -> Result<String, FieldError> {
    if !PHONE_REGEX.is_match(value) {
        return Err(FieldError::InvalidPhone {
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

pub fn validate_role(value: &str) -> Result<UserRole, FieldError> {
    value.parse()
}
