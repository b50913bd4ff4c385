//! Core functionality for the turnstile session service.
//!
//! Turnstile issues, looks up, and revokes role-scoped sessions backed by
//! two stores: a durable relational record (the source of truth) and a
//! fast key-value cache serving session-info reads. This crate holds the
//! domain model, the validation layer, the error taxonomy, the repository
//! traits, and the service layer that orchestrates the session lifecycle.
//!
//! Concrete store implementations live in `turnstile-storage`; anything in
//! here depends only on the repository traits, so the services can be
//! exercised against in-memory fakes.

pub mod config;
pub mod error;
pub mod repositories;
pub mod services;
pub mod session;
pub mod user;
pub mod validation;

pub use config::{SessionConfig, SessionLifetime, TtlPair};
pub use error::{Error, FieldError, ValidationErrors};
pub use session::{CreateSession, NewSession, Session, SessionFilter, SessionId, SessionInfo};
pub use user::{CreateUser, NewUser, UpdateUser, User, UserId, UserProfile, UserRole, UserUpdate};
