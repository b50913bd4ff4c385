//! Service layer for business logic.
//!
//! [`SessionService`] is the session lifecycle manager and the sole
//! writer of session data in both stores; [`UserService`] is a
//! validating front for the user-store collaborator.

pub mod session;
pub mod user;

pub use session::SessionService;
pub use user::UserService;
