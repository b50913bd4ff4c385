//! Repository traits for the data access layer.
//!
//! Services depend only on these traits; the concrete Postgres/Redis
//! implementations live in `turnstile-storage` and in-memory fakes serve
//! the unit tests.

pub mod session;
pub mod user;

pub use session::SessionRepository;
pub use user::{UserDirectory, UserRepository};
