use async_trait::async_trait;

use crate::error::Error;
use crate::user::{NewUser, User, UserId, UserProfile, UserUpdate};

/// The narrow contract the session lifecycle consumes from the user
/// store: resolve a user's display name and current role.
///
/// The lifecycle re-reads this on every session creation; role
/// information is never cached for authorization decisions.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Look up a user's profile. Fails with [`Error::UserNotFound`] when
    /// the user does not exist.
    async fn lookup(&self, id: &UserId) -> Result<UserProfile, Error>;
}

/// Repository for user records. Plain single-store persistence, a
/// collaborator of the session lifecycle rather than part of it.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Insert a user, returning the store-generated id. A duplicate phone
    /// fails with [`Error::UniqueViolation`].
    async fn create(&self, user: NewUser) -> Result<UserId, Error>;

    async fn find_by_id(&self, id: &UserId) -> Result<User, Error>;

    async fn find_by_phone(&self, phone: &str) -> Result<User, Error>;

    /// Apply the present fields of a partial update. Updating a missing
    /// user fails with [`Error::UserNotFound`].
    async fn update(&self, changes: UserUpdate) -> Result<(), Error>;

    /// Remove a user and, through the store, their sessions. Deleting a
    /// missing user fails with [`Error::UserNotFound`].
    async fn delete(&self, id: &UserId) -> Result<(), Error>;
}
