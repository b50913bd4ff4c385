use async_trait::async_trait;

use crate::error::Error;
use crate::session::{NewSession, SessionId, SessionInfo};
use crate::user::{UserId, UserRole};

/// Repository for session data across both stores. Implementations own
/// the dual-store consistency: the relational row is the source of
/// truth, the cache entry exists only while the session is usable for
/// fast lookup.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Insert the relational row and populate the cache entry, returning
    /// the store-generated id. The relational write must only become
    /// visible if the cache populate succeeded; a concurrent disappearance
    /// of the user surfaces as [`Error::UserNotFound`].
    async fn create(&self, session: NewSession) -> Result<SessionId, Error>;

    /// Cache-only lookup of the denormalized snapshot. An expired cache
    /// entry is indistinguishable from a deleted session; there is no
    /// relational fallback.
    async fn find_info(&self, id: &SessionId) -> Result<SessionInfo, Error>;

    /// Delete the cache entry, then the relational row. Entries already
    /// absent in either store are not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), Error>;

    /// Count live sessions (refresh deadline still in the future) for a
    /// (user, role) pair.
    async fn count_for_role(&self, user_id: &UserId, role: UserRole) -> Result<i64, Error>;

    /// Delete the session with the earliest refresh deadline for a
    /// (user, role) pair; a no-op when none exist.
    async fn delete_oldest(&self, user_id: &UserId, role: UserRole) -> Result<(), Error>;
}
