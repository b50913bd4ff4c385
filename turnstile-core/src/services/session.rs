use std::sync::Arc;

use chrono::Duration;

use crate::config::{SessionConfig, SessionLifetime};
use crate::error::Error;
use crate::repositories::{SessionRepository, UserDirectory};
use crate::session::{CreateSession, NewSession, SessionFilter, SessionId, SessionInfo};
use crate::user::{UserId, UserProfile, UserRole};
use crate::validation::validate_session_id;

/// The session lifecycle manager.
///
/// Orchestrates creation (validate, resolve the user, authorize the
/// requested role, write both stores), count-capped admission with
/// oldest-session eviction, deletion, and the cache-only fast lookup.
pub struct SessionService<S: SessionRepository, D: UserDirectory> {
    sessions: Arc<S>,
    directory: Arc<D>,
    config: SessionConfig,
}

impl<S: SessionRepository, D: UserDirectory> SessionService<S, D> {
    pub fn new(sessions: Arc<S>, directory: Arc<D>, config: SessionConfig) -> Self {
        Self {
            sessions,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue a session under one of the configured deadline pairs,
    /// keeping the (user, role) pair within the configured cap by
    /// evicting the oldest session first.
    pub async fn issue_session(
        &self,
        request: &CreateSession,
        lifetime: SessionLifetime,
    ) -> Result<SessionId, Error> {
        let (user_id, role) = request.validate()?;
        let profile = self.authorize(&user_id, role).await?;
        self.enforce_session_cap(&user_id, role, self.config.max_sessions_per_role)
            .await?;
        let ttls = self.config.ttls(lifetime);
        self.insert(user_id, role, profile, ttls.ttl(), ttls.refresh_ttl())
            .await
    }

    /// Create a session with explicit deadlines and no cap enforcement.
    /// Callers that need the cap wrap this with
    /// [`enforce_session_cap`](Self::enforce_session_cap) or use
    /// [`issue_session`](Self::issue_session).
    pub async fn create_session(
        &self,
        request: &CreateSession,
        ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<SessionId, Error> {
        let (user_id, role) = request.validate()?;
        let profile = self.authorize(&user_id, role).await?;
        self.insert(user_id, role, profile, ttl, refresh_ttl).await
    }

    /// Fast-path lookup of the denormalized snapshot. Reads only the
    /// cache; a session whose cache entry has expired reports
    /// [`Error::SessionNotFound`] even while its relational row remains.
    pub async fn find_session_info(&self, id: &str) -> Result<SessionInfo, Error> {
        let id = validate_session_id(id)?;
        self.sessions.find_info(&id).await
    }

    /// Delete a session from both stores. Deleting an already-gone
    /// session is a no-op.
    pub async fn delete_session(&self, id: &str) -> Result<(), Error> {
        let id = validate_session_id(id)?;
        self.sessions.delete(&id).await?;
        tracing::debug!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Count live sessions for a (user, role) pair.
    pub async fn session_count(&self, filter: &SessionFilter) -> Result<i64, Error> {
        let (user_id, role) = filter.validate()?;
        self.sessions.count_for_role(&user_id, role).await
    }

    /// Evict the oldest session for a (user, role) pair. A no-op when the
    /// pair has no sessions.
    pub async fn delete_oldest_session(&self, filter: &SessionFilter) -> Result<(), Error> {
        let (user_id, role) = filter.validate()?;
        self.sessions.delete_oldest(&user_id, role).await
    }

    /// Keep the number of live sessions for (user, role) within `max` by
    /// evicting the single oldest session when the count has reached it.
    ///
    /// The count and the eviction are separate store round-trips with no
    /// inter-request lock, so the cap is a soft bound: two racing
    /// creations can each observe count < max and both insert.
    pub async fn enforce_session_cap(
        &self,
        user_id: &UserId,
        role: UserRole,
        max: u32,
    ) -> Result<(), Error> {
        let count = self.sessions.count_for_role(user_id, role).await?;
        if count >= i64::from(max) {
            self.sessions.delete_oldest(user_id, role).await?;
            tracing::debug!(user_id = %user_id, role = %role, "evicted oldest session to stay within cap");
        }
        Ok(())
    }

    /// Re-reads the user's role from the directory on every call; the
    /// granted role may never exceed it.
    async fn authorize(&self, user_id: &UserId, requested: UserRole) -> Result<UserProfile, Error> {
        let profile = self.directory.lookup(user_id).await?;
        if requested > profile.role {
            return Err(Error::RoleMismatch {
                requested,
                actual: profile.role,
            });
        }
        Ok(profile)
    }

    async fn insert(
        &self,
        user_id: UserId,
        role: UserRole,
        profile: UserProfile,
        ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<SessionId, Error> {
        let id = self
            .sessions
            .create(NewSession {
                user_id,
                session_role: role,
                user_name: profile.name,
                ttl,
                refresh_ttl,
            })
            .await?;
        tracing::debug!(session_id = %id, user_id = %user_id, role = %role, "session issued");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    struct StoredRow {
        user_id: UserId,
        role: UserRole,
        refresh_expires_at: DateTime<Utc>,
    }

    /// In-memory stand-in for the dual-store repository: a "relational"
    /// row map plus a "cache" snapshot map, kept in step the way the
    /// real implementation keeps Postgres and Redis.
    #[derive(Default)]
    struct InMemorySessions {
        rows: Mutex<HashMap<SessionId, StoredRow>>,
        cache: Mutex<HashMap<SessionId, SessionInfo>>,
        fail_cache_writes: AtomicBool,
    }

    impl InMemorySessions {
        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SessionRepository for InMemorySessions {
        async fn create(&self, session: NewSession) -> Result<SessionId, Error> {
            if self.fail_cache_writes.load(Ordering::SeqCst) {
                // Cache populate failed before commit: nothing persists.
                return Err(Error::Cache("cache unavailable".into()));
            }
            let id = SessionId::new_random();
            self.rows.lock().unwrap().insert(
                id,
                StoredRow {
                    user_id: session.user_id,
                    role: session.session_role,
                    refresh_expires_at: Utc::now() + session.refresh_ttl,
                },
            );
            self.cache.lock().unwrap().insert(
                id,
                SessionInfo {
                    user_id: session.user_id,
                    user_name: session.user_name,
                    user_role: session.session_role,
                },
            );
            Ok(id)
        }

        async fn find_info(&self, id: &SessionId) -> Result<SessionInfo, Error> {
            self.cache
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(Error::SessionNotFound)
        }

        async fn delete(&self, id: &SessionId) -> Result<(), Error> {
            self.cache.lock().unwrap().remove(id);
            self.rows.lock().unwrap().remove(id);
            Ok(())
        }

        async fn count_for_role(&self, user_id: &UserId, role: UserRole) -> Result<i64, Error> {
            let now = Utc::now();
            let count = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|row| {
                    row.user_id == *user_id && row.role == role && row.refresh_expires_at > now
                })
                .count();
            Ok(count as i64)
        }

        async fn delete_oldest(&self, user_id: &UserId, role: UserRole) -> Result<(), Error> {
            let oldest = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, row)| row.user_id == *user_id && row.role == role)
                .min_by_key(|(_, row)| row.refresh_expires_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => self.delete(&id).await,
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct InMemoryDirectory {
        users: Mutex<HashMap<UserId, UserProfile>>,
    }

    impl InMemoryDirectory {
        fn with_user(name: &str, role: UserRole) -> (Self, UserId) {
            let id = UserId::new_random();
            let directory = Self::default();
            directory.users.lock().unwrap().insert(
                id,
                UserProfile {
                    name: name.to_string(),
                    role,
                },
            );
            (directory, id)
        }
    }

    #[async_trait]
    impl UserDirectory for InMemoryDirectory {
        async fn lookup(&self, id: &UserId) -> Result<UserProfile, Error> {
            self.users
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(Error::UserNotFound)
        }
    }

    fn service(
        directory: InMemoryDirectory,
        config: SessionConfig,
    ) -> (
        SessionService<InMemorySessions, InMemoryDirectory>,
        Arc<InMemorySessions>,
    ) {
        let sessions = Arc::new(InMemorySessions::default());
        let service = SessionService::new(sessions.clone(), Arc::new(directory), config);
        (service, sessions)
    }

    fn request(user_id: &UserId, role: &str) -> CreateSession {
        CreateSession {
            user_id: user_id.to_string(),
            session_role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips_the_snapshot() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::Manager);
        let (service, _) = service(directory, SessionConfig::default());

        let id = service
            .create_session(
                &request(&user_id, "manager"),
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap();

        let info = service.find_session_info(&id.to_string()).await.unwrap();
        assert_eq!(info.user_id, user_id);
        assert_eq!(info.user_name, "Anna Petrova");
        assert_eq!(info.user_role, UserRole::Manager);
    }

    #[tokio::test]
    async fn granted_role_may_be_below_the_users_role() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::Admin);
        let (service, _) = service(directory, SessionConfig::default());

        let id = service
            .create_session(
                &request(&user_id, "user"),
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap();

        let info = service.find_session_info(&id.to_string()).await.unwrap();
        // The snapshot carries the granted role, not the user's top role.
        assert_eq!(info.user_role, UserRole::User);
    }

    #[tokio::test]
    async fn role_escalation_is_rejected_before_any_write() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::Manager);
        let (service, sessions) = service(directory, SessionConfig::default());

        let err = service
            .create_session(
                &request(&user_id, "admin"),
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::RoleMismatch {
                requested: UserRole::Admin,
                actual: UserRole::Manager,
            }
        ));
        assert_eq!(sessions.row_count(), 0);
        assert_eq!(
            service
                .session_count(&SessionFilter {
                    user_id: user_id.to_string(),
                    session_role: "admin".to_string(),
                })
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn unknown_user_is_reported_before_any_write() {
        let (service, sessions) = service(InMemoryDirectory::default(), SessionConfig::default());

        let err = service
            .create_session(
                &request(&UserId::new_random(), "user"),
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UserNotFound));
        assert_eq!(sessions.row_count(), 0);
    }

    #[tokio::test]
    async fn invalid_input_short_circuits_with_all_causes() {
        let (service, sessions) = service(InMemoryDirectory::default(), SessionConfig::default());

        let err = service
            .create_session(
                &CreateSession {
                    user_id: "not-a-uuid".to_string(),
                    session_role: "root".to_string(),
                },
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap_err();

        match err {
            Error::Validation(errors) => assert_eq!(
                errors.causes(),
                [
                    FieldError::InvalidIdentifier { field: "user_id" },
                    FieldError::InvalidRole {
                        value: "root".to_string()
                    },
                ]
            ),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(sessions.row_count(), 0);

        let err = service.find_session_info("also-not-a-uuid").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::User);
        let (service, _) = service(directory, SessionConfig::default());

        let id = service
            .create_session(
                &request(&user_id, "user"),
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap();
        let id = id.to_string();

        service.delete_session(&id).await.unwrap();
        service.delete_session(&id).await.unwrap();

        let err = service.find_session_info(&id).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound));
    }

    #[tokio::test]
    async fn cap_evicts_the_session_with_the_earliest_refresh_deadline() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::User);
        let (service, _) = service(directory, SessionConfig::default());
        let req = request(&user_id, "user");

        // Three creations with strictly increasing refresh deadlines. The
        // cap is enforced by the caller after admission, so all three
        // exist before eviction runs; with no inter-request lock this is
        // exactly the transient overshoot the soft bound allows.
        let first = service
            .create_session(&req, Duration::minutes(15), Duration::hours(1))
            .await
            .unwrap();
        let second = service
            .create_session(&req, Duration::minutes(15), Duration::hours(2))
            .await
            .unwrap();
        let third = service
            .create_session(&req, Duration::minutes(15), Duration::hours(3))
            .await
            .unwrap();

        service
            .enforce_session_cap(&user_id, UserRole::User, 2)
            .await
            .unwrap();

        let filter = SessionFilter {
            user_id: user_id.to_string(),
            session_role: "user".to_string(),
        };
        assert_eq!(service.session_count(&filter).await.unwrap(), 2);
        assert!(matches!(
            service.find_session_info(&first.to_string()).await,
            Err(Error::SessionNotFound)
        ));
        assert!(service.find_session_info(&second.to_string()).await.is_ok());
        assert!(service.find_session_info(&third.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn cap_enforcement_without_sessions_is_a_noop() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::User);
        let (service, _) = service(directory, SessionConfig::default());

        service
            .enforce_session_cap(&user_id, UserRole::User, 2)
            .await
            .unwrap();

        let filter = SessionFilter {
            user_id: user_id.to_string(),
            session_role: "user".to_string(),
        };
        assert_eq!(service.session_count(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn issue_session_applies_the_configured_cap() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::Manager);
        let config = SessionConfig {
            max_sessions_per_role: 1,
            ..SessionConfig::default()
        };
        let (service, _) = service(directory, config);
        let req = request(&user_id, "manager");

        let first = service
            .issue_session(&req, SessionLifetime::Standard)
            .await
            .unwrap();
        let second = service
            .issue_session(&req, SessionLifetime::Standard)
            .await
            .unwrap();

        assert!(matches!(
            service.find_session_info(&first.to_string()).await,
            Err(Error::SessionNotFound)
        ));
        assert!(service.find_session_info(&second.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn cache_failures_surface_unchanged() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::User);
        let (service, sessions) = service(directory, SessionConfig::default());
        sessions.fail_cache_writes.store(true, Ordering::SeqCst);

        let err = service
            .create_session(
                &request(&user_id, "user"),
                Duration::minutes(15),
                Duration::hours(24),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cache(_)));
        assert_eq!(sessions.row_count(), 0);
    }

    #[tokio::test]
    async fn session_ids_are_opaque_uuids() {
        let (directory, user_id) = InMemoryDirectory::with_user("Anna Petrova", UserRole::User);
        let (service, _) = service(directory, SessionConfig::default());

        let id = service
            .issue_session(&request(&user_id, "user"), SessionLifetime::Short)
            .await
            .unwrap();
        assert!(Uuid::parse_str(&id.to_string()).is_ok());
    }
}
