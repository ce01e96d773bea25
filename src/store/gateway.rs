use std::ops::Deref;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    entities::{SessionEntity, SessionKind, SessionPatch, UserEntity},
    error::StoreResult,
};

/// Create/update contract for session rows. This is the only surface the
/// lifecycle manager mutates through, so a remote backend can replace the
/// file-backed one without touching the state machine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new open session and returns it with its assigned id.
    async fn create(
        &self,
        user_id: u64,
        kind: SessionKind,
        start_time: DateTime<Utc>,
    ) -> StoreResult<SessionEntity>;

    /// Applies a patch to the open session with the given id.
    async fn update(&self, session_id: u64, patch: SessionPatch) -> StoreResult<()>;

    /// All sessions of a user whose `start_time` is at or after `from`,
    /// oldest first.
    async fn sessions_since(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionEntity>>;
}

#[async_trait]
impl<T> SessionStore for T
where
    T: Deref + Send + Sync,
    T::Target: SessionStore + Sync,
{
    async fn create(
        &self,
        user_id: u64,
        kind: SessionKind,
        start_time: DateTime<Utc>,
    ) -> StoreResult<SessionEntity> {
        self.deref().create(user_id, kind, start_time).await
    }

    async fn update(&self, session_id: u64, patch: SessionPatch) -> StoreResult<()> {
        self.deref().update(session_id, patch).await
    }

    async fn sessions_since(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionEntity>> {
        self.deref().sessions_since(user_id, from).await
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_or_get(&self, username: &str) -> StoreResult<UserEntity>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserEntity>>;

    async fn set_online(&self, user_id: u64, online: bool) -> StoreResult<()>;

    async fn online_users(&self) -> StoreResult<Vec<UserEntity>>;
}

#[async_trait]
impl<T> UserStore for T
where
    T: Deref + Send + Sync,
    T::Target: UserStore + Sync,
{
    async fn create_or_get(&self, username: &str) -> StoreResult<UserEntity> {
        self.deref().create_or_get(username).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserEntity>> {
        self.deref().find_by_username(username).await
    }

    async fn set_online(&self, user_id: u64, online: bool) -> StoreResult<()> {
        self.deref().set_online(user_id, online).await
    }

    async fn online_users(&self) -> StoreResult<Vec<UserEntity>> {
        self.deref().online_users().await
    }
}
