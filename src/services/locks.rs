//! In-memory lock manager.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

use crate::error::BoxError;
use crate::identity::UserId;
use crate::services::LockManager;

/// Tracks temporary resource locks per user.
///
/// Nothing is persisted, so replay restores nothing.
#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    temporary: DashMap<UserId, HashSet<String>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `resource` for `user` until their last session ends.
    pub fn lock_temporary(&self, user: UserId, resource: impl Into<String>) {
        self.temporary.entry(user).or_default().insert(resource.into());
    }

    pub fn temporary_locks(&self, user: UserId) -> usize {
        self.temporary.get(&user).map(|locks| locks.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn replay_persisted_locks(&self) -> Result<usize, BoxError> {
        Ok(0)
    }

    async fn release_temporary_locks(&self, user: UserId) -> Result<usize, BoxError> {
        let released = self
            .temporary
            .remove(&user)
            .map(|(_, locks)| locks.len())
            .unwrap_or(0);
        if released > 0 {
            tracing::debug!(user = %user, released, "Released temporary locks");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_release_drops_only_that_user() {
        let locks = InMemoryLockManager::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        locks.lock_temporary(alice, "/sites/default/index.html");
        locks.lock_temporary(alice, "/sites/default/news.html");
        locks.lock_temporary(bob, "/sites/default/about.html");

        assert_eq!(locks.release_temporary_locks(alice).await.unwrap(), 2);
        assert_eq!(locks.release_temporary_locks(alice).await.unwrap(), 0);
        assert_eq!(locks.temporary_locks(bob), 1);
    }
}
