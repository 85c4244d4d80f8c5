//! Raw HTTP sessions behind the session cookie.
//!
//! An HTTP session exists for every client that logged in, whether or not a
//! [`SessionRecord`](crate::session::SessionRecord) is bound to it yet. The
//! store answers liveness checks for the registry and reports creation and
//! destruction to an [`HttpSessionListener`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RuntimeError, RuntimeResult};
use crate::session::SessionId;

/// Attribute caching the workplace start settings of a session.
pub const WORKPLACE_SETTINGS_ATTR: &str = "workplace_settings";

/// Liveness of the HTTP session behind a record.
pub trait SessionLiveness: Send + Sync {
    fn is_alive(&self, id: &SessionId) -> bool;
}

/// Notified when HTTP sessions come and go.
#[async_trait]
pub trait HttpSessionListener: Send + Sync {
    fn session_created(&self, id: SessionId);

    async fn session_destroyed(&self, id: SessionId);
}

#[derive(Debug, Clone)]
struct HttpSession {
    created: DateTime<Utc>,
    last_access: DateTime<Utc>,
    max_inactive: Duration,
    attributes: HashMap<String, Value>,
}

impl HttpSession {
    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.max_inactive) {
            Ok(max) => now - self.last_access > max,
            Err(_) => false,
        }
    }
}

/// In-memory HTTP session store.
pub struct HttpSessionStore {
    sessions: DashMap<SessionId, HttpSession>,
    max_inactive: Duration,
    listener: Option<Arc<dyn HttpSessionListener>>,
}

impl HttpSessionStore {
    pub fn new(max_inactive: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_inactive,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn HttpSessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Open a new session.
    pub fn create(&self) -> SessionId {
        let id = SessionId::new();
        let now = Utc::now();
        self.sessions.insert(
            id,
            HttpSession {
                created: now,
                last_access: now,
                max_inactive: self.max_inactive,
                attributes: HashMap::new(),
            },
        );
        if let Some(listener) = &self.listener {
            listener.session_created(id);
        }
        id
    }

    /// Mark the session as accessed. False when it is missing or expired.
    pub fn touch(&self, id: &SessionId) -> bool {
        let now = Utc::now();
        match self.sessions.get_mut(id) {
            Some(mut session) if !session.expired_at(now) => {
                session.last_access = now;
                true
            }
            _ => false,
        }
    }

    pub fn created_at(&self, id: &SessionId) -> Option<DateTime<Utc>> {
        self.sessions.get(id).map(|session| session.created)
    }

    pub fn set_max_inactive(&self, id: &SessionId, max_inactive: Duration) -> RuntimeResult<()> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))?;
        session.max_inactive = max_inactive;
        Ok(())
    }

    pub fn attribute(&self, id: &SessionId, key: &str) -> Option<Value> {
        self.sessions
            .get(id)
            .and_then(|session| session.attributes.get(key).cloned())
    }

    pub fn set_attribute(&self, id: &SessionId, key: &str, value: Value) -> RuntimeResult<()> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))?;
        session.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove_attribute(&self, id: &SessionId, key: &str) -> Option<Value> {
        self.sessions
            .get_mut(id)
            .and_then(|mut session| session.attributes.remove(key))
    }

    /// Destroy the session. Returns false if it did not exist.
    pub async fn invalidate(&self, id: &SessionId) -> bool {
        if self.sessions.remove(id).is_none() {
            return false;
        }
        if let Some(listener) = &self.listener {
            listener.session_destroyed(*id).await;
        }
        true
    }

    /// Destroy every session. Returns how many were destroyed.
    pub async fn invalidate_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let mut destroyed = 0;
        for id in ids {
            if self.invalidate(&id).await {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Destroy every session idle for longer than its interval at `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().expired_at(now))
            .map(|entry| *entry.key())
            .collect();

        let mut purged = 0;
        for id in expired {
            // Re-check: the session may have been touched since the snapshot.
            let removed = self
                .sessions
                .remove_if(&id, |_, session| session.expired_at(now))
                .is_some();
            if removed {
                purged += 1;
                if let Some(listener) = &self.listener {
                    listener.session_destroyed(id).await;
                }
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "Purged expired HTTP sessions");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionLiveness for HttpSessionStore {
    fn is_alive(&self, id: &SessionId) -> bool {
        self.sessions
            .get(id)
            .map(|session| !session.expired_at(Utc::now()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        created: Mutex<Vec<SessionId>>,
        destroyed: Mutex<Vec<SessionId>>,
    }

    #[async_trait]
    impl HttpSessionListener for Recorder {
        fn session_created(&self, id: SessionId) {
            self.created.lock().push(id);
        }

        async fn session_destroyed(&self, id: SessionId) {
            self.destroyed.lock().push(id);
        }
    }

    #[tokio::test]
    async fn test_create_and_invalidate_notify_listener() {
        let recorder = Arc::new(Recorder::default());
        let store = HttpSessionStore::new(Duration::from_secs(60)).with_listener(recorder.clone());

        let id = store.create();
        assert!(store.is_alive(&id));
        assert_eq!(*recorder.created.lock(), vec![id]);

        assert!(store.invalidate(&id).await);
        assert!(!store.invalidate(&id).await);
        assert!(!store.is_alive(&id));
        assert_eq!(*recorder.destroyed.lock(), vec![id]);
    }

    #[tokio::test]
    async fn test_purge_expired_only_removes_idle_sessions() {
        let recorder = Arc::new(Recorder::default());
        let store = HttpSessionStore::new(Duration::from_secs(60)).with_listener(recorder.clone());
        let idle = store.create();
        let busy = store.create();
        store.set_max_inactive(&busy, Duration::from_secs(3600)).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.purge_expired(later).await, 1);
        assert_eq!(*recorder.destroyed.lock(), vec![idle]);
        assert!(store.is_alive(&busy));
    }

    #[test]
    fn test_attributes() {
        let store = HttpSessionStore::new(Duration::from_secs(60));
        let id = store.create();
        store
            .set_attribute(&id, WORKPLACE_SETTINGS_ATTR, json!({"project": "Offline"}))
            .unwrap();
        assert_eq!(
            store.attribute(&id, WORKPLACE_SETTINGS_ATTR),
            Some(json!({"project": "Offline"}))
        );
        assert!(store.remove_attribute(&id, WORKPLACE_SETTINGS_ATTR).is_some());
        assert!(store.attribute(&id, WORKPLACE_SETTINGS_ATTR).is_none());

        let unknown = SessionId::new();
        assert!(matches!(
            store.set_attribute(&unknown, "k", json!(1)),
            Err(RuntimeError::SessionNotFound(_))
        ));
    }
}
