//! Concurrent registry of authenticated sessions.
//!
//! # Design Decisions
//! - `sessions` is the source of truth; `by_user` is a derived index whose
//!   stale entries are pruned on read
//! - Every mutation runs under `write_lock`, so the single-session check
//!   and the insert are one step
//! - Index locks are taken before record locks, never the other way round
//! - `validate` and `broadcast` walk a key snapshot and skip records that
//!   disappear meanwhile

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::context::ExecutionContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::{org_unit_of, ProjectId, Role, UserId};
use crate::observability::metrics;
use crate::services::{EventSink, LockManager, RuntimeEvent};
use crate::session::http::{HttpSessionListener, SessionLiveness};
use crate::session::{BroadcastMessage, SessionId, SessionRecord};

/// Which sessions a broadcast reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    All,
    User(UserId),
    Session(SessionId),
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionRecord>,
    by_user: DashMap<UserId, HashSet<SessionId>>,
    write_lock: Mutex<()>,
    created_total: AtomicU64,
    active: AtomicU64,
    single_session: bool,
    queue_capacity: usize,
    lock_manager: Arc<dyn LockManager>,
    events: Arc<dyn EventSink>,
}

impl SessionRegistry {
    pub fn new(
        config: &SessionConfig,
        lock_manager: Arc<dyn LockManager>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            write_lock: Mutex::new(()),
            created_total: AtomicU64::new(0),
            active: AtomicU64::new(0),
            single_session: config.single_session,
            queue_capacity: config.broadcast_queue_size,
            lock_manager,
            events,
        }
    }

    pub fn is_single_session(&self) -> bool {
        self.single_session
    }

    /// Capacity given to the broadcast queue of new records.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Insert or replace `record`.
    ///
    /// In single-session mode a live record of the same user under another
    /// id rejects the call with [`RuntimeError::ConcurrentLogin`] and nothing
    /// is written. Replacing a record keeps its pending broadcasts.
    pub async fn put(&self, mut record: SessionRecord) -> RuntimeResult<()> {
        let abandoned = {
            let _guard = self.write_lock.lock();

            if self.single_session {
                let others = self
                    .live_ids_for_user(record.user_id)
                    .into_iter()
                    .any(|id| id != record.id);
                if others {
                    tracing::warn!(
                        user = %record.user_name,
                        session = %record.id,
                        "Rejected concurrent login in single-session mode"
                    );
                    return Err(RuntimeError::ConcurrentLogin {
                        user: record.user_name.clone(),
                    });
                }
            }

            let previous = self
                .sessions
                .get(&record.id)
                .map(|existing| (existing.queue.clone(), existing.user_id));

            let mut abandoned = None;
            if let Some((queue, previous_user)) = previous {
                record.queue = queue;
                if previous_user != record.user_id && self.unindex(previous_user, record.id) {
                    abandoned = Some(previous_user);
                }
            }

            self.by_user
                .entry(record.user_id)
                .or_default()
                .insert(record.id);
            self.sessions.insert(record.id, record);
            abandoned
        };

        if let Some(user) = abandoned {
            self.release_locks(user).await;
        }
        Ok(())
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.get(id).map(|record| record.clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get_all_for_user(&self, user: UserId) -> Vec<SessionRecord> {
        self.live_ids_for_user(user)
            .into_iter()
            .filter_map(|id| self.get(&id))
            .collect()
    }

    pub fn all(&self) -> Vec<SessionRecord> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Merge per-request state into a record. False if it no longer exists.
    pub fn update(
        &self,
        id: &SessionId,
        project: ProjectId,
        site_root: &str,
        org_unit: &str,
    ) -> bool {
        let _guard = self.write_lock.lock();
        match self.sessions.get_mut(id) {
            Some(mut record) => {
                record.project_id = project;
                record.site_root = site_root.to_string();
                record.org_unit = org_unit.to_string();
                record.last_update = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Record activity without changing state.
    pub fn touch(&self, id: &SessionId) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut record) => {
                record.last_update = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove a record. The user's temporary locks are released when it was
    /// their last session.
    pub async fn remove(&self, id: &SessionId) -> Option<SessionRecord> {
        let (record, last) = {
            let _guard = self.write_lock.lock();
            let (_, record) = self.sessions.remove(id)?;
            let last = self.unindex(record.user_id, record.id);
            (record, last)
        };

        self.events.publish(RuntimeEvent::SessionDestroyed {
            session: record.id,
            user: record.user_id,
        });
        if last {
            self.release_locks(record.user_id).await;
        }
        Some(record)
    }

    /// Remove one session on behalf of `caller`.
    ///
    /// Requires the account manager role for the session user's
    /// organizational unit.
    pub async fn kill_session(
        &self,
        caller: &ExecutionContext,
        id: &SessionId,
    ) -> RuntimeResult<SessionRecord> {
        let record = self
            .get(id)
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))?;
        Self::check_account_manager(caller, &record.user_name)?;

        tracing::info!(
            caller = %caller.user().name,
            session = %id,
            user = %record.user_name,
            "Killing session"
        );
        self.remove(id)
            .await
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))
    }

    /// Remove every session of `user` on behalf of `caller`.
    pub async fn kill_all(
        &self,
        caller: &ExecutionContext,
        user: UserId,
    ) -> RuntimeResult<Vec<SessionId>> {
        let records = self.get_all_for_user(user);
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        Self::check_account_manager(caller, &first.user_name)?;

        tracing::info!(
            caller = %caller.user().name,
            user = %first.user_name,
            sessions = records.len(),
            "Killing all sessions of user"
        );
        let mut killed = Vec::with_capacity(records.len());
        for record in records {
            if self.remove(&record.id).await.is_some() {
                killed.push(record.id);
            }
        }
        Ok(killed)
    }

    /// Drop records whose HTTP session is gone or whose inactivity interval
    /// has elapsed. Returns the removed ids.
    pub async fn validate(&self, liveness: &dyn SessionLiveness) -> Vec<SessionId> {
        let now = Utc::now();
        let keys: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();

        let mut removed = Vec::new();
        for id in keys {
            let stale = match self.sessions.get(&id) {
                Some(record) => record.is_expired(now) || !liveness.is_alive(&id),
                None => continue,
            };
            if stale && self.remove(&id).await.is_some() {
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "Removed stale session records");
        }
        removed
    }

    /// Queue `message` for every session matching `target`. Returns the
    /// number of queues reached.
    pub fn broadcast(&self, message: &BroadcastMessage, target: BroadcastTarget) -> usize {
        let keys: Vec<SessionId> = match target {
            BroadcastTarget::All => self.sessions.iter().map(|entry| *entry.key()).collect(),
            BroadcastTarget::User(user) => self.live_ids_for_user(user),
            BroadcastTarget::Session(id) => vec![id],
        };

        let mut delivered = 0;
        for id in keys {
            let Some(queue) = self.sessions.get(&id).map(|record| record.queue.clone()) else {
                continue;
            };
            queue.add(message.clone());
            delivered += 1;
        }
        metrics::record_broadcast(delivered);
        delivered
    }

    /// Sessions ever opened.
    pub fn created_total(&self) -> u64 {
        self.created_total.load(Ordering::Relaxed)
    }

    /// Open HTTP sessions.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Records currently registered.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of `user` that still resolve to one of their records; prunes the rest.
    fn live_ids_for_user(&self, user: UserId) -> Vec<SessionId> {
        let Some(mut ids) = self.by_user.get_mut(&user) else {
            return Vec::new();
        };
        ids.retain(|id| {
            self.sessions
                .get(id)
                .map(|record| record.user_id == user)
                .unwrap_or(false)
        });
        ids.iter().copied().collect()
    }

    /// Drop `id` from the index of `user`. True when no session of the user remains.
    fn unindex(&self, user: UserId, id: SessionId) -> bool {
        let empty = match self.by_user.get_mut(&user) {
            Some(mut ids) => {
                ids.remove(&id);
                ids.retain(|other| {
                    self.sessions
                        .get(other)
                        .map(|record| record.user_id == user)
                        .unwrap_or(false)
                });
                ids.is_empty()
            }
            None => true,
        };
        if empty {
            self.by_user.remove_if(&user, |_, ids| ids.is_empty());
        }
        empty
    }

    async fn release_locks(&self, user: UserId) {
        match self.lock_manager.release_temporary_locks(user).await {
            Ok(released) => {
                tracing::debug!(user = %user, released, "Last session ended, temporary locks released")
            }
            Err(e) => tracing::warn!(user = %user, error = %e, "Failed to release temporary locks"),
        }
    }

    fn check_account_manager(caller: &ExecutionContext, user_name: &str) -> RuntimeResult<()> {
        let org_unit = org_unit_of(user_name);
        if caller.has_role(Role::AccountManager, &org_unit) {
            return Ok(());
        }
        tracing::warn!(
            caller = %caller.user().name,
            org_unit = %org_unit,
            "Rejected session kill without account manager role"
        );
        Err(RuntimeError::PrivilegeViolation(format!(
            "managing sessions in {org_unit} requires the account manager role"
        )))
    }
}

#[async_trait]
impl HttpSessionListener for SessionRegistry {
    fn session_created(&self, id: SessionId) {
        self.created_total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        metrics::record_session_created();
        tracing::trace!(session = %id, "HTTP session created");
    }

    async fn session_destroyed(&self, id: SessionId) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
        metrics::record_session_destroyed();
        self.remove(&id).await;
    }
}
