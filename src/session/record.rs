//! Session identifiers and per-session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::identity::{ProjectId, UserId};
use crate::session::BroadcastQueue;

/// Opaque session token carried in the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// State of one authenticated session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: UserId,
    pub user_name: String,
    pub project_id: ProjectId,
    pub site_root: String,
    pub org_unit: String,
    pub max_inactive: Duration,
    pub queue: Arc<BroadcastQueue>,
    pub last_update: DateTime<Utc>,
}

impl SessionRecord {
    /// Record for `context`, bound to session `id`.
    pub fn new(
        id: SessionId,
        context: &ExecutionContext,
        max_inactive: Duration,
        queue_capacity: usize,
    ) -> Self {
        Self {
            id,
            user_id: context.user().id,
            user_name: context.user().name.clone(),
            project_id: context.project().id,
            site_root: context.site_root().to_string(),
            org_unit: context.org_unit().to_string(),
            max_inactive,
            queue: Arc::new(BroadcastQueue::new(queue_capacity)),
            last_update: Utc::now(),
        }
    }

    /// Whether the inactivity interval has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.max_inactive) {
            Ok(max) => now - self.last_update > max,
            Err(_) => false,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            project_id: self.project_id,
            site_root: self.site_root.clone(),
            org_unit: self.org_unit.clone(),
            last_update: self.last_update,
            max_inactive_secs: self.max_inactive.as_secs(),
            pending_broadcasts: self.queue.len(),
        }
    }
}

/// Serializable view of a record for operator listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub user_id: UserId,
    pub user_name: String,
    pub project_id: ProjectId,
    pub site_root: String,
    pub org_unit: String,
    pub last_update: DateTime<Utc>,
    pub max_inactive_secs: u64,
    pub pending_broadcasts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_round_trips_through_text() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-token".parse::<SessionId>().is_err());
    }
}
