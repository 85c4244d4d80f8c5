//! Runtime events and the sink they are published to.

use serde::Serialize;

use crate::identity::UserId;
use crate::session::SessionId;

/// Something operators or auditing may care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Login {
        user: UserId,
        user_name: String,
        remote_addr: String,
    },
    Logout {
        session: SessionId,
        user_name: String,
    },
    SessionDestroyed {
        session: SessionId,
        user: UserId,
    },
    UserSwitched {
        session: SessionId,
        from: String,
        to: String,
    },
}

/// Receives runtime events. Must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RuntimeEvent);
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: RuntimeEvent) {
        match &event {
            RuntimeEvent::Login {
                user_name,
                remote_addr,
                ..
            } => tracing::info!(user = %user_name, remote_addr = %remote_addr, "User logged in"),
            RuntimeEvent::Logout { session, user_name } => {
                tracing::info!(session = %session, user = %user_name, "User logged out")
            }
            RuntimeEvent::SessionDestroyed { session, user } => {
                tracing::debug!(session = %session, user = %user, "Session destroyed")
            }
            RuntimeEvent::UserSwitched { session, from, to } => {
                tracing::info!(session = %session, from = %from, to = %to, "User switched")
            }
        }
    }
}
