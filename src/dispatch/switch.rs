//! Switching the user of a live session.

use serde::Serialize;

use crate::context::{ContextInfo, ExecutionContext};
use crate::dispatch::RequestDispatchCore;
use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::Role;
use crate::services::RuntimeEvent;
use crate::session::{SessionId, SessionRecord, WORKPLACE_SETTINGS_ATTR};

/// Landing page when the target user has no direct edit path.
pub const DEFAULT_LANDING_PATH: &str = "/";

#[derive(Debug)]
pub struct SwitchOutcome {
    pub context: ExecutionContext,
    /// Where the client should go next.
    pub landing: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchResponse {
    pub user: String,
    pub landing: String,
}

impl From<&SwitchOutcome> for SwitchResponse {
    fn from(outcome: &SwitchOutcome) -> Self {
        Self {
            user: outcome.context.user().name.clone(),
            landing: outcome.landing.clone(),
        }
    }
}

impl RequestDispatchCore {
    /// Replace the user of `session` with `target`.
    ///
    /// The caller needs the root admin role for the target's organizational
    /// unit, and the target must be at least an element author. The session
    /// id stays the same; cached workplace settings are discarded.
    pub async fn switch_user(
        &self,
        caller: &ExecutionContext,
        session: SessionId,
        target: &str,
    ) -> RuntimeResult<SwitchOutcome> {
        let target = self.store.read_user(target).await?;
        let org_unit = target.org_unit();

        if !caller.has_role(Role::RootAdmin, &org_unit) {
            tracing::warn!(
                caller = %caller.user().name,
                target = %target.name,
                "Rejected user switch without root admin role"
            );
            return Err(RuntimeError::PrivilegeViolation(format!(
                "switching to {:?} requires the root administrator role for {org_unit}",
                target.name
            )));
        }
        if !target.has_role(Role::ElementAuthor, &org_unit) {
            return Err(RuntimeError::PrivilegeViolation(format!(
                "{:?} is not an element author and cannot be switched to",
                target.name
            )));
        }

        let record = self
            .registry
            .get(&session)
            .ok_or_else(|| RuntimeError::SessionNotFound(session.to_string()))?;

        let mut info = ContextInfo::from_context(caller);
        info.set_user(target.clone())?;
        info.set_project_name(self.factory.identity_config().default_project.clone())?;
        let mut context = self.factory.build_unchecked(&info).await?;
        self.login.apply_start_settings(&mut context).await;

        let mut replacement = SessionRecord::new(
            session,
            &context,
            record.max_inactive,
            self.registry.queue_capacity(),
        );
        replacement.queue = record.queue.clone();
        self.registry.put(replacement).await?;
        self.http_sessions
            .remove_attribute(&session, WORKPLACE_SETTINGS_ATTR);

        self.events.publish(RuntimeEvent::UserSwitched {
            session,
            from: record.user_name,
            to: target.name.clone(),
        });

        Ok(SwitchOutcome {
            context,
            landing: target
                .direct_edit_path
                .unwrap_or_else(|| DEFAULT_LANDING_PATH.to_string()),
        })
    }
}
