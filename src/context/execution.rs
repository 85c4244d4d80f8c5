//! The resolved identity/site/locale bundle one operation runs under.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::{Locale, SiteMatcher};
use crate::identity::{Project, Role, User};

/// Execution context of a single request or operation.
///
/// Built by the [`ExecutionContextFactory`](crate::context::ExecutionContextFactory),
/// owned by the operation that requested it and dropped at its end.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    user: User,
    project: Project,
    site_root: String,
    requested_uri: String,
    request_matcher: SiteMatcher,
    locale: Locale,
    encoding: String,
    remote_addr: String,
    request_time: DateTime<Utc>,
    org_unit: String,
    secure: bool,
    detail_resource: Option<String>,
    update_session_enabled: bool,
}

/// Parts an [`ExecutionContext`] is assembled from.
pub(crate) struct ExecutionParts {
    pub user: User,
    pub project: Project,
    pub site_root: String,
    pub requested_uri: String,
    pub request_matcher: SiteMatcher,
    pub locale: Locale,
    pub encoding: String,
    pub remote_addr: String,
    pub request_time: DateTime<Utc>,
    pub org_unit: String,
    pub secure: bool,
    pub detail_resource: Option<String>,
}

impl ExecutionContext {
    pub(crate) fn from_parts(parts: ExecutionParts) -> Self {
        Self {
            user: parts.user,
            project: parts.project,
            site_root: parts.site_root,
            requested_uri: parts.requested_uri,
            request_matcher: parts.request_matcher,
            locale: parts.locale,
            encoding: parts.encoding,
            remote_addr: parts.remote_addr,
            request_time: parts.request_time,
            org_unit: parts.org_unit,
            secure: parts.secure,
            detail_resource: parts.detail_resource,
            update_session_enabled: true,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn site_root(&self) -> &str {
        &self.site_root
    }

    pub fn requested_uri(&self) -> &str {
        &self.requested_uri
    }

    pub fn request_matcher(&self) -> &SiteMatcher {
        &self.request_matcher
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
    }

    pub fn org_unit(&self) -> &str {
        &self.org_unit
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn detail_resource(&self) -> Option<&str> {
        self.detail_resource.as_deref()
    }

    /// Whether the session record follows changes made in this context.
    pub fn is_update_session_enabled(&self) -> bool {
        self.update_session_enabled
    }

    /// Whether the context's user holds `role` for `org_unit`.
    pub fn has_role(&self, role: Role, org_unit: &str) -> bool {
        self.user.enabled && self.user.has_role(role, org_unit)
    }

    pub fn set_project(&mut self, project: Project) {
        self.project = project;
    }

    pub fn set_site_root(&mut self, site_root: impl Into<String>) {
        self.site_root = site_root.into();
    }

    pub fn set_org_unit(&mut self, org_unit: impl Into<String>) {
        self.org_unit = org_unit.into();
    }

    pub fn set_requested_uri(&mut self, uri: impl Into<String>) {
        self.requested_uri = uri.into();
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    pub fn set_detail_resource(&mut self, detail: Option<String>) {
        self.detail_resource = detail;
    }

    /// Long-running background operations disable session updates.
    pub fn set_update_session_enabled(&mut self, enabled: bool) {
        self.update_session_enabled = enabled;
    }
}
