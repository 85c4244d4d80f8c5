//! Parameters for constructing an execution context.
//!
//! # Responsibilities
//! - Carry identity, project, site and locale parameters of one context
//! - Keep locale and locale name consistent
//! - Derive the organizational unit from the user name
//! - Reject mutation once frozen

use chrono::{DateTime, Utc};

use crate::config::IdentityConfig;
use crate::context::{ExecutionContext, Locale, SiteMatcher};
use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::{org_unit_of, Project, User};

/// Requested time of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTime {
    /// Resolve to the wall-clock time when stored.
    Current,
    At(DateTime<Utc>),
}

impl RequestTime {
    fn resolve(self) -> DateTime<Utc> {
        match self {
            RequestTime::Current => Utc::now(),
            RequestTime::At(time) => time,
        }
    }
}

/// Describes one execution context before it is built.
///
/// Copies are explicit: [`ContextInfo::copy`] returns an unfrozen value,
/// and the `with_*` functions return a new value with one field overridden.
#[derive(Debug)]
pub struct ContextInfo {
    user_name: String,
    user: Option<User>,
    project_name: String,
    project: Option<Project>,
    requested_uri: String,
    site_root: String,
    request_matcher: SiteMatcher,
    locale: Locale,
    locale_name: String,
    encoding: String,
    remote_addr: String,
    request_time: DateTime<Utc>,
    org_unit: String,
    secure: bool,
    detail_resource: Option<String>,
    frozen: bool,
}

pub const DEFAULT_REMOTE_ADDR: &str = "127.0.0.1";
pub const DEFAULT_URI: &str = "/";

impl ContextInfo {
    /// Defaults: guest user, default project, root site, default locale, now.
    pub fn new(identity: &IdentityConfig) -> Self {
        let locale = identity
            .default_locale
            .parse::<Locale>()
            .unwrap_or_default();
        Self {
            user_name: identity.guest_user.clone(),
            user: None,
            project_name: identity.default_project.clone(),
            project: None,
            requested_uri: DEFAULT_URI.to_string(),
            site_root: "/".to_string(),
            request_matcher: SiteMatcher::default(),
            locale_name: locale.to_string(),
            locale,
            encoding: identity.default_encoding.clone(),
            remote_addr: DEFAULT_REMOTE_ADDR.to_string(),
            request_time: Utc::now(),
            org_unit: org_unit_of(&identity.guest_user),
            secure: false,
            detail_resource: None,
            frozen: false,
        }
    }

    /// Seeded from an existing context; user and project stay resolved.
    pub fn from_context(context: &ExecutionContext) -> Self {
        Self {
            user_name: context.user().name.clone(),
            user: Some(context.user().clone()),
            project_name: context.project().name.clone(),
            project: Some(context.project().clone()),
            requested_uri: context.requested_uri().to_string(),
            site_root: context.site_root().to_string(),
            request_matcher: context.request_matcher().clone(),
            locale_name: context.locale().to_string(),
            locale: context.locale().clone(),
            encoding: context.encoding().to_string(),
            remote_addr: context.remote_addr().to_string(),
            request_time: context.request_time(),
            org_unit: context.org_unit().to_string(),
            secure: context.is_secure(),
            detail_resource: context.detail_resource().map(str::to_string),
            frozen: false,
        }
    }

    /// Every field given explicitly. `org_unit` of `None` derives it from
    /// the user name.
    #[allow(clippy::too_many_arguments)]
    pub fn explicit(
        user_name: &str,
        project_name: &str,
        requested_uri: &str,
        site_root: &str,
        locale_name: &str,
        encoding: &str,
        remote_addr: &str,
        request_time: RequestTime,
        org_unit: Option<&str>,
    ) -> RuntimeResult<Self> {
        let locale: Locale = locale_name.parse()?;
        Ok(Self {
            user_name: user_name.to_string(),
            user: None,
            project_name: project_name.to_string(),
            project: None,
            requested_uri: requested_uri.to_string(),
            site_root: site_root.to_string(),
            request_matcher: SiteMatcher::default(),
            locale_name: locale.to_string(),
            locale,
            encoding: encoding.to_string(),
            remote_addr: remote_addr.to_string(),
            request_time: request_time.resolve(),
            org_unit: org_unit
                .map(str::to_string)
                .unwrap_or_else(|| org_unit_of(user_name)),
            secure: false,
            detail_resource: None,
            frozen: false,
        })
    }

    /// Unfrozen copy of this value.
    pub fn copy(&self) -> Self {
        Self {
            user_name: self.user_name.clone(),
            user: self.user.clone(),
            project_name: self.project_name.clone(),
            project: self.project.clone(),
            requested_uri: self.requested_uri.clone(),
            site_root: self.site_root.clone(),
            request_matcher: self.request_matcher.clone(),
            locale: self.locale.clone(),
            locale_name: self.locale_name.clone(),
            encoding: self.encoding.clone(),
            remote_addr: self.remote_addr.clone(),
            request_time: self.request_time,
            org_unit: self.org_unit.clone(),
            secure: self.secure,
            detail_resource: self.detail_resource.clone(),
            frozen: false,
        }
    }

    /// Make every mutator fail from now on.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_frozen(&self) -> RuntimeResult<()> {
        if self.frozen {
            tracing::error!(user = %self.user_name, "Attempt to modify a frozen context configuration");
            return Err(RuntimeError::FrozenConfig);
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn requested_uri(&self) -> &str {
        &self.requested_uri
    }

    pub fn site_root(&self) -> &str {
        &self.site_root
    }

    pub fn request_matcher(&self) -> &SiteMatcher {
        &self.request_matcher
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn locale_name(&self) -> &str {
        &self.locale_name
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

    // --- Mutators ---

    /// Set the user by name; the organizational unit follows the name.
    pub fn set_user_name(&mut self, name: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.user_name = name.into();
        self.user = None;
        self.org_unit = org_unit_of(&self.user_name);
        Ok(())
    }

    /// Set an already resolved user.
    pub fn set_user(&mut self, user: User) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.user_name = user.name.clone();
        self.org_unit = org_unit_of(&user.name);
        self.user = Some(user);
        Ok(())
    }

    pub fn set_project_name(&mut self, name: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.project_name = name.into();
        self.project = None;
        Ok(())
    }

    pub fn set_project(&mut self, project: Project) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.project_name = project.name.clone();
        self.project = Some(project);
        Ok(())
    }

    pub fn set_requested_uri(&mut self, uri: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.requested_uri = uri.into();
        Ok(())
    }

    pub fn set_site_root(&mut self, site_root: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.site_root = site_root.into();
        Ok(())
    }

    pub fn set_request_matcher(&mut self, matcher: SiteMatcher) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.request_matcher = matcher;
        Ok(())
    }

    /// Set the locale; the locale name is recomputed.
    pub fn set_locale(&mut self, locale: Locale) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.locale_name = locale.to_string();
        self.locale = locale;
        Ok(())
    }

    /// Set the locale by name; the locale is re-resolved and the name stored
    /// in canonical form.
    pub fn set_locale_name(&mut self, name: &str) -> RuntimeResult<()> {
        self.check_frozen()?;
        let locale: Locale = name.parse()?;
        self.locale_name = locale.to_string();
        self.locale = locale;
        Ok(())
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.encoding = encoding.into();
        Ok(())
    }

    pub fn set_remote_addr(&mut self, addr: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.remote_addr = addr.into();
        Ok(())
    }

    pub fn set_request_time(&mut self, time: RequestTime) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.request_time = time.resolve();
        Ok(())
    }

    /// Override the organizational unit derived from the user name.
    pub fn set_org_unit(&mut self, org_unit: impl Into<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.org_unit = org_unit.into();
        Ok(())
    }

    pub fn set_secure(&mut self, secure: bool) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.secure = secure;
        Ok(())
    }

    pub fn set_detail_resource(&mut self, detail: Option<String>) -> RuntimeResult<()> {
        self.check_frozen()?;
        self.detail_resource = detail;
        Ok(())
    }

    // --- Copy-with builders ---

    pub fn with_user_name(&self, name: impl Into<String>) -> RuntimeResult<Self> {
        let mut info = self.copy();
        info.set_user_name(name)?;
        Ok(info)
    }

    pub fn with_project_name(&self, name: impl Into<String>) -> RuntimeResult<Self> {
        let mut info = self.copy();
        info.set_project_name(name)?;
        Ok(info)
    }

    pub fn with_site_root(&self, site_root: impl Into<String>) -> RuntimeResult<Self> {
        let mut info = self.copy();
        info.set_site_root(site_root)?;
        Ok(info)
    }

    pub fn with_requested_uri(&self, uri: impl Into<String>) -> RuntimeResult<Self> {
        let mut info = self.copy();
        info.set_requested_uri(uri)?;
        Ok(info)
    }
}

impl Default for ContextInfo {
    fn default() -> Self {
        Self::new(&IdentityConfig::default())
    }
}
