//! Route guarding.
//!
//! Pure decisions over [`AuthSession`]: show a loading indicator until the
//! auth status is known, then either render the route or redirect.

use serde::{Deserialize, Serialize};

use crate::auth::AuthSession;
use crate::config::Config;

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAccess {
    /// Logged-in users only.
    Protected,
    /// Logged-out users only, e.g. the login page.
    AnonymousOnly,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Render the loading indicator and nothing else.
    Loading,
    /// Navigate to `to`. With `replace` the guarded page is not kept in
    /// history, so going back does not land on it again.
    Redirect { to: String, replace: bool },
    /// Render the guarded content.
    Render,
}

/// Decision for a protected route.
pub fn guard_protected(session: &AuthSession, login_route: &str) -> GuardDecision {
    if !session.checked {
        return GuardDecision::Loading;
    }
    match session.user {
        Some(_) => GuardDecision::Render,
        None => GuardDecision::Redirect {
            to: login_route.to_string(),
            replace: true,
        },
    }
}

/// Decision for a route only logged-out users should see.
pub fn guard_anonymous(session: &AuthSession, home_route: &str) -> GuardDecision {
    if !session.checked {
        return GuardDecision::Loading;
    }
    match session.user {
        Some(_) => GuardDecision::Redirect {
            to: home_route.to_string(),
            replace: true,
        },
        None => GuardDecision::Render,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_route: String,
    home_route: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new("/login", "/")
    }
}

impl RouteGuard {
    pub fn new(login_route: impl Into<String>, home_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
            home_route: home_route.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.login_route.clone(), config.home_route.clone())
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub fn decide(&self, access: RouteAccess, session: &AuthSession) -> GuardDecision {
        match access {
            RouteAccess::Protected => guard_protected(session, &self.login_route),
            RouteAccess::AnonymousOnly => guard_anonymous(session, &self.home_route),
            RouteAccess::Public => GuardDecision::Render,
        }
    }
}
