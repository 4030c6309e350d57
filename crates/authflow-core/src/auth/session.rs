use serde::{Deserialize, Serialize};

use crate::models::User;

/// In-memory record of whether authentication status is known and who the
/// current user is.
///
/// `checked` starts false and turns true once the first determination
/// completes; nothing sets it back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub checked: bool,
    pub user: Option<User>,
    pub pending: bool,
    pub error: Option<String>,
}

impl AuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// State transitions. Produced by the effect runner, applied by [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AuthAction {
    /// The start-up identity check finished.
    AuthChecked {
        user: Option<User>,
        error: Option<String>,
    },
    /// The login form failed validation; nothing was sent.
    FormInvalid(String),
    LoginStarted,
    LoginSucceeded(User),
    LoginFailed(String),
    /// User logged out, or the session could not be recovered.
    LoggedOut { error: Option<String> },
}

impl AuthAction {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthAction::AuthChecked { .. } => "auth_checked",
            AuthAction::FormInvalid(_) => "form_invalid",
            AuthAction::LoginStarted => "login_started",
            AuthAction::LoginSucceeded(_) => "login_succeeded",
            AuthAction::LoginFailed(_) => "login_failed",
            AuthAction::LoggedOut { .. } => "logged_out",
        }
    }
}

/// Compute the next session state. Pure: no I/O, no clock.
pub fn reduce(state: &AuthSession, action: &AuthAction) -> AuthSession {
    let mut next = state.clone();
    match action {
        AuthAction::AuthChecked { user, error } => {
            next.checked = true;
            next.user = user.clone();
            next.error = error.clone();
        }
        AuthAction::FormInvalid(message) => {
            next.error = Some(message.clone());
        }
        AuthAction::LoginStarted => {
            next.pending = true;
            next.error = None;
        }
        AuthAction::LoginSucceeded(user) => {
            next.checked = true;
            next.pending = false;
            next.user = Some(user.clone());
            next.error = None;
        }
        AuthAction::LoginFailed(message) => {
            next.checked = true;
            next.pending = false;
            next.error = Some(message.clone());
        }
        AuthAction::LoggedOut { error } => {
            next.user = None;
            next.pending = false;
            next.error = error.clone();
        }
    }
    next
}
