//! Effect runner for the auth session.
//!
//! Front-ends describe what they want as an [`Effect`] and hand it to
//! [`SessionController::run`]. The controller performs the I/O, turns the
//! outcome into [`AuthAction`]s, and applies them with the pure [`reduce`]
//! function. The resulting [`AuthSession`] is published on a
//! `tokio::sync::watch` channel so guards can re-evaluate on every change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::config::Config;
use crate::models::User;

use super::credentials::CredentialStore;
use super::form::LoginForm;
use super::refresh::RefreshCoordinator;
use super::session::{reduce, AuthAction, AuthSession};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Effect {
    /// Determine the authentication status at start-up.
    CheckAuth,
    Login(LoginForm),
    Logout,
}

pub struct SessionController {
    coordinator: Arc<RefreshCoordinator>,
    state: watch::Sender<AuthSession>,
    check_once: OnceCell<()>,
    /// Bumped, under the state lock, whenever a login or logout is applied.
    /// Outcomes of flows started before the bump are stale.
    epoch: AtomicU64,
}

impl SessionController {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        let (state, _) = watch::channel(AuthSession::default());
        Self {
            coordinator,
            state,
            check_once: OnceCell::new(),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config, store: Arc<CredentialStore>) -> Result<Self, ApiError> {
        let client = ApiClient::new(config)?;
        Ok(Self::new(Arc::new(RefreshCoordinator::new(client, store))))
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Current session state.
    pub fn state(&self) -> AuthSession {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.state.subscribe()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn apply(&self, state: &mut AuthSession, action: &AuthAction) {
        debug!(action = action.kind(), "Dispatching auth action");
        if matches!(action, AuthAction::LoginSucceeded(_) | AuthAction::LoggedOut { .. }) {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        *state = reduce(state, action);
    }

    fn dispatch(&self, action: AuthAction) {
        self.state.send_modify(|state| self.apply(state, &action));
    }

    /// Apply `action` unless a login or logout was applied after `epoch`.
    fn dispatch_since(&self, epoch: u64, action: AuthAction) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch() != epoch {
                debug!(action = action.kind(), "Dropping auth action from a superseded flow");
                return false;
            }
            self.apply(state, &action);
            true
        })
    }

    pub async fn run(&self, effect: Effect) -> Result<(), ApiError> {
        match effect {
            Effect::CheckAuth => {
                self.check_auth().await;
                Ok(())
            }
            Effect::Login(form) => self.login(form).await.map(|_| ()),
            Effect::Logout => self.logout().await,
        }
    }

    /// Determine the authentication status. Runs once per controller;
    /// concurrent callers wait for the same run, later calls do nothing.
    pub async fn check_auth(&self) {
        self.check_once.get_or_init(|| self.run_check_auth()).await;
    }

    async fn run_check_auth(&self) {
        if self.state.borrow().checked {
            debug!("Auth already determined, skipping check");
            return;
        }

        let epoch = self.epoch();
        let generation = self.coordinator.store().generation();

        let access = match self.coordinator.store().access() {
            Ok(access) => access,
            Err(e) => {
                error!(error = %e, "Failed to read access credential");
                self.finish_check(epoch, None, Some(ApiError::storage(e).user_message()));
                return;
            }
        };

        if access.is_none() {
            debug!("No access credential, treating as logged out");
            self.finish_check(epoch, None, None);
            return;
        }

        match self.coordinator.fetch_user().await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.finish_check(epoch, Some(user), None);
            }
            Err(err) => {
                warn!(error = %err, "Identity check failed");
                if err.is_refresh_failed() {
                    self.clear_credentials(generation);
                }
                self.finish_check(epoch, None, Some(err.user_message()));
            }
        }
    }

    /// Record the check outcome. A login or logout applied while the check
    /// ran wins: only `checked` is set and its user and error are kept.
    fn finish_check(&self, epoch: u64, user: Option<User>, error: Option<String>) {
        self.state.send_modify(|state| {
            let action = if self.epoch() == epoch {
                AuthAction::AuthChecked { user, error }
            } else {
                debug!("Session changed during the auth check, keeping it");
                AuthAction::AuthChecked {
                    user: state.user.clone(),
                    error: state.error.clone(),
                }
            };
            self.apply(state, &action);
        });
    }

    /// Validate the form, log in, and record the user.
    pub async fn login(&self, form: LoginForm) -> Result<User, ApiError> {
        if let Err(errors) = form.validate() {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            self.dispatch(AuthAction::FormInvalid(message.clone()));
            return Err(ApiError::Validation(message));
        }

        self.dispatch(AuthAction::LoginStarted);

        match self
            .coordinator
            .login(form.email.trim(), &form.password)
            .await
        {
            Ok((user, _)) => {
                self.dispatch(AuthAction::LoginSucceeded(user.clone()));
                Ok(user)
            }
            Err(err) => {
                error!(error = %err, "Login failed");
                self.dispatch(AuthAction::LoginFailed(err.user_message()));
                Err(err)
            }
        }
    }

    /// Log out. Local credentials are always cleared; a failed server call is
    /// only logged.
    pub async fn logout(&self) -> Result<(), ApiError> {
        match self.coordinator.logout().await {
            Ok(()) => {}
            Err(ApiError::Storage(message)) => {
                error!(error = %message, "Failed to clear credentials");
                self.dispatch(AuthAction::LoggedOut {
                    error: Some(message.clone()),
                });
                return Err(ApiError::Storage(message));
            }
            Err(err) => {
                warn!(error = %err, "Logout request failed, local credentials cleared");
            }
        }

        self.dispatch(AuthAction::LoggedOut { error: None });
        Ok(())
    }

    /// Send an authenticated request through the refresh coordinator. An
    /// unrecoverable session ends in the logged-out state, unless a login or
    /// logout completed while the request was in flight.
    pub async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let epoch = self.epoch();
        let generation = self.coordinator.store().generation();

        let result = self.coordinator.send_with_refresh(request).await;
        if let Err(ref err) = result {
            if err.is_refresh_failed() && self.clear_credentials(generation) {
                let logged_out = self.dispatch_since(
                    epoch,
                    AuthAction::LoggedOut {
                        error: Some(err.user_message()),
                    },
                );
                if logged_out {
                    warn!(
                        endpoint = %request.endpoint,
                        "Session could not be refreshed, logged out"
                    );
                }
            }
        }
        result
    }

    /// Clear the store unless it changed since `generation`. Returns whether
    /// the observed session is gone.
    fn clear_credentials(&self, generation: u64) -> bool {
        match self.coordinator.store().clear_if_generation(generation) {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!(error = %e, "Failed to clear credentials");
                true
            }
        }
    }
}
