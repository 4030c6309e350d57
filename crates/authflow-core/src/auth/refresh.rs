//! Token refresh and replay.
//!
//! `RefreshCoordinator::send_with_refresh` sends a request with the stored
//! access credential. When the server answers 401 or 403 it exchanges the
//! refresh credential for a new pair, stores the pair, and replays the
//! original request once. The replay result is returned as-is, so a server
//! that keeps answering 401 cannot cause a refresh loop.
//!
//! Refreshes are serialized. A request chain that waited on the lock while
//! another chain refreshed sees a newer store generation and replays with
//! the credential that refresh produced; if that refresh failed, the waiter
//! gets the same failure instead of trying again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::models::{LoginResponse, LogoutResponse, TokenResponse, User, UserResponse};

use super::credentials::{AccessCredential, CredentialPair, CredentialStore};

#[derive(Debug, Clone)]
struct RefreshFailure {
    generation: u64,
    status: Option<u16>,
    message: String,
}

impl RefreshFailure {
    fn to_error(&self) -> ApiError {
        ApiError::RefreshFailed {
            status: self.status,
            message: self.message.clone(),
        }
    }
}

pub struct RefreshCoordinator {
    client: ApiClient,
    store: Arc<CredentialStore>,
    /// Serializes refresh attempts; holds the outcome of the last failed one.
    last_failure: Mutex<Option<RefreshFailure>>,
    /// Number of completed refresh attempts.
    attempts: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(client: ApiClient, store: Arc<CredentialStore>) -> Self {
        Self {
            client,
            store,
            last_failure: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Send `request`, refreshing credentials and replaying once on 401/403.
    pub async fn send_with_refresh<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        let snapshot = self.store.snapshot().map_err(ApiError::storage)?;
        let attempts = self.attempts.load(Ordering::Acquire);

        match self
            .client
            .send(request, snapshot.credentials.access.as_ref())
            .await
        {
            Err(err) if err.is_auth_expired() => {
                debug!(
                    endpoint = %request.endpoint,
                    status = ?err.status(),
                    "Access credential rejected, refreshing"
                );
                let access = self.refresh(snapshot.generation, attempts).await?;
                debug!(endpoint = %request.endpoint, "Replaying request with refreshed credential");
                self.client.send(request, Some(&access)).await
            }
            other => other,
        }
    }

    async fn refresh(
        &self,
        observed_generation: u64,
        observed_attempts: u64,
    ) -> Result<AccessCredential, ApiError> {
        let mut last_failure = self.last_failure.lock().await;

        // Credentials changed after our request went out: a concurrent
        // refresh or a login/logout. Use whatever is stored now.
        if self.store.generation() != observed_generation {
            return match self.store.access().map_err(ApiError::storage)? {
                Some(access) => {
                    debug!("Using credentials refreshed by a concurrent request");
                    Ok(access)
                }
                None => Err(ApiError::SessionChanged),
            };
        }

        // A refresh for this generation finished while we waited and failed
        if self.attempts.load(Ordering::Acquire) != observed_attempts {
            if let Some(failure) = last_failure
                .as_ref()
                .filter(|f| f.generation == observed_generation)
            {
                debug!("Sharing the outcome of a concurrent failed refresh");
                return Err(failure.to_error());
            }
        }

        let result = self.exchange(observed_generation).await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(access) => {
                *last_failure = None;
                Ok(access)
            }
            Err(err) => {
                if let ApiError::RefreshFailed { status, message } = &err {
                    warn!(status = ?status, message = %message, "Token refresh failed");
                    *last_failure = Some(RefreshFailure {
                        generation: observed_generation,
                        status: *status,
                        message: message.clone(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Exchange the stored refresh credential for a new pair. The store is
    /// only touched when the exchange succeeds.
    async fn exchange(&self, observed_generation: u64) -> Result<AccessCredential, ApiError> {
        let refresh = self
            .store
            .refresh()
            .map_err(ApiError::storage)?
            .ok_or_else(|| ApiError::RefreshFailed {
                status: None,
                message: "No refresh credential stored".to_string(),
            })?;

        let request = ApiRequest::refresh(&refresh)?;
        let response: TokenResponse = self
            .client
            .send(&request, None)
            .await
            .map_err(ApiError::into_refresh_failed)?;

        let pair = match (response.success, response.access_token, response.refresh_token) {
            (true, Some(access), Some(refresh)) => {
                CredentialPair::from_server(&access, &refresh, self.client.auth_scheme())
            }
            _ => {
                return Err(ApiError::RefreshFailed {
                    status: None,
                    message: response
                        .message
                        .unwrap_or_else(|| "Token refresh was rejected".to_string()),
                })
            }
        };

        if !self
            .store
            .write_if_generation(&pair, observed_generation)
            .map_err(ApiError::storage)?
        {
            return Err(ApiError::SessionChanged);
        }

        info!("Credentials refreshed");
        Ok(pair.access)
    }

    // ===== Session endpoints =====

    /// Log in and store the returned credential pair.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, CredentialPair), ApiError> {
        let request = ApiRequest::login(email, password)?;
        let response: LoginResponse = self.client.send(&request, None).await?;

        if !response.success {
            return Err(ApiError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "Login was rejected".to_string()),
            ));
        }

        let (user, access, refresh) =
            match (response.user, response.access_token, response.refresh_token) {
                (Some(user), Some(access), Some(refresh)) => (user, access, refresh),
                _ => {
                    return Err(ApiError::InvalidResponse(
                        "Login response is missing the user or tokens".to_string(),
                    ))
                }
            };

        let pair = CredentialPair::from_server(&access, &refresh, self.client.auth_scheme());
        self.store.write(&pair).map_err(ApiError::storage)?;

        info!(user_id = %user.id, "Login successful");
        Ok((user, pair))
    }

    /// Fetch the current user from the identity endpoint.
    pub async fn fetch_user(&self) -> Result<User, ApiError> {
        let response: UserResponse = self.send_with_refresh(&ApiRequest::identity()).await?;
        Ok(response.user)
    }

    /// Revoke the refresh credential on the server and clear both tiers.
    /// The local credentials are cleared even when the server call fails;
    /// that failure is returned after clearing.
    pub async fn logout(&self) -> Result<(), ApiError> {
        // An unreadable refresh tier skips the server call but is still cleared
        let refresh = self.store.refresh().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read refresh credential, skipping server logout");
            None
        });

        let server_result = match refresh {
            Some(refresh) => {
                let request = ApiRequest::logout(&refresh)?;
                match self.client.send::<LogoutResponse>(&request, None).await {
                    Ok(response) if !response.success => Err(ApiError::Rejected(
                        response
                            .message
                            .unwrap_or_else(|| "Logout was rejected".to_string()),
                    )),
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            None => Ok(()),
        };

        self.store.clear().map_err(ApiError::storage)?;
        info!("Logged out");
        server_result
    }
}
