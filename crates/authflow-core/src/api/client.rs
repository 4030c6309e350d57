//! HTTP gateway for the authentication API.
//!
//! `ApiClient` sends an `ApiRequest`, attaches the access credential when the
//! request needs one, and classifies the outcome. It knows nothing about
//! refreshing; `RefreshCoordinator` builds on top of it.

use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::{AccessCredential, RefreshCredential};
use crate::config::Config;
use crate::models::{LoginRequest, TokenRequest};

use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

pub const IDENTITY_ENDPOINT: &str = "auth/user";
pub const REFRESH_ENDPOINT: &str = "auth/token";
pub const LOGIN_ENDPOINT: &str = "auth/login";
pub const LOGOUT_ENDPOINT: &str = "auth/logout";

/// A call to one endpoint, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
    pub requires_auth: bool,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            endpoint: endpoint.into(),
            body: None,
            requires_auth: true,
        }
    }

    pub fn post<B: Serialize>(endpoint: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        Ok(Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            body: Some(serde_json::to_value(body)?),
            requires_auth: true,
        })
    }

    /// Mark the request as not needing the access credential.
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// `GET auth/user`
    pub fn identity() -> Self {
        Self::get(IDENTITY_ENDPOINT)
    }

    /// `POST auth/login`
    pub fn login(email: &str, password: &str) -> Result<Self, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        Ok(Self::post(LOGIN_ENDPOINT, &body)?.public())
    }

    /// `POST auth/token`. The refresh credential only ever travels here and
    /// to the logout endpoint.
    pub fn refresh(token: &RefreshCredential) -> Result<Self, ApiError> {
        let body = TokenRequest {
            token: token.expose().to_string(),
        };
        Ok(Self::post(REFRESH_ENDPOINT, &body)?.public())
    }

    /// `POST auth/logout`
    pub fn logout(token: &RefreshCredential) -> Result<Self, ApiError> {
        let body = TokenRequest {
            token: token.expose().to_string(),
        };
        Ok(Self::post(LOGOUT_ENDPOINT, &body)?.public())
    }
}

// ============================================================================
// Client
// ============================================================================

/// API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_scheme: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.clone(),
        })
    }

    pub fn auth_scheme(&self) -> &str {
        &self.auth_scheme
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn authorization(&self, token: &AccessCredential) -> Result<header::HeaderValue, ApiError> {
        let mut value =
            header::HeaderValue::from_str(&format!("{} {}", self.auth_scheme, token.expose()))
                .map_err(|e| ApiError::Validation(format!("Invalid access credential: {}", e)))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Send a request and deserialize a 2xx body into `T`.
    ///
    /// Non-2xx responses become `AuthExpired` (401/403) or `Application`
    /// errors; failures before any response become `Transport`. Nothing is
    /// retried here.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        access: Option<&AccessCredential>,
    ) -> Result<T, ApiError> {
        let url = self.url(&request.endpoint);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::CONTENT_TYPE, "application/json");

        if request.requires_auth {
            match access {
                Some(token) => {
                    builder = builder.header(header::AUTHORIZATION, self.authorization(token)?);
                }
                None => debug!(endpoint = %request.endpoint, "No access credential to attach"),
            }
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, endpoint = %request.endpoint, "Sending request");
        let response = builder.send().await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse JSON response from {}: {}",
                request.endpoint, e
            ))
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Request failed");
            Err(ApiError::from_status(status, &body))
        }
    }
}
