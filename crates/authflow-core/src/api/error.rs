use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request failed ({status}): {message}")]
    Application {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Unauthorized ({status}) - access token may be expired")]
    AuthExpired {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Session refresh failed: {message}")]
    RefreshFailed { status: Option<u16>, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Session changed while the request was in flight")]
    SessionChanged,

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Validation(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a non-2xx response. 401 and 403 become `AuthExpired`,
    /// everything else is a terminal `Application` error.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown status")
                        .to_string()
                } else {
                    Self::truncate_body(body)
                }
            });

        match status.as_u16() {
            code @ (401 | 403) => ApiError::AuthExpired {
                status: code,
                message,
                body: parsed,
            },
            code => ApiError::Application {
                status: code,
                message,
                body: parsed,
            },
        }
    }

    /// Wrap any failure of the refresh call into the terminal refresh error.
    pub fn into_refresh_failed(self) -> Self {
        match self {
            ApiError::RefreshFailed { .. } => self,
            other => ApiError::RefreshFailed {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }

    pub fn storage(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }

    /// HTTP status carried by the error, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Application { status, .. } | ApiError::AuthExpired { status, .. } => {
                Some(*status)
            }
            ApiError::RefreshFailed { status, .. } => *status,
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Structured error payload from the response body, when one was sent.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::Application { body, .. } | ApiError::AuthExpired { body, .. } => {
                body.as_ref()
            }
            _ => None,
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired { .. })
    }

    pub fn is_refresh_failed(&self) -> bool {
        matches!(self, ApiError::RefreshFailed { .. })
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::Transport(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::AuthExpired { message, .. } | ApiError::Application { message, .. } => {
                message.clone()
            }
            ApiError::RefreshFailed { .. } | ApiError::SessionChanged => {
                "Your session has expired. Please log in again.".to_string()
            }
            ApiError::Rejected(message) | ApiError::Validation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
