//! Request and response bodies of the authentication endpoints.

use serde::{Deserialize, Serialize};

use super::User;

/// Body of `POST auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST auth/token` and `POST auth/logout`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub success: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{
            "success": true,
            "user": {"id": "u1", "email": "a@b.com", "name": "Alex"},
            "accessToken": "Bearer abc",
            "refreshToken": "def"
        }"#;
        let resp: LoginResponse = serde_json::from_str(json).expect("Failed to parse login JSON");
        assert!(resp.success);
        assert_eq!(resp.user.map(|u| u.id).as_deref(), Some("u1"));
        assert_eq!(resp.access_token.as_deref(), Some("Bearer abc"));
        assert_eq!(resp.refresh_token.as_deref(), Some("def"));
    }

    #[test]
    fn test_parse_rejected_token_response() {
        let json = r#"{"success": false, "message": "Token is invalid"}"#;
        let resp: TokenResponse = serde_json::from_str(json).expect("Failed to parse token JSON");
        assert!(!resp.success);
        assert!(resp.access_token.is_none());
        assert_eq!(resp.message.as_deref(), Some("Token is invalid"));
    }
}
