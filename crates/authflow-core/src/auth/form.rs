//! Login form validation.

use serde::{Deserialize, Serialize};

/// Maximum length for the email field.
const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum length for the password field.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginField {
    Email,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: LoginField,
    pub message: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate every field, returning one error per invalid field.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        let email = self.email.trim();
        if email.is_empty() {
            errors.push(FieldError {
                field: LoginField::Email,
                message: "Email is required".to_string(),
            });
        } else if email.len() > MAX_EMAIL_LENGTH || !looks_like_email(email) {
            errors.push(FieldError {
                field: LoginField::Email,
                message: "Enter a valid email address".to_string(),
            });
        }

        if self.password.is_empty() {
            errors.push(FieldError {
                field: LoginField::Password,
                message: "Password is required".to_string(),
            });
        } else if self.password.len() > MAX_PASSWORD_LENGTH {
            errors.push(FieldError {
                field: LoginField::Password,
                message: format!("Password must be at most {} characters", MAX_PASSWORD_LENGTH),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `local@domain.tld` with no whitespace. Deliverability is the server's call.
fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}
