//! Data models for the authentication API.
//!
//! - `User`: identity record returned by the identity and login endpoints
//! - Wire payloads: request bodies and response envelopes for
//!   `auth/login`, `auth/token`, `auth/user` and `auth/logout`

pub mod payloads;
pub mod user;

pub use payloads::{
    LoginRequest, LoginResponse, LogoutResponse, TokenRequest, TokenResponse, UserResponse,
};
pub use user::User;
