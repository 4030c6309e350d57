//! authflow core library.
//!
//! Client-side authentication for an API that issues short-lived access
//! tokens and long-lived refresh tokens:
//!
//! - `api`: HTTP gateway and error taxonomy
//! - `auth`: credential store, refresh-and-replay, session state machine
//! - `guard`: route guard decisions over the session state
//! - `config`: persisted configuration
//! - `models`: wire types

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiError, ApiRequest};
pub use auth::{
    AuthAction, AuthSession, CredentialPair, CredentialStore, Effect, LoginForm,
    RefreshCoordinator, SessionController,
};
pub use config::Config;
pub use guard::{GuardDecision, RouteAccess, RouteGuard};
pub use models::User;
