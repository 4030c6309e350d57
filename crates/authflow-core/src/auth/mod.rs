//! Authentication: credentials, token refresh, and session state.
//!
//! This module provides:
//! - `CredentialStore`: access credential in a short-lived tier, refresh
//!   credential in a persistent tier, written and cleared as a pair
//! - `RefreshCoordinator`: refresh-and-replay on 401/403, plus the login,
//!   identity and logout calls
//! - `AuthSession` / `reduce`: the session state machine
//! - `SessionController`: runs `Effect`s and publishes the session state
//! - `LoginForm`: client-side validation of login input

pub mod credentials;
pub mod effects;
pub mod form;
pub mod refresh;
pub mod session;
pub mod tiers;

pub use credentials::{
    AccessCredential, CredentialPair, CredentialStore, RefreshCredential, Snapshot,
    StoredCredentials,
};
pub use effects::{Effect, SessionController};
pub use form::{FieldError, LoginField, LoginForm};
pub use refresh::RefreshCoordinator;
pub use session::{reduce, AuthAction, AuthSession};
pub use tiers::{CredentialTier, FileTier, KeyringTier, MemoryTier};
