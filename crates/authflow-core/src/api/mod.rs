//! HTTP request gateway.
//!
//! This module provides the `ApiClient` for talking to the authentication
//! API and `ApiError`, the error taxonomy shared by the whole crate.
//!
//! The client attaches `authorization: <scheme> <access token>` to requests
//! that need it and classifies responses; it never retries.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiRequest};
pub use error::ApiError;
