#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use authflow_core::auth::{
    AccessCredential, CredentialPair, CredentialTier, MemoryTier, RefreshCredential,
};
use authflow_core::{ApiClient, Config, CredentialStore, RefreshCoordinator, SessionController};
use serde_json::{json, Value};
use wiremock::{MockServer, ResponseTemplate};

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn config_for(server: &MockServer) -> Config {
    Config::with_base_url(format!("{}/api", server.uri()))
}

pub fn pair(access: &str, refresh: &str) -> CredentialPair {
    CredentialPair::new(AccessCredential::new(access), RefreshCredential::new(refresh))
}

/// Store seeded with either half present or absent.
pub fn store_with(access: Option<&str>, refresh: Option<&str>) -> Arc<CredentialStore> {
    let access_tier = MemoryTier::new();
    let refresh_tier = MemoryTier::new();
    if let Some(a) = access {
        access_tier.save(a).expect("seed access tier");
    }
    if let Some(r) = refresh {
        refresh_tier.save(r).expect("seed refresh tier");
    }
    Arc::new(CredentialStore::new(Box::new(access_tier), Box::new(refresh_tier)))
}

pub fn coordinator(server: &MockServer, store: Arc<CredentialStore>) -> Arc<RefreshCoordinator> {
    let client = ApiClient::new(&config_for(server)).expect("build client");
    Arc::new(RefreshCoordinator::new(client, store))
}

pub fn controller(server: &MockServer, store: Arc<CredentialStore>) -> SessionController {
    SessionController::new(coordinator(server, store))
}

pub fn user_body(id: &str) -> Value {
    json!({ "success": true, "user": { "id": id, "email": "a@b.com", "name": "Alex" } })
}

pub fn token_body(access: &str, refresh: &str) -> Value {
    json!({ "success": true, "accessToken": format!("Bearer {}", access), "refreshToken": refresh })
}

/// Response with `{"success": false, "message": ...}` and the given status.
pub fn failure(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "success": false, "message": message }))
}
