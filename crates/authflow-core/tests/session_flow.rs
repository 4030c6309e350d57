mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use authflow_core::auth::{
    AccessCredential, CredentialTier, FileTier, MemoryTier, RefreshCredential,
};
use authflow_core::models::UserResponse;
use authflow_core::{
    ApiError, ApiRequest, CredentialStore, Effect, GuardDecision, LoginForm, RouteAccess,
    RouteGuard,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

fn login_body() -> serde_json::Value {
    json!({
        "success": true,
        "user": { "id": "u1", "email": "a@b.com", "name": "Alex" },
        "accessToken": "Bearer a1",
        "refreshToken": "r1"
    })
}

#[tokio::test]
async fn login_stores_pair_and_authorizes_identity_call() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": "a@b.com", "password": "x" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body("u1")))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(None, None);
    let controller = controller(&server, store.clone());

    controller
        .run(Effect::Login(LoginForm::new("a@b.com", "x")))
        .await?;

    let creds = store.read()?;
    assert_eq!(creds.access, Some(AccessCredential::new("a1")));
    assert_eq!(creds.refresh, Some(RefreshCredential::new("r1")));

    let state = controller.state();
    assert!(state.checked);
    assert!(!state.pending);
    assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
    assert!(state.error.is_none());

    let response: UserResponse = controller.send(&ApiRequest::identity()).await?;
    assert_eq!(response.user.id, "u1");
    Ok(())
}

#[tokio::test]
async fn rejected_login_sets_error_without_refresh() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(failure(401, "email or password are incorrect"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a2", "r2")))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_with(None, None);
    let controller = controller(&server, store.clone());

    let err = controller
        .login(LoginForm::new("a@b.com", "wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));

    let state = controller.state();
    assert!(!state.pending);
    assert!(state.user.is_none());
    assert_eq!(state.error.as_deref(), Some("email or password are incorrect"));

    let creds = store.read()?;
    assert!(creds.access.is_none());
    assert!(creds.refresh.is_none());
    Ok(())
}

#[tokio::test]
async fn login_with_success_false_is_rejected() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(failure(200, "User not found"))
        .mount(&server)
        .await;

    let store = store_with(None, None);
    let controller = controller(&server, store.clone());

    let err = controller
        .login(LoginForm::new("a@b.com", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Rejected(_)));
    assert_eq!(controller.state().error.as_deref(), Some("User not found"));
    assert!(store.access()?.is_none());
    Ok(())
}

#[tokio::test]
async fn concurrent_checks_call_identity_once() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(user_body("u1"))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let controller = controller(&server, store_with(Some("a1"), Some("r1")));
    let guard = RouteGuard::default();

    assert_eq!(
        guard.decide(RouteAccess::Protected, &controller.state()),
        GuardDecision::Loading
    );

    tokio::join!(controller.check_auth(), controller.check_auth());
    // Later checks are no-ops
    controller.check_auth().await;

    let state = controller.state();
    assert!(state.checked);
    assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
    assert_eq!(guard.decide(RouteAccess::Protected, &state), GuardDecision::Render);
    assert_eq!(
        guard.decide(RouteAccess::AnonymousOnly, &state),
        GuardDecision::Redirect {
            to: "/".to_string(),
            replace: true
        }
    );
    Ok(())
}

#[tokio::test]
async fn check_auth_refreshes_expired_access() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .and(header("authorization", "Bearer old"))
        .respond_with(failure(403, "jwt expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(body_json(json!({ "token": "r1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a2", "r2")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body("u1")))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(Some("old"), Some("r1"));
    let controller = controller(&server, store.clone());

    controller.check_auth().await;

    let state = controller.state();
    assert!(state.checked);
    assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
    assert_eq!(store.refresh()?, Some(RefreshCredential::new("r2")));
    Ok(())
}

#[tokio::test]
async fn check_auth_with_failed_refresh_clears_store() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .respond_with(failure(401, "jwt expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(failure(401, "Token is invalid"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(Some("old"), Some("r1"));
    let controller = controller(&server, store.clone());

    controller.check_auth().await;

    let state = controller.state();
    assert!(state.checked);
    assert!(state.user.is_none());
    assert!(state.error.is_some());

    let creds = store.read()?;
    assert!(creds.access.is_none());
    assert!(creds.refresh.is_none());

    assert_eq!(
        RouteGuard::default().decide(RouteAccess::Protected, &state),
        GuardDecision::Redirect {
            to: "/login".to_string(),
            replace: true
        }
    );
    Ok(())
}

#[tokio::test]
async fn logout_revokes_and_clears() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(body_json(json!({ "token": "r1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "message": "Successful logout" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(None, None);
    let controller = controller(&server, store.clone());

    controller.login(LoginForm::new("a@b.com", "x")).await?;
    assert!(controller.state().is_authenticated());

    controller.run(Effect::Logout).await?;

    let creds = store.read()?;
    assert!(creds.access.is_none());
    assert!(creds.refresh.is_none());

    let state = controller.state();
    assert!(state.checked);
    assert!(state.user.is_none());
    assert!(state.error.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_server_logout_still_clears_locally() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(Some("a1"), Some("r1"));
    let controller = controller(&server, store.clone());

    controller.logout().await?;

    let creds = store.read()?;
    assert!(creds.access.is_none());
    assert!(creds.refresh.is_none());
    assert!(controller.state().user.is_none());
    Ok(())
}

#[tokio::test]
async fn unrecoverable_session_logs_out() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .respond_with(failure(401, "jwt expired"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(failure(200, "Token is invalid"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(None, None);
    let controller = controller(&server, store.clone());
    let mut rx = controller.subscribe();

    controller.login(LoginForm::new("a@b.com", "x")).await?;
    rx.borrow_and_update();

    let err = controller
        .send::<UserResponse>(&ApiRequest::identity())
        .await
        .unwrap_err();
    assert!(err.is_refresh_failed());

    assert!(rx.has_changed()?);
    let state = rx.borrow_and_update().clone();
    assert!(state.checked);
    assert!(state.user.is_none());
    assert!(state.error.is_some());
    assert!(store.access()?.is_none());
    Ok(())
}

#[tokio::test]
async fn logout_clears_store_with_corrupt_refresh_file() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let refresh_path = dir.path().join("refresh.json");
    std::fs::write(&refresh_path, "garbage")?;

    let access = MemoryTier::new();
    access.save("a1")?;
    let store = Arc::new(CredentialStore::new(
        Box::new(access),
        Box::new(FileTier::new(&refresh_path)),
    ));
    assert!(store.read().is_err());

    let controller = controller(&server, store.clone());
    controller.logout().await?;

    assert!(!refresh_path.exists());
    let creds = store.read()?;
    assert!(creds.access.is_none());
    assert!(creds.refresh.is_none());
    assert!(controller.state().error.is_none());
    Ok(())
}

#[tokio::test]
async fn logout_during_startup_check_stays_logged_out() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(user_body("u1"))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(Some("a1"), Some("r1"));
    let controller = controller(&server, store.clone());

    let ((), logout) = tokio::join!(controller.check_auth(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.logout().await
    });
    logout?;

    let state = controller.state();
    assert!(state.checked);
    assert!(state.user.is_none());
    assert!(store.access()?.is_none());
    assert_eq!(
        RouteGuard::default().decide(RouteAccess::Protected, &state),
        GuardDecision::Redirect {
            to: "/login".to_string(),
            replace: true
        }
    );
    Ok(())
}

#[tokio::test]
async fn stale_refresh_failure_keeps_newer_login() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/user"))
        .and(header("authorization", "Bearer old"))
        .respond_with(failure(401, "jwt expired"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(failure(401, "Token is invalid").set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(Some("old"), Some("r0"));
    let controller = controller(&server, store.clone());

    let identity = ApiRequest::identity();
    let (sent, login) = tokio::join!(
        controller.send::<UserResponse>(&identity),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            controller.login(LoginForm::new("a@b.com", "x")).await
        }
    );
    assert!(sent.unwrap_err().is_refresh_failed());
    login?;

    let creds = store.read()?;
    assert_eq!(creds.access, Some(AccessCredential::new("a1")));
    assert_eq!(creds.refresh, Some(RefreshCredential::new("r1")));

    let state = controller.state();
    assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
    assert!(state.error.is_none());
    Ok(())
}

#[tokio::test]
async fn login_accepts_user_without_id() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "user": { "email": "a@b.com", "name": "Alex" },
            "accessToken": "Bearer a1",
            "refreshToken": "r1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = controller(&server, store_with(None, None));

    let user = controller.login(LoginForm::new("a@b.com", "x")).await?;
    assert_eq!(user.id, "a@b.com");
    assert_eq!(user.display_name(), "Alex");
    assert!(controller.state().is_authenticated());
    Ok(())
}
