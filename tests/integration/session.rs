//! Session lifecycle across processes sharing one session jar.

use std::sync::Arc;

use hrms_api::auth::{AuthService, LoginStep, ManualNavigator, SessionNavigator, TokenKind};
use hrms_api::RequestOptions;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{envelope, process};

async fn mount_backend(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "token": "acc-1",
            "refresh_token": "ref-1",
            "user": { "id": 4, "username": "lan", "role": "SYSTEM_ADMIN" }
        }))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/employees"))
        .and(header("Authorization", "Bearer acc-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "jwt expired" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/employees"))
        .and(header("Authorization", "Bearer acc-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "items": [{ "id": 1, "full_name": "Tran Lan" }],
            "pagination": { "page": 1, "limit": 20, "total": 1, "total_pages": 1 }
        }))))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(Value::Null)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_session_survives_expiry_and_is_shared() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh-token"))
        .and(body_partial_json(json!({ "refresh_token": "ref-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "token": "acc-2",
            "refresh_token": "ref-2"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("session");
    let first = process(&server, &jar, Arc::new(ManualNavigator::new("/employees")));
    let second = process(&server, &jar, Arc::new(ManualNavigator::new("/employees")));

    let step = AuthService::new(first.clone())
        .login("lan", "pw")
        .await
        .unwrap();
    assert_eq!(step.redirect_to(), "/dashboard");
    assert!(matches!(step, LoginStep::Authenticated { .. }));

    // Access token expired server-side: the call is renewed and replayed.
    let page: Value = first
        .get("/employees", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(page["data"]["items"][0]["full_name"], "Tran Lan");

    // The other process reads the renewed pair from the jar.
    assert_eq!(
        second.credentials().get(TokenKind::Refresh).as_deref(),
        Some("ref-2")
    );
    let page: Value = second
        .get("/employees", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(page["data"]["pagination"]["total"], 1);
    assert_eq!(second.coordinator().refresh_count(), 0);

    AuthService::new(second).logout().await;
    assert!(!first.credentials().is_authenticated());
}

#[tokio::test]
async fn test_expiry_redirects_once_for_a_burst_of_calls() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": "Invalid or expired refresh token" }))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let navigator = Arc::new(ManualNavigator::new("/employees"));
    let client = process(&server, &dir.path().join("session"), navigator.clone());
    AuthService::new(client.clone())
        .login("lan", "pw")
        .await
        .unwrap();

    let calls: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            async move { client.get::<Value>("/employees", RequestOptions::new()).await }
        })
        .collect();
    let results = futures::future::join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_auth_error(), "{err}");
    }
    assert_eq!(navigator.redirect_count(), 1);
    assert_eq!(navigator.current_path().as_deref(), Some("/login"));
    assert!(!client.credentials().is_authenticated());

    // Signing in again re-arms the redirect.
    AuthService::new(client.clone())
        .login("lan", "pw")
        .await
        .unwrap();
    assert!(!client.guard().is_redirecting());
}

#[tokio::test]
async fn test_refresh_bypasses_proxy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "id": 1 }))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/backend/api/v1/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "token": "fresh",
            "refresh_token": "fresh-refresh"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let config = hrms_api::ClientConfig::builder()
        .with_api_url(format!("{}/backend/api/v1", server.uri()))
        .with_proxy(server.uri())
        .build();
    let client = hrms_api::ApiClient::new(config).unwrap();
    client.credentials().set_pair("stale", "stale-refresh");

    let me: Value = client
        .get("/users/me", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(me["data"]["id"], 1);
}
