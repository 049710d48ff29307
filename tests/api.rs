//! End-to-end tests over the full router, backed by the in-memory store.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    },
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use keygate::{
    clock::{Clock, ManualClock},
    models::audit::AuditEntry,
    routes,
    services::{
        audit_service::{self, AuditWorkers},
        password::PasswordHasher,
        token_service::TokenService,
    },
    state::AppState,
    store::MemoryStore,
};

struct TestApp {
    router: Router,
    store: MemoryStore,
    clock: ManualClock,
    workers: AuditWorkers,
}

fn app() -> TestApp {
    let store = MemoryStore::new();
    let clock = ManualClock::new(Utc::now());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let (audit, workers) = audit_service::spawn(Arc::new(store.clone()), shared_clock.clone(), 64, 2);
    let tokens = TokenService::new("integration-secret", Duration::hours(24), shared_clock.clone());

    let state = AppState::new(
        Arc::new(store.clone()),
        shared_clock,
        PasswordHasher::new(4), // bcrypt minimum cost
        tokens,
        audit,
    );

    TestApp {
        router: routes::router(state, std::time::Duration::from_secs(60)),
        store,
        clock,
        workers,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn register(&self, email: &str) -> (String, Uuid) {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/v1/api/auth/register",
                None,
                json!({ "email": email, "password": "password123" }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let token = body["token"].as_str().unwrap().to_string();
        let user_id = self.user_id_of(&token);
        (token, user_id)
    }

    fn user_id_of(&self, token: &str) -> Uuid {
        let verifier = TokenService::new(
            "integration-secret",
            Duration::hours(24),
            Arc::new(self.clock.clone()),
        );
        verifier.verify(token).unwrap().user_id
    }

    async fn create_key(&self, token: &str, name: &str) -> (StatusCode, Value) {
        self.send(json_request(
            Method::POST,
            "/v1/api/api-keys",
            Some(token),
            json!({ "name": name }),
        ))
        .await
    }

    async fn wait_for_audit(&self, count: usize) -> Vec<AuditEntry> {
        for _ in 0..100 {
            let entries = self.store.audit_entries().await;
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.store.audit_entries().await
    }
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn raw_request(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, token)
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_api_key(uri: &str, key: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-API-Key", key)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_reports_connected() {
    let app = app();
    let (status, body) = app.send(get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn register_then_login() {
    let app = app();
    let (_, user_id) = app.register("alice@example.com").await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/v1/api/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "password123" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(app.user_id_of(body["token"].as_str().unwrap()), user_id);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    app.register("alice@example.com").await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/v1/api/auth/register",
            None,
            json!({ "email": "alice@example.com", "password": "password123" }),
        ))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "email_taken");
}

#[tokio::test]
async fn bad_login_is_unauthorized() {
    let app = app();
    app.register("alice@example.com").await;

    for (email, password) in [
        ("alice@example.com", "wrong-password"),
        ("nobody@example.com", "password123"),
    ] {
        let (status, body) = app
            .send(json_request(
                Method::POST,
                "/v1/api/auth/login",
                None,
                json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "invalid_credentials");
    }
}

#[tokio::test]
async fn wrong_scheme_is_rejected_before_the_handler() {
    let app = app();
    let request = Request::builder()
        .uri("/v1/api/api-keys")
        .header(AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid authorization header format");
    assert!(app.workers.shutdown(std::time::Duration::from_secs(5)).await);
    assert!(app.store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let app = app();
    let (status, body) = app.send(get("/v1/api/api-keys", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "missing_authorization");
    assert_eq!(body["error"]["message"], "authorization header required");
}

#[tokio::test]
async fn expired_and_forged_tokens_are_rejected() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    let (status, body) = app.send(get("/v1/api/api-keys", Some("not.a.token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid token");

    app.clock.advance(Duration::hours(25));
    let (status, body) = app.send(get("/v1/api/api-keys", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "token_expired");
    assert_eq!(body["error"]["message"], "token expired");
}

#[tokio::test]
async fn authenticated_request_produces_one_audit_entry() {
    let app = app();
    let (token, user_id) = app.register("alice@example.com").await;

    let path = format!("/v1/api/users/{user_id}");
    let request = Request::builder()
        .uri(&path)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header(USER_AGENT, "audit-test/1.0")
        .header("X-Forwarded-For", "203.0.113.5")
        .body(Body::empty())
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@example.com");

    let entries = app.wait_for_audit(1).await;
    assert_eq!(entries.len(), 1);

    let entry = &entries[0];
    assert_eq!(entry.user_id, user_id);
    assert_eq!(entry.method, "GET");
    assert_eq!(entry.path, path);
    assert_eq!(entry.status_code, 200);
    assert_eq!(entry.user_agent, "audit-test/1.0");
    assert_eq!(entry.ip_address, "203.0.113.5");
    assert!(entry.duration_ms >= 0);
}

#[tokio::test]
async fn error_responses_are_audited_with_their_status() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/v1/api/api-keys/{}", Uuid::new_v4()),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let entries = app.wait_for_audit(1).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].method, "DELETE");
    assert_eq!(entries[0].status_code, 404);
}

#[tokio::test]
async fn public_and_rejected_requests_are_not_audited() {
    let app = app();
    app.register("alice@example.com").await;

    app.send(get("/health", None)).await;
    app.send(get("/v1/api/api-keys", None)).await;
    app.send(with_api_key("/v1/api/whoami", "bogus")).await;

    assert!(app.workers.shutdown(std::time::Duration::from_secs(5)).await);
    assert!(app.store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn failing_audit_store_does_not_affect_responses() {
    let app = app();
    let (token, user_id) = app.register("alice@example.com").await;
    app.store.set_fail_audit_writes(true);

    let (status, body) = app
        .send(get(&format!("/v1/api/users/{user_id}"), Some(&token)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user_id.to_string());
}

#[tokio::test]
async fn users_only_see_themselves() {
    let app = app();
    let (_, alice) = app.register("alice@example.com").await;
    let (bob_token, _) = app.register("bob@example.com").await;

    let (status, body) = app
        .send(get(&format!("/v1/api/users/{alice}"), Some(&bob_token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "user_not_found");

    let (status, body) = app.send(get("/v1/api/users/not-a-uuid", Some(&bob_token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn key_quota_and_names() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    for name in ["ci", "laptop", "ci-backup"] {
        let (status, body) = app.create_key(&token, name).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["name"], name);
        assert_eq!(body["key"].as_str().unwrap().len(), 64);
        assert_eq!(body["is_revoked"], false);
    }

    let (status, body) = app.create_key(&token, "ci").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "duplicate_key_name");

    let (status, body) = app.create_key(&token, "extra").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "too_many_api_keys");

    let (status, _) = app.create_key(&token, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, keys) = app.send(get("/v1/api/api-keys", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let keys = keys.as_array().unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys.iter().all(|k| k.get("key").is_none()));
}

#[tokio::test]
async fn out_of_range_expiry_is_a_bad_request() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    for expires_in in [i64::MAX, 0, -1] {
        let (status, body) = app
            .send(json_request(
                Method::POST,
                "/v1/api/api-keys",
                Some(&token),
                json!({ "name": "ci", "expires_in": expires_in }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{expires_in}");
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    let (_, keys) = app.send(get("/v1/api/api-keys", Some(&token))).await;
    assert!(keys.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_bodies_get_the_json_error_body() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    for body in ["{}", "not json", r#"{"name": 5}"#] {
        let (status, response) = app
            .send(raw_request("/v1/api/api-keys", Some(&token), body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"]["code"], "invalid_request", "{body}");
    }

    for uri in ["/v1/api/auth/register", "/v1/api/auth/login"] {
        let (status, response) = app.send(raw_request(uri, None, "{\"email\":")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(response["error"]["code"], "invalid_request", "{uri}");
    }
}

#[tokio::test]
async fn revoked_key_is_listed_and_rejected() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    app.create_key(&token, "ci").await;
    let (_, laptop) = app.create_key(&token, "laptop").await;
    let laptop_id = laptop["id"].as_str().unwrap();
    let laptop_key = laptop["key"].as_str().unwrap();

    let (status, _) = app.send(with_api_key("/v1/api/whoami", laptop_key)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request(
            Method::DELETE,
            &format!("/v1/api/api-keys/{laptop_id}"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "API key revoked successfully");

    let (status, body) = app.send(with_api_key("/v1/api/whoami", laptop_key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "api_key_revoked");

    let (_, keys) = app.send(get("/v1/api/api-keys", Some(&token))).await;
    let listed = keys
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["name"] == "laptop")
        .unwrap();
    assert_eq!(listed["is_revoked"], true);
}

#[tokio::test]
async fn rotate_issues_new_material_under_the_same_name() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    let (_, original) = app.create_key(&token, "ci").await;
    let original_id = original["id"].as_str().unwrap();
    let original_key = original["key"].as_str().unwrap();

    let (status, rotated) = app
        .send(request(
            Method::POST,
            &format!("/v1/api/api-keys/{original_id}/rotate"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rotated["name"], "ci");
    assert_ne!(rotated["key"], original["key"]);
    assert_ne!(rotated["id"], original["id"]);

    let (status, _) = app.send(with_api_key("/v1/api/whoami", original_key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(with_api_key("/v1/api/whoami", rotated["key"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_key_name"], "ci");
}

#[tokio::test]
async fn keys_of_other_users_are_not_found() {
    let app = app();
    let (alice, _) = app.register("alice@example.com").await;
    let (bob, _) = app.register("bob@example.com").await;

    let (_, key) = app.create_key(&alice, "ci").await;
    let key_id = key["id"].as_str().unwrap();

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/v1/api/api-keys/{key_id}"),
            Some(&bob),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(request(
            Method::POST,
            &format!("/v1/api/api-keys/{key_id}/rotate"),
            Some(&bob),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bobs_keys) = app.send(get("/v1/api/api-keys", Some(&bob))).await;
    assert!(bobs_keys.as_array().unwrap().is_empty());

    let (status, _) = app
        .send(with_api_key("/v1/api/whoami", key["key"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn whoami_identifies_the_key_owner() {
    let app = app();
    let (token, user_id) = app.register("alice@example.com").await;
    let (_, key) = app.create_key(&token, "ci").await;

    let (status, body) = app
        .send(with_api_key("/v1/api/whoami", key["key"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["api_key_id"], key["id"]);

    let (status, body) = app.send(get("/v1/api/whoami", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "missing_api_key");

    let (status, body) = app.send(with_api_key("/v1/api/whoami", "deadbeef")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "invalid_api_key");

    // Key creation plus the one successful whoami
    let entries = app.wait_for_audit(2).await;
    assert_eq!(entries.len(), 2);
    let whoami: Vec<_> = entries
        .iter()
        .filter(|e| e.path == "/v1/api/whoami")
        .collect();
    assert_eq!(whoami.len(), 1);
    assert_eq!(whoami[0].status_code, 200);
}

#[tokio::test]
async fn listing_revokes_expired_keys() {
    let app = app();
    let (token, _) = app.register("alice@example.com").await;

    let (status, key) = app
        .send(json_request(
            Method::POST,
            "/v1/api/api-keys",
            Some(&token),
            json!({ "name": "short-lived", "expires_in": 1 }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    app.clock.advance(Duration::days(2));

    let (status, body) = app
        .send(with_api_key("/v1/api/whoami", key["key"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "api_key_expired");

    // The session token from registration has expired by now
    let (_, login) = app
        .send(json_request(
            Method::POST,
            "/v1/api/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "password123" }),
        ))
        .await;
    let fresh = login["token"].as_str().unwrap();

    let (status, keys) = app.send(get("/v1/api/api-keys", Some(fresh))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys[0]["is_revoked"], true);
}
