//! Integration test: build the router over an in-memory store and drive the
//! authentication endpoints end to end.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use tokenward_api::{AppState, config::ApiConfig, routes};
use tokenward_core::auth::{AuthService, BcryptCredentials};
use tokenward_core::config::AuthConfig;
use tokenward_core::store::MemoryPrincipalStore;
use tower::ServiceExt;

fn app() -> Router {
    let auth = AuthService::new(
        &AuthConfig::new(b"integration-test-key-0123456789abcdef".to_vec()),
        Arc::new(MemoryPrincipalStore::new()),
        Arc::new(BcryptCredentials::default()),
    )
    .expect("auth service");

    tokenward_api::router(AppState {
        auth,
        config: ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            database_url: None,
            cookie_secure: false,
        },
    })
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn cookie_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("refreshToken={token}"))
        .body(Body::empty())
        .unwrap()
}

struct Reply {
    status: StatusCode,
    refresh_cookie: Option<String>,
    set_cookie: Option<String>,
    json: serde_json::Value,
}

async fn send(app: &Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let refresh_cookie = set_cookie.as_deref().map(|c| {
        let pair = c.split(';').next().unwrap();
        let (name, value) = pair.split_once('=').unwrap();
        assert_eq!(name, "refreshToken");
        value.to_string()
    });
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("parse JSON")
    };
    Reply {
        status,
        refresh_cookie,
        set_cookie,
        json,
    }
}

fn registration() -> serde_json::Value {
    serde_json::json!({
        "firstName": "A",
        "lastName": "B",
        "username": "ab",
        "password": "Weakpw1!",
        "email": "a@x.com",
    })
}

#[tokio::test]
async fn register_sets_http_only_cookie_and_hides_token_from_body() {
    let app = app();
    let reply = send(&app, json_request("POST", routes::POST_REGISTER, registration())).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["isAuthenticated"], true);
    assert_eq!(reply.json["username"], "ab");
    assert_eq!(reply.json["email"], "a@x.com");
    assert_eq!(reply.json["roles"], serde_json::json!(["User"]));
    assert!(reply.json["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(reply.json.get("refreshToken").is_none());

    let set_cookie = reply.set_cookie.expect("set-cookie");
    assert!(set_cookie.contains("HttpOnly"));
    assert!(reply.refresh_cookie.is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn login_with_unknown_email_is_rejected() {
    let app = app();
    let reply = send(
        &app,
        json_request(
            "POST",
            routes::POST_LOGIN,
            serde_json::json!({ "email": "a@x.com", "password": "Secret1!" }),
        ),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json["message"], "Email or password is incorrect !");
    assert!(reply.set_cookie.is_none());
}

#[tokio::test]
async fn login_after_register_reuses_refresh_cookie() {
    let app = app();
    let registered = send(&app, json_request("POST", routes::POST_REGISTER, registration())).await;
    let logged_in = send(
        &app,
        json_request(
            "POST",
            routes::POST_LOGIN,
            serde_json::json!({ "email": "a@x.com", "password": "Weakpw1!" }),
        ),
    )
    .await;

    assert_eq!(logged_in.status, StatusCode::OK);
    assert_eq!(logged_in.refresh_cookie, registered.refresh_cookie);
    assert_ne!(logged_in.json["token"], registered.json["token"]);
}

#[tokio::test]
async fn refresh_rotates_cookie_and_rejects_replay() {
    let app = app();
    let registered = send(&app, json_request("POST", routes::POST_REGISTER, registration())).await;
    let original = registered.refresh_cookie.unwrap();

    let refreshed = send(&app, cookie_request("GET", routes::GET_REFRESH, &original)).await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let rotated = refreshed.refresh_cookie.unwrap();
    assert_ne!(rotated, original);

    let replay = send(&app, cookie_request("GET", routes::GET_REFRESH, &original)).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(replay.json["message"], "Invalid token!");

    let again = send(&app, cookie_request("GET", routes::GET_REFRESH, &rotated)).await;
    assert_eq!(again.status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_without_cookie_is_a_bad_request() {
    let app = app();
    let req = Request::builder()
        .uri(routes::GET_REFRESH)
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json["message"], "Invalid client request");
}

#[tokio::test]
async fn revoke_accepts_body_token_once() {
    let app = app();
    let registered = send(&app, json_request("POST", routes::POST_REGISTER, registration())).await;
    let token = registered.refresh_cookie.unwrap();
    let body = serde_json::json!({ "refreshToken": token });

    let revoked = send(&app, json_request("POST", routes::POST_REVOKE, body.clone())).await;
    assert_eq!(revoked.status, StatusCode::OK);
    assert_eq!(revoked.json["message"], "Token revoked");

    let again = send(&app, json_request("POST", routes::POST_REVOKE, body)).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.json["message"], "Invalid client request");

    let refresh = send(&app, cookie_request("GET", routes::GET_REFRESH, &token)).await;
    assert_eq!(refresh.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revoke_falls_back_to_cookie() {
    let app = app();
    let registered = send(&app, json_request("POST", routes::POST_REGISTER, registration())).await;
    let token = registered.refresh_cookie.unwrap();

    let revoked = send(&app, cookie_request("POST", routes::POST_REVOKE, &token)).await;
    assert_eq!(revoked.status, StatusCode::OK);
}

#[tokio::test]
async fn revoke_without_token_is_a_bad_request() {
    let app = app();
    let req = Request::builder()
        .method("POST")
        .uri(routes::POST_REVOKE)
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json["message"], "Token is required");
}

#[tokio::test]
async fn me_requires_a_valid_bearer_token() {
    let app = app();
    let registered = send(&app, json_request("POST", routes::POST_REGISTER, registration())).await;
    let access = registered.json["token"].as_str().unwrap().to_string();

    let req = Request::builder()
        .uri(routes::GET_ME)
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["sub"], "ab");
    assert_eq!(reply.json["role"], serde_json::json!(["User"]));

    let req = Request::builder()
        .uri(routes::GET_ME)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri(routes::GET_ME)
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.status, StatusCode::UNAUTHORIZED);
}
