//! HTTP API Tests
//!
//! Drives the full router (extractors, handlers, envelopes, middleware)
//! against the in-memory store with HS256 tokens.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use barter_backend::auth::{IdentityClaims, IdentityVerifier, JwtIdentityVerifier};
use barter_backend::config::{Config, Environment, IdentityConfig, IdentityKeySource};
use barter_backend::models::{User, UserRole};
use barter_backend::routes::create_router;
use barter_backend::state::AppState;
use barter_backend::store::{MemoryStore, UserStore};

const SECRET: &str = "api-test-secret";
const ADMIN_SUBJECT: &str = "user_admin";

fn config() -> Config {
    Config {
        database_url: None,
        environment: Environment::Development,
        port: 0,
        db_max_connections: 1,
        cors_allowed_origins: None,
        log_level: "warn".to_string(),
        identity: IdentityConfig {
            key_source: IdentityKeySource::Secret(SECRET.to_string()),
            issuer: None,
            audience: None,
        },
        starting_trade_points: 100,
        trade_ttl_days: 90,
        max_message_length: 1000,
    }
}

async fn app() -> Router {
    let store = Arc::new(MemoryStore::new());

    let mut admin = User::new(ADMIN_SUBJECT, 0);
    admin.role = UserRole::Admin;
    store.insert_user(admin).await.unwrap();

    let config = config();
    let identity: Arc<dyn IdentityVerifier> =
        Arc::new(JwtIdentityVerifier::from_config(&config.identity).unwrap());
    create_router(AppState::new(&config, store, identity), None)
}

fn token(subject: &str) -> String {
    let claims = IdentityClaims {
        sub: subject.to_string(),
        sid: None,
        exp: (Utc::now() + Duration::minutes(10)).timestamp(),
        iat: Some(Utc::now().timestamp()),
        iss: None,
        aud: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    subject: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(subject) = subject {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token(subject)));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Syncs `subject` and has the admin approve it. Returns the user id.
async fn verified_user(app: &Router, subject: &str, name: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/users/sync",
        Some(subject),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["user"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        app,
        Method::POST,
        &format!("/api/users/{}/verification", id),
        Some(ADMIN_SUBJECT),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    id
}

fn guitar() -> Value {
    json!({
        "title": "Acoustic guitar",
        "description": "Solid spruce top, barely played",
        "category": "Electronics",
        "condition": "good",
        "valuation": { "baseValue": 200.0, "quality": 5.0 },
        "location": { "city": "Lisbon", "coordinates": [-9.1393, 38.7223] },
        "tradePoints": 99999
    })
}

// ============================================================================
// Authentication and access control
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthenticated() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_unsynced_subject_is_not_found() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/users/me", Some("user_new"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_sync_creates_once() {
    let app = app().await;
    let (status, body) = call(&app, Method::POST, "/api/users/sync", Some("user_a"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["name"], "Trader");
    assert_eq!(body["user"]["tradePoints"], 100);
    assert_eq!(body["user"]["isVerified"], false);

    let (status, again) =
        call(&app, Method::POST, "/api/users/sync", Some("user_a"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["user"]["id"], body["user"]["id"]);

    let (status, me) = call(&app, Method::GET, "/api/users/me", Some("user_a"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["id"], body["user"]["id"]);
}

#[tokio::test]
async fn test_sync_rejects_malformed_body() {
    let app = app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/users/sync")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("user_m")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/api/users/me", Some("user_m"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_then_login() {
    let app = app().await;
    let (status, _) = call(&app, Method::POST, "/api/auth/login", Some("user_r"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        Some("user_r"),
        Some(json!({ "name": "Rita", "interests": ["Books"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["name"], "Rita");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        Some("user_r"),
        Some(json!({ "name": "Rita" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::POST, "/api/auth/login", Some("user_r"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"]["lastLogin"].is_string());

    let (status, body) = call(&app, Method::POST, "/api/auth/logout", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logout successful");
}

#[tokio::test]
async fn test_unverified_user_cannot_create_trade() {
    let app = app().await;
    call(&app, Method::POST, "/api/users/sync", Some("user_u"), None).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/trades",
        Some("user_u"),
        Some(guitar()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "VERIFICATION_REQUIRED");
    assert_eq!(body["verificationStatus"], "pending");
}

#[tokio::test]
async fn test_only_admins_review_verification() {
    let app = app().await;
    let (_, body) = call(&app, Method::POST, "/api/users/sync", Some("user_x"), None).await;
    let id = body["user"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/users/{}/verification", id),
        Some("user_x"),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Trades
// ============================================================================

#[tokio::test]
async fn test_create_trade_computes_points_server_side() {
    let app = app().await;
    let owner_id = verified_user(&app, "user_o", "Olga").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/trades",
        Some("user_o"),
        Some(guitar()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["trade"]["tradePoints"], 180);
    assert_eq!(body["trade"]["ownerId"], owner_id);
    assert_eq!(body["trade"]["status"], "active");
    assert_eq!(body["trade"]["owner"]["name"], "Olga");

    let id = body["trade"]["id"].as_str().unwrap().to_string();
    let (status, body) = call(&app, Method::GET, &format!("/api/trades/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trade"]["views"], 1);
    assert_eq!(body["trade"]["owner"]["id"], owner_id);
    assert_eq!(body["trade"]["owner"]["name"], "Olga");

    let (status, body) = call(&app, Method::GET, "/api/trades", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["pages"], 1);
    assert_eq!(body["trades"].as_array().unwrap().len(), 1);
    assert_eq!(body["trades"][0]["owner"]["name"], "Olga");
}

#[tokio::test]
async fn test_update_recomputes_points_and_checks_owner() {
    let app = app().await;
    verified_user(&app, "user_o", "Olga").await;
    verified_user(&app, "user_p", "Pavel").await;

    let (_, body) = call(&app, Method::POST, "/api/trades", Some("user_o"), Some(guitar())).await;
    let uri = format!("/api/trades/{}", body["trade"]["id"].as_str().unwrap());

    let (status, _) = call(
        &app,
        Method::PUT,
        &uri,
        Some("user_p"),
        Some(json!({ "title": "Mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::PUT,
        &uri,
        Some("user_o"),
        Some(json!({ "condition": "new" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trade"]["tradePoints"], 240);

    let (status, _) = call(&app, Method::DELETE, &uri, Some("user_o"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_count_and_bad_coordinates() {
    let app = app().await;
    verified_user(&app, "user_o", "Olga").await;
    call(&app, Method::POST, "/api/trades", Some("user_o"), Some(guitar())).await;

    let (status, body) = call(&app, Method::GET, "/api/trades/search?q=GUITAR", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/trades/search?lat=38.72&lng=-9.14&radius=5",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = call(&app, Method::GET, "/api/trades/search?lat=95&lng=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_like_and_wishlist_toggles() {
    let app = app().await;
    verified_user(&app, "user_o", "Olga").await;
    call(&app, Method::POST, "/api/users/sync", Some("user_fan"), None).await;

    let (_, body) = call(&app, Method::POST, "/api/trades", Some("user_o"), Some(guitar())).await;
    let id = body["trade"]["id"].as_str().unwrap().to_string();

    let like = format!("/api/trades/{}/like", id);
    let (status, body) = call(&app, Method::POST, &like, Some("user_fan"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liked"], true);
    assert_eq!(body["likes"], 1);
    let (_, body) = call(&app, Method::POST, &like, Some("user_fan"), None).await;
    assert_eq!(body["liked"], false);
    assert_eq!(body["likes"], 0);

    let wish = format!("/api/trades/{}/wishlist", id);
    let (_, body) = call(&app, Method::POST, &wish, Some("user_fan"), None).await;
    assert_eq!(body["inWishlist"], true);

    let (status, body) = call(&app, Method::GET, "/api/trades/wishlist", Some("user_fan"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trades"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_trade_id_is_bad_request() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/trades/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_invalid_valuation_lists_field_errors() {
    let app = app().await;
    verified_user(&app, "user_o", "Olga").await;

    let mut body = guitar();
    body["valuation"]["quality"] = json!(11);
    let (status, body) = call(&app, Method::POST, "/api/trades", Some("user_o"), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["valuation.quality"].is_array());
}

// ============================================================================
// Messaging
// ============================================================================

#[tokio::test]
async fn test_message_flow_tracks_unread_counts() {
    let app = app().await;
    verified_user(&app, "user_o", "Olga").await;
    let buyer_id = verified_user(&app, "user_b", "Bruno").await;

    let (_, body) = call(&app, Method::POST, "/api/trades", Some("user_o"), Some(guitar())).await;
    let trade_id = body["trade"]["id"].as_str().unwrap().to_string();
    let owner_id = body["trade"]["ownerId"].as_str().unwrap().to_string();

    for text in ["Is it still available?", "I can offer a bike"] {
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/messages",
            Some("user_b"),
            Some(json!({ "recipientId": owner_id, "tradeId": trade_id, "content": text })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"]["senderId"], buyer_id);
        assert_eq!(body["message"]["sender"]["name"], "Bruno");
    }

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/messages/conversations",
        Some("user_o"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["unreadCount"], 2);
    assert_eq!(conversations[0]["status"], "active");
    let conversation_id = conversations[0]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/messages/thread/{}", conversation_id),
        Some("user_o"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "Is it still available?");
    assert_eq!(messages[0]["sender"]["id"], buyer_id);
    assert!(messages
        .iter()
        .all(|m| m["readBy"].as_array().unwrap().contains(&json!(owner_id))));

    let (_, body) = call(
        &app,
        Method::GET,
        "/api/messages/conversations",
        Some("user_o"),
        None,
    )
    .await;
    assert_eq!(body["conversations"][0]["unreadCount"], 0);
}

#[tokio::test]
async fn test_outsider_cannot_read_thread() {
    let app = app().await;
    verified_user(&app, "user_o", "Olga").await;
    verified_user(&app, "user_b", "Bruno").await;
    call(&app, Method::POST, "/api/users/sync", Some("user_z"), None).await;

    let (_, body) = call(&app, Method::POST, "/api/trades", Some("user_o"), Some(guitar())).await;
    let (_, sent) = call(
        &app,
        Method::POST,
        "/api/messages",
        Some("user_b"),
        Some(json!({
            "recipientId": body["trade"]["ownerId"],
            "tradeId": body["trade"]["id"],
            "content": "hi"
        })),
    )
    .await;
    let conversation_id = sent["conversation"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/messages/thread/{}", conversation_id),
        Some("user_z"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_store_and_security_headers() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}
