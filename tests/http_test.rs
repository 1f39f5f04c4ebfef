//! End-to-end flows through the JSON API, driven in-process with `oneshot`.

use agora::config::Config;
use agora::db;
use agora::routes::build_router;
use agora::state::AppState;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const PASSWORD: &str = "Sup3r!secret";

fn test_app() -> (TempDir, Router) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("test.db"), 4).unwrap();
    db::run_migrations(&pool).unwrap();

    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;

    let app = build_router(AppState::new(pool, config));
    (temp_dir, app)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, set_cookie, json)
}

async fn sign_up_and_in(app: &Router, username: &str) -> String {
    let (status, _, _) = send(
        app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD,
            "confirm_password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, cookie, _) = send(
        app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({ "username": username, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    cookie.expect("signin sets a session cookie")
}

async fn create_post(app: &Router, cookie: &str) -> i64 {
    let (status, _, body) = send(
        app,
        Method::POST,
        "/posts",
        Some(cookie),
        Some(json!({
            "title": "First post",
            "content": "Hello forum",
            "categories": ["General"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn signup_reports_field_errors() {
    let (_tmp, app) = test_app();
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({
            "username": "al",
            "email": "not-an-email",
            "password": "short",
            "confirm_password": "short",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_string());
    assert!(body["username"].is_string());
    assert!(body["password"].is_string());
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (_tmp, app) = test_app();
    sign_up_and_in(&app, "alice").await;

    let (status, cookie, _) = send(
        &app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({ "username": "alice", "password": "Wrong!pass1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookie.is_none());
}

#[tokio::test]
async fn second_sign_in_invalidates_first_cookie() {
    let (_tmp, app) = test_app();
    let first = sign_up_and_in(&app, "alice").await;

    let (_, second, _) = send(
        &app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({ "username": "alice", "password": PASSWORD })),
    )
    .await;
    let second = second.unwrap();
    assert_ne!(first, second);

    let (status, _, _) = send(&app, Method::GET, "/auth/me", Some(&first), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(&app, Method::GET, "/auth/me", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn signout_clears_session() {
    let (_tmp, app) = test_app();
    let cookie = sign_up_and_in(&app, "alice").await;

    let (status, cleared, _) =
        send(&app, Method::POST, "/auth/signout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(cleared.as_deref(), Some("session_token="));

    let (status, _, _) = send(&app, Method::GET, "/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_users_can_read_but_not_write() {
    let (_tmp, app) = test_app();
    let cookie = sign_up_and_in(&app, "alice").await;
    let post_id = create_post(&app, &cookie).await;

    let (status, _, body) = send(&app, Method::GET, "/posts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["time_ago"], "just now");

    let (status, _, _) = send(
        &app,
        Method::POST,
        &format!("/posts/{}/react", post_id),
        None,
        Some(json!({ "like": true })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/posts",
        Some("session_token=forged"),
        Some(json!({ "title": "x", "content": "y", "categories": ["General"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reacting_toggles_counters() {
    let (_tmp, app) = test_app();
    let alice = sign_up_and_in(&app, "alice").await;
    let bob = sign_up_and_in(&app, "bob").await;
    let post_id = create_post(&app, &alice).await;
    let uri = format!("/posts/{}/react", post_id);

    let (_, _, body) = send(&app, Method::POST, &uri, Some(&bob), Some(json!({ "like": true }))).await;
    assert_eq!((body["likes"].as_i64(), body["dislikes"].as_i64()), (Some(1), Some(0)));
    assert_eq!(body["reaction"], "like");

    let (_, _, body) = send(&app, Method::POST, &uri, Some(&bob), Some(json!({ "like": false }))).await;
    assert_eq!((body["likes"].as_i64(), body["dislikes"].as_i64()), (Some(0), Some(1)));

    let (_, _, body) = send(&app, Method::POST, &uri, Some(&bob), Some(json!({ "like": false }))).await;
    assert_eq!((body["likes"].as_i64(), body["dislikes"].as_i64()), (Some(0), Some(0)));
    assert!(body["reaction"].is_null());

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/posts/9999/react",
        Some(&bob),
        Some(json!({ "like": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_are_owner_editable_and_notify_author() {
    let (_tmp, app) = test_app();
    let alice = sign_up_and_in(&app, "alice").await;
    let bob = sign_up_and_in(&app, "bob").await;
    let post_id = create_post(&app, &alice).await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        &format!("/posts/{}/comments", post_id),
        Some(&bob),
        Some(json!({ "content": "Nice post" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_uri = format!("/comments/{}", body["id"].as_i64().unwrap());

    let (status, _, _) = send(
        &app,
        Method::PUT,
        &comment_uri,
        Some(&alice),
        Some(json!({ "content": "edited by someone else" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        &app,
        Method::PUT,
        &comment_uri,
        Some(&bob),
        Some(json!({ "content": "Very nice post" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, body) = send(&app, Method::GET, &format!("/posts/{}", post_id), None, None).await;
    assert_eq!(body["comments"].as_i64(), Some(1));
    assert_eq!(body["comment_list"][0]["content"], "Very nice post");

    let (_, _, body) = send(&app, Method::GET, "/notifications", Some(&alice), None).await;
    assert_eq!(body[0]["kind"], "comment");
    assert_eq!(body[0]["actor_name"], "bob");

    let (status, _, _) = send(&app, Method::DELETE, &comment_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, Method::DELETE, &comment_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn categories_can_be_listed_and_added() {
    let (_tmp, app) = test_app();
    let cookie = sign_up_and_in(&app, "alice").await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/categories",
        Some(&cookie),
        Some(json!({ "name": "Rust" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Rust");

    let (_, _, body) = send(&app, Method::GET, "/categories", None, None).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"Rust"));
    assert!(names.contains(&"General"));
}
