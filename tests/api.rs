mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use festive_backend::middleware::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use common::{app, read, signed};

#[tokio::test]
async fn health_is_public() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn protected_route_requires_token() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/messages/christmas").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn forged_token_is_rejected() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::get("/api/notifications")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let (app, config) = app();
    let mut request = signed(&config, "GET", "/api/messages/christmas", Uuid::new_v4(), None);
    request.headers_mut().remove(SIGNATURE_HEADER);

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let (app, config) = app();
    let mut request = signed(&config, "GET", "/api/messages/christmas", Uuid::new_v4(), None);
    let stale = chrono::Utc::now().timestamp_millis() - 3 * 60 * 1000;
    request
        .headers_mut()
        .insert(TIMESTAMP_HEADER, stale.to_string().parse().unwrap());

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let (app, config) = app();
    let me = Uuid::new_v4();
    let original = json!({"recipientId": Uuid::new_v4(), "stickerType": "tree", "content": "hi", "season": "christmas"});
    let request = signed(&config, "POST", "/api/messages", me, Some(original));

    let (parts, _) = request.into_parts();
    let tampered = json!({"recipientId": Uuid::new_v4(), "stickerType": "tree", "content": "bye", "season": "christmas"});
    let request = Request::from_parts(parts, Body::from(tampered.to_string()));

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn signed_request_reaches_validation() {
    let (app, config) = app();
    let me = Uuid::new_v4();
    let body = json!({"recipientId": me, "stickerType": "tree", "content": "hi", "season": "christmas"});
    let request = signed(&config, "POST", "/api/messages", me, Some(body));

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[tokio::test]
async fn unknown_season_is_invalid_input() {
    let (app, config) = app();
    let request = signed(&config, "GET", "/api/messages/summer", Uuid::new_v4(), None);

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[tokio::test]
async fn out_of_range_position_is_rejected_before_lookup() {
    let (app, config) = app();
    let uri = format!("/api/messages/{}/position", Uuid::new_v4());
    let request = signed(&config, "PUT", &uri, Uuid::new_v4(), Some(json!({"left": 120.0, "top": 10.0})));

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[tokio::test]
async fn auth_routes_are_not_signed() {
    let (app, _) = app();
    let request = Request::post("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"userId": "waytoolonghandle", "nickname": "n", "password": "123456"}).to_string(),
        ))
        .unwrap();

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[tokio::test]
async fn undecodable_body_is_invalid_input_json() {
    let (app, config) = app();
    let body = json!({"requestId": Uuid::new_v4(), "action": "maybe"});
    let request = signed(&config, "POST", "/api/friends/respond", Uuid::new_v4(), Some(body));

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn missing_field_is_invalid_input() {
    let (app, config) = app();
    let request = signed(&config, "POST", "/api/friends/request", Uuid::new_v4(), Some(json!({})));

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[tokio::test]
async fn malformed_path_id_is_invalid_input() {
    let (app, config) = app();
    let request = signed(&config, "GET", "/api/messages/detail/not-a-uuid", Uuid::new_v4(), None);

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}

#[tokio::test]
async fn extreme_timestamp_is_rejected() {
    let (app, config) = app();
    let mut request = signed(&config, "GET", "/api/notifications", Uuid::new_v4(), None);
    request
        .headers_mut()
        .insert(TIMESTAMP_HEADER, i64::MIN.to_string().parse().unwrap());

    let (status, body) = read(app.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_SIGNATURE");
}
