//! IPC surface tests: drive the axum router directly with `tower::ServiceExt::oneshot`,
//! against an edge node backed by an in-memory store and a loopback bus.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use tower::ServiceExt;

use edgekv::EdgeNode;
use edgekv_stores::MemoryStore;
use edgekv_test_utils::LocalBus;

async fn test_edge() -> Arc<EdgeNode> {
    let bus = LocalBus::new();
    let edge = Arc::new(EdgeNode::new("E1", MemoryStore::new(), bus as Arc<dyn edgekv::bus::Bus>).unwrap());
    edge.run().await.unwrap();
    edge
}

#[tokio::test]
async fn healthz_reports_ok() {
    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    let resp = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn post_then_get_key_round_trips() {
    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    let post = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/key/test.id")
                .body(Body::from("1234"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::OK);

    let get = app
        .oneshot(Request::builder().uri("/key/test.id").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let body = get.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], serde_json::json!("ok"));
    assert_eq!(json["data"], serde_json::json!(1234));
}

#[tokio::test]
async fn post_with_type_query_coerces_plain_text_body() {
    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    let post = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/key/test.enabled?type=bool")
                .body(Body::from("true"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::OK);

    let get = app
        .oneshot(Request::builder().uri("/key/test.enabled").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = get.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"], serde_json::json!(true));
}

#[tokio::test]
async fn get_missing_key_reports_404() {
    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    let resp = app
        .oneshot(Request::builder().uri("/key/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], serde_json::json!("error"));
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn keys_lists_written_roots() {
    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/key/test.id")
                .body(Body::from("1"))
                .unwrap(),
        )
        .await
        .unwrap();

    let resp = app
        .oneshot(Request::builder().uri("/keys").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let keys: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(keys, vec!["test".to_string()]);
}

#[tokio::test]
async fn watch_stream_emits_base64_encoded_change_events() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    let watch_resp = app
        .clone()
        .oneshot(Request::builder().uri("/watch/test.*").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(watch_resp.status(), StatusCode::OK);
    let mut body = watch_resp.into_body().into_data_stream();

    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/key/test.on")
            .body(Body::from("true"))
            .unwrap(),
    )
    .await
    .unwrap();

    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), body.next())
        .await
        .expect("event arrives before timeout")
        .expect("stream yields a chunk")
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.starts_with("event: change\n"), "got: {text}");
    let data_line = text
        .lines()
        .find(|l| l.starts_with("data: "))
        .expect("data line present");
    let decoded = BASE64.decode(data_line.trim_start_matches("data: ")).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(json["key"], serde_json::json!("test.on"));
    assert_eq!(json["new"], serde_json::json!(true));
}

#[tokio::test]
async fn pending_bind_session_round_trips_over_rest() {
    let edge = test_edge().await;
    let app = edgekv_edge::ipc::router(edge);

    let missing = app
        .clone()
        .oneshot(Request::builder().uri("/bind/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let put_missing = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/bind/nope")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({"value": null, "found": false}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put_missing.status(), StatusCode::NOT_FOUND);
}
