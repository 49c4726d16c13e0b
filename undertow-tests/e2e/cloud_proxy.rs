//! `GET /stream` against a live in-process upstream

use std::collections::HashMap;

use axum::Router;
use axum::extract::Query;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use undertow_core::config::UndertowConfig;

use crate::support::{TestBridge, body_bytes, body_json};

async fn upstream_download(Query(params): Query<HashMap<String, String>>) -> Response {
    let export = params.get("export").map(String::as_str);
    match (params.get("id").map(String::as_str), export) {
        (Some("XYZ"), Some("download")) => (
            [(header::CONTENT_TYPE, "video/webm")],
            "cloud media bytes",
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Starts a fake cloud host and returns its download base URL.
async fn spawn_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/uc", get(upstream_download));
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}/uc")
}

async fn bridge_with_upstream() -> TestBridge {
    let mut config = UndertowConfig::for_testing();
    config.cloud.download_base_url = spawn_upstream().await;
    TestBridge::with_config(config)
}

#[tokio::test]
async fn test_cloud_file_is_proxied_inline() {
    let bridge = bridge_with_upstream().await;

    let response = bridge
        .send(crate::support::get(
            "/stream?link=https://drive.google.com/file/d/XYZ/view",
        ))
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/webm");
    assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "inline");
    assert_eq!(body_bytes(response).await.as_ref(), b"cloud media bytes");
}

#[tokio::test]
async fn test_upstream_failure_is_500() {
    let bridge = bridge_with_upstream().await;

    let response = bridge
        .send(crate::support::get(
            "/stream?link=https://drive.google.com/file/d/MISSING/view",
        ))
        .await;

    assert_eq!(response.status(), 500);
    assert_eq!(body_json(response).await["error"], "Failed to stream the file.");
}

#[tokio::test]
async fn test_unusable_links_are_400() {
    let bridge = bridge_with_upstream().await;

    let cases = [
        ("/stream", "A valid link is required"),
        ("/stream?link=", "A valid link is required"),
        ("/stream?link=https://example.com/movie.mp4", "Unsupported link type"),
        ("/stream?link=magnet:?xt=urn:btih:abc", "Unsupported link type"),
        (
            "/stream?link=https://drive.google.com/open?usp=sharing",
            "Invalid cloud file link",
        ),
    ];

    for (uri, message) in cases {
        let response = bridge.send(crate::support::get(uri)).await;
        assert_eq!(response.status(), 400, "{uri}");
        assert_eq!(body_json(response).await["error"], message, "{uri}");
    }
}
