//! Health, job listing and CORS

use axum::body::Body;
use axum::http::{Request, header};

use crate::support::{MAGNET, TestBridge, body_json, get, movie};

#[tokio::test]
async fn test_health_reports_active_jobs() {
    let bridge = TestBridge::new();

    let health = body_json(bridge.send(get("/api/health")).await).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["active_jobs"], 0);
    assert!(health["uptime_seconds"].is_u64());

    bridge.ready_with(vec![movie()]).await;
    let health = body_json(bridge.send(get("/api/health")).await).await;
    assert_eq!(health["active_jobs"], 1);
}

#[tokio::test]
async fn test_jobs_lists_ready_resources() {
    let bridge = TestBridge::new();
    bridge.ready_with(vec![movie()]).await;

    let listing = body_json(bridge.send(get("/api/jobs")).await).await;
    assert_eq!(listing["total"], 1);

    let job = &listing["jobs"][0];
    assert_eq!(job["identifier"], MAGNET);
    assert_eq!(job["phase"], "ready");
    assert_eq!(job["name"], "Movie");
    assert_eq!(job["files"], 1);
    assert_eq!(job["waiters"], 0);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let bridge = TestBridge::new();
    let request = Request::get("/api/health")
        .header(header::ORIGIN, "http://player.example")
        .body(Body::empty())
        .unwrap();

    let response = bridge.send(request).await;
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_cors_preflight_for_post_stream() {
    let bridge = TestBridge::new();
    let request = Request::options("/stream")
        .header(header::ORIGIN, "http://player.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = bridge.send(request).await;
    assert!(response.status().is_success());
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS)
    );
}
