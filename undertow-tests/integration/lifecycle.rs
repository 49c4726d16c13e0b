//! Swarm job lifecycle over `POST /stream`

use std::time::Duration;

use undertow_core::config::UndertowConfig;
use undertow_core::swarm::MockFile;

use crate::support::{MAGNET, TestBridge, body_json, movie, post_json, post_stream};

fn patient_bridge() -> TestBridge {
    let mut config = UndertowConfig::for_testing();
    config.swarm.ready_timeout = Duration::from_secs(10);
    TestBridge::with_config(config)
}

async fn wait_for_waiters(bridge: &TestBridge, count: usize) {
    loop {
        let waiting = bridge
            .state
            .swarm
            .registry()
            .find(MAGNET)
            .map_or(0, |job| job.waiter_count());
        if waiting >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_concurrent_first_requests_add_once() {
    let bridge = patient_bridge();

    let first = tokio::spawn({
        let router = bridge.router();
        async move { tower::ServiceExt::oneshot(router, post_stream(MAGNET)).await }
    });
    let second = tokio::spawn({
        let router = bridge.router();
        async move { tower::ServiceExt::oneshot(router, post_stream(MAGNET)).await }
    });

    wait_for_waiters(&bridge, 2).await;
    assert!(bridge.engine.emit_ready(MAGNET, "Movie", vec![movie()]));

    let first = body_json(first.await.unwrap().unwrap()).await;
    let second = body_json(second.await.unwrap().unwrap()).await;
    assert_eq!(first, second);
    assert_eq!(bridge.engine.add_count(MAGNET), 1);
    assert_eq!(bridge.state.swarm.registry().len(), 1);
}

#[tokio::test]
async fn test_failed_job_leaves_registry() {
    let bridge = patient_bridge();

    let pending = tokio::spawn({
        let router = bridge.router();
        async move { tower::ServiceExt::oneshot(router, post_stream(MAGNET)).await }
    });
    wait_for_waiters(&bridge, 1).await;
    bridge.engine.emit_error(MAGNET, "metadata fetch failed");

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(
        body_json(response).await["error"],
        "Failed to process the torrent."
    );
    assert!(bridge.state.swarm.registry().find(MAGNET).is_none());
    assert!(bridge.engine.is_destroyed(MAGNET));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_job_leaves_registry() {
    let bridge = TestBridge::new();

    let response = bridge.send(post_stream(MAGNET)).await;
    assert_eq!(response.status(), 500);
    assert!(bridge.state.swarm.registry().is_empty());
    assert!(bridge.engine.is_destroyed(MAGNET));
}

#[tokio::test]
async fn test_registry_remove_is_idempotent() {
    let bridge = TestBridge::new();
    bridge.ready_with(vec![movie()]).await;
    let registry = bridge.state.swarm.registry();

    assert!(registry.remove(MAGNET).is_some());
    for _ in 0..3 {
        assert!(registry.remove(MAGNET).is_none());
        assert!(registry.is_empty());
    }
    assert!(!bridge.state.swarm.remove(MAGNET));
}

#[tokio::test]
async fn test_ready_job_answers_without_waiting() {
    let bridge = TestBridge::new();
    let first = bridge.ready_with(vec![movie()]).await;
    let second = bridge.ready_with(vec![movie()]).await;

    assert_eq!(first, second);
    assert_eq!(bridge.engine.add_count(MAGNET), 1);
}

#[tokio::test]
async fn test_first_mp4_in_listing_order_wins() {
    let bridge = TestBridge::new();
    let url = bridge
        .ready_with(vec![
            MockFile::new("sample.txt", vec![0u8; 10]),
            MockFile::new("part2.mp4", vec![0u8; 10]),
            MockFile::new("part1.mp4", vec![0u8; 10]),
        ])
        .await;

    assert!(url.ends_with("/stream/torrent/part2.mp4"));
}

#[tokio::test]
async fn test_no_media_file_is_400() {
    let bridge = TestBridge::new();
    bridge
        .engine
        .seed_ready(MAGNET, "Docs", vec![MockFile::new("readme.TXT", vec![1u8; 3])]);

    let response = bridge.send(post_stream(MAGNET)).await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        body_json(response).await["error"],
        "No MP4 file found in the torrent"
    );
}

#[tokio::test]
async fn test_missing_and_unsupported_links_are_400() {
    let bridge = TestBridge::new();

    let cases = [
        (serde_json::json!({}), "A valid link is required"),
        (serde_json::json!({ "link": "" }), "A valid link is required"),
        (serde_json::json!({ "link": 42 }), "A valid link is required"),
        (
            serde_json::json!({ "link": "https://example.com/movie.mp4" }),
            "Unsupported link type. Only magnet links are supported.",
        ),
        (
            serde_json::json!({ "link": "https://drive.google.com/file/d/XYZ/view" }),
            "Unsupported link type. Only magnet links are supported.",
        ),
        (
            serde_json::json!({ "link": format!(" {MAGNET}") }),
            "Unsupported link type. Only magnet links are supported.",
        ),
    ];

    for (body, message) in cases {
        let response = bridge.send(post_json(body.clone())).await;
        assert_eq!(response.status(), 400, "{body}");
        assert_eq!(body_json(response).await["error"], message, "{body}");
    }
    assert_eq!(bridge.engine.add_count(MAGNET), 0);
}

#[tokio::test]
async fn test_engine_refusal_is_500() {
    let bridge = TestBridge::new();
    bridge.engine.fail_adds("disk full");

    let response = bridge.send(post_stream(MAGNET)).await;
    assert_eq!(response.status(), 500);
    let body = body_json(response).await;
    assert!(!body["error"].as_str().unwrap().contains("disk full"));
    assert!(bridge.state.swarm.registry().is_empty());
}
