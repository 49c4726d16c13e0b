//! Resolve a swarm link, then seek through its stream.

use axum::http::header;
use futures::StreamExt;
use undertow_core::swarm::MockFile;

use crate::support::{
    MAGNET, TestBridge, body_bytes, body_json, get_range, media_bytes, movie, post_stream,
    stream_path,
};

#[tokio::test]
async fn test_post_stream_returns_stream_url() {
    let bridge = TestBridge::new();
    bridge.engine.seed_ready(MAGNET, "Movie", vec![movie()]);

    let response = bridge.send(post_stream(MAGNET)).await;
    assert_eq!(response.status(), 200);

    let body = body_json(response).await;
    assert_eq!(
        body["streamUrl"],
        "http://localhost:3000/stream/torrent/movie.mp4"
    );
}

#[tokio::test]
async fn test_range_request_after_resolution() {
    let bridge = TestBridge::new();
    let url = bridge.ready_with(vec![movie()]).await;

    let response = bridge.send(get_range(stream_path(&url), "bytes=0-499")).await;

    assert_eq!(response.status(), 206);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-499/1000");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "500");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(body_bytes(response).await.as_ref(), &media_bytes(1000)[..500]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_fresh_attempt() {
    let bridge = TestBridge::new();

    let response = bridge.send(post_stream(MAGNET)).await;
    assert_eq!(response.status(), 500);
    assert_eq!(
        body_json(response).await["error"],
        "Torrent loading timed out. Please try again."
    );
    assert!(bridge.state.swarm.registry().find(MAGNET).is_none());
    assert_eq!(bridge.engine.add_count(MAGNET), 1);

    // A retry starts a new job, which can still succeed
    bridge.engine.seed_ready(MAGNET, "Movie", vec![movie()]);
    let response = bridge.send(post_stream(MAGNET)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(bridge.engine.add_count(MAGNET), 2);
    assert_eq!(bridge.state.swarm.registry().len(), 1);
}

#[tokio::test]
async fn test_client_disconnect_destroys_read_stream() {
    let bridge = TestBridge::new();
    let file = MockFile::new("movie.mp4", media_bytes(1000)).stalling_after(2);
    let stats = file.stats();
    let url = bridge.ready_with(vec![file]).await;

    let response = bridge.send(get_range(stream_path(&url), "bytes=0-499")).await;
    assert_eq!(response.status(), 206);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), &media_bytes(1000)[..100]);
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.closed(), 0);

    // The player goes away mid-range
    drop(body);
    assert_eq!(stats.closed(), 1);

    // The job survives and later requests still stream
    assert!(bridge.state.swarm.find_file("movie.mp4").is_some());
}

#[tokio::test]
async fn test_seek_sequence_reads_consistent_bytes() {
    let bridge = TestBridge::new();
    let url = bridge.ready_with(vec![movie()]).await;
    let data = media_bytes(1000);

    let mut assembled = Vec::new();
    for (start, end) in [(0, 249), (250, 499), (500, 749), (750, 999)] {
        let response = bridge
            .send(get_range(stream_path(&url), &format!("bytes={start}-{end}")))
            .await;
        assembled.extend_from_slice(&body_bytes(response).await);
    }
    assert_eq!(assembled, data);
}
