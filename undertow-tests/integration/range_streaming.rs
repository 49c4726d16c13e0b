//! `GET /stream/torrent/{filename}` against ready jobs

use axum::http::header;
use undertow_core::swarm::MockFile;

use crate::support::{
    TestBridge, body_bytes, get, get_range, media_bytes, movie, stream_path,
};

const MOVIE_PATH: &str = "/stream/torrent/movie.mp4";

#[tokio::test]
async fn test_valid_ranges_return_206_with_exact_length() {
    let bridge = TestBridge::new();
    bridge.ready_with(vec![movie()]).await;
    let data = media_bytes(1000);

    for (start, end) in [(0u64, 0u64), (0, 499), (500, 999), (123, 456), (999, 999)] {
        let response = bridge
            .send(get_range(MOVIE_PATH, &format!("bytes={start}-{end}")))
            .await;

        assert_eq!(response.status(), 206);
        let expected_length = end - start + 1;
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            expected_length.to_string().as_str()
        );
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            format!("bytes {start}-{end}/1000").as_str()
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");

        let body = body_bytes(response).await;
        assert_eq!(body.as_ref(), &data[start as usize..=end as usize]);
    }
}

#[tokio::test]
async fn test_no_range_returns_full_length() {
    let bridge = TestBridge::new();
    bridge.ready_with(vec![movie()]).await;

    let response = bridge.send(get(MOVIE_PATH)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(body_bytes(response).await.len(), 1000);
}

#[tokio::test]
async fn test_open_ended_range_runs_to_last_byte() {
    let bridge = TestBridge::new();
    bridge.ready_with(vec![movie()]).await;

    let response = bridge.send(get_range(MOVIE_PATH, "bytes=600-")).await;
    assert_eq!(response.status(), 206);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 600-999/1000");
    assert_eq!(body_bytes(response).await.len(), 400);
}

#[tokio::test]
async fn test_malformed_ranges_are_rejected() {
    let bridge = TestBridge::new();
    let file = movie();
    let stats = file.stats();
    bridge.ready_with(vec![file]).await;

    for range in [
        "bytes=500-100",
        "bytes=1000-1200",
        "bytes=abc-",
        "bytes=-0",
        "bytes=0-10,20-30",
        "pages=0-10",
    ] {
        let response = bridge.send(get_range(MOVIE_PATH, range)).await;
        let status = response.status();
        assert!(status != 200 && status != 206, "{range} gave {status}");
        assert_eq!(status, 416, "{range}");
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }
    assert_eq!(stats.opened(), 0);
}

#[tokio::test]
async fn test_unknown_file_is_404() {
    let bridge = TestBridge::new();
    bridge.ready_with(vec![movie()]).await;

    let response = bridge.send(get("/stream/torrent/other.mp4")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_pending_job_files_are_not_served() {
    let bridge = TestBridge::new();
    assert_eq!(bridge.send(get(MOVIE_PATH)).await.status(), 404);
}

#[tokio::test]
async fn test_any_listed_file_is_streamable() {
    let bridge = TestBridge::new();
    bridge
        .ready_with(vec![movie(), MockFile::new("movie.srt", b"1\n00:00".to_vec())])
        .await;

    let response = bridge.send(get("/stream/torrent/movie.srt")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(body_bytes(response).await.as_ref(), b"1\n00:00");
}

#[tokio::test]
async fn test_encoded_filename_round_trips() {
    let bridge = TestBridge::new();
    let url = bridge
        .ready_with(vec![MockFile::new("Night & Day (1946).mp4", media_bytes(64))])
        .await;

    let path = stream_path(&url);
    assert_eq!(path, "/stream/torrent/Night%20%26%20Day%20%281946%29.mp4");

    let response = bridge.send(get(path)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "64");
}

#[tokio::test]
async fn test_read_failure_before_first_byte_is_500() {
    let bridge = TestBridge::new();
    bridge
        .ready_with(vec![movie().failing_at(0)])
        .await;

    let response = bridge.send(get(MOVIE_PATH)).await;
    assert_eq!(response.status(), 500);
    assert!(response.headers().get(header::CONTENT_RANGE).is_none());
}
