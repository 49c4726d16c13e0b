//! Shared harness: the bridge router wired to a mock swarm engine.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use tower::ServiceExt;
use undertow_core::config::UndertowConfig;
use undertow_core::swarm::{MockFile, MockSwarmEngine};
use undertow_web::{AppState, build_router};

pub const MAGNET: &str = "magnet:?xt=urn:btih:abc";

/// Deterministic payload standing in for media bytes.
pub fn media_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// The resource of the streaming scenarios: one `movie.mp4` of 1000 bytes.
pub fn movie() -> MockFile {
    MockFile::new("movie.mp4", media_bytes(1000))
}

pub struct TestBridge {
    pub engine: MockSwarmEngine,
    pub state: AppState,
    router: Router,
}

impl TestBridge {
    pub fn new() -> Self {
        Self::with_config(UndertowConfig::for_testing())
    }

    pub fn with_config(config: UndertowConfig) -> Self {
        let engine = MockSwarmEngine::new();
        let state = AppState::new(config, Arc::new(engine.clone())).unwrap();
        let router = build_router(state.clone());
        Self {
            engine,
            state,
            router,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }

    /// Registers `files` under [`MAGNET`] and resolves it through `POST /stream`.
    pub async fn ready_with(&self, files: Vec<MockFile>) -> String {
        self.engine.seed_ready(MAGNET, "Movie", files);
        let response = self.send(post_stream(MAGNET)).await;
        assert_eq!(response.status(), 200);
        body_json(response).await["streamUrl"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

pub fn post_stream(link: &str) -> Request<Body> {
    post_json(serde_json::json!({ "link": link }))
}

pub fn post_json(body: serde_json::Value) -> Request<Body> {
    Request::post("/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn get_range(uri: &str, range: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::RANGE, range)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    to_bytes(response.into_body(), 16 * 1024 * 1024).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Path part of a stream URL returned by `POST /stream`.
pub fn stream_path(stream_url: &str) -> &str {
    let start = stream_url.find("/stream/torrent/").unwrap();
    &stream_url[start..]
}
