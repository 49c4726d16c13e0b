//! The bridge on a real socket, backed by the library swarm engine

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use undertow_core::config::UndertowConfig;
use undertow_core::swarm::SwarmService;
use undertow_sim::{LibraryEngineConfig, LibrarySwarmEngine};
use undertow_web::AppState;

use crate::support::media_bytes;

const HASH: &str = "08ada5a7a6183aae1e09d831df6748d566095a10";

struct RunningBridge {
    addr: SocketAddr,
    swarm: SwarmService,
    stop: oneshot::Sender<()>,
    server: JoinHandle<undertow_core::Result<()>>,
}

impl RunningBridge {
    async fn start(library: &Path, ready_timeout: Duration) -> Self {
        let engine = LibrarySwarmEngine::new(
            library,
            LibraryEngineConfig {
                metadata_delay: Duration::from_millis(10),
                chunk_size: 512,
                ..LibraryEngineConfig::default()
            },
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = UndertowConfig::for_testing();
        config.server.public_url = Some(format!("http://{addr}"));
        config.swarm.ready_timeout = ready_timeout;

        let state = AppState::new(config, Arc::new(engine)).unwrap();
        let swarm = state.swarm.clone();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(undertow_web::serve(listener, state, async {
            let _ = stopped.await;
        }));

        Self {
            addr,
            swarm,
            stop,
            server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(self) -> SwarmService {
        let _ = self.stop.send(());
        self.server.await.unwrap().unwrap();
        self.swarm
    }
}

fn sintel_library() -> tempfile::TempDir {
    let library = tempfile::tempdir().unwrap();
    let entry = library.path().join("Sintel");
    std::fs::create_dir(&entry).unwrap();
    std::fs::write(entry.join("sintel.en.srt"), b"1\n00:00:01,000").unwrap();
    std::fs::write(entry.join("sintel.mp4"), media_bytes(4096)).unwrap();
    library
}

#[tokio::test]
async fn test_library_entry_streams_over_socket() {
    let library = sintel_library();
    let bridge = RunningBridge::start(library.path(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let magnet = format!("magnet:?xt=urn:btih:{HASH}&dn=Sintel");
    let response = client
        .post(bridge.url("/stream"))
        .json(&serde_json::json!({ "link": magnet }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    let stream_url = body["streamUrl"].as_str().unwrap().to_string();
    assert_eq!(stream_url, bridge.url("/stream/torrent/sintel.mp4"));

    let ranged = client
        .get(&stream_url)
        .header(RANGE, "bytes=1000-2999")
        .send()
        .await
        .unwrap();
    assert_eq!(ranged.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(ranged.headers()[CONTENT_RANGE], "bytes 1000-2999/4096");
    let bytes = ranged.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), &media_bytes(4096)[1000..3000]);

    let full = client.get(&stream_url).send().await.unwrap();
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.bytes().await.unwrap().len(), 4096);

    drop(client);
    let swarm = bridge.shutdown().await;
    assert!(swarm.registry().is_empty());
}

#[tokio::test]
async fn test_unknown_library_entry_times_out() {
    let library = sintel_library();
    let bridge = RunningBridge::start(library.path(), Duration::from_millis(200)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(bridge.url("/stream"))
        .json(&serde_json::json!({ "link": format!("magnet:?xt=urn:btih:{HASH}&dn=Unknown") }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(bridge.swarm.registry().is_empty());

    drop(client);
    bridge.shutdown().await;
}
