//! HTTP server for the Undertow streaming bridge
//!
//! Builds the shared state once at startup and hands it to every handler.
//! Swarm jobs live only as long as the process; they are all released on
//! graceful shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use undertow_core::config::UndertowConfig;
use undertow_core::swarm::{MediaResolver, SwarmEngine, SwarmService};
use undertow_core::{LinkClassifier, UndertowError};

use crate::handlers::{api_health, api_jobs, create_stream, proxy_cloud_stream, stream_torrent};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub swarm: SwarmService,
    pub classifier: LinkClassifier,
    pub config: Arc<UndertowConfig>,
    pub http: reqwest::Client,
    /// Base of the stream URLs handed to callers
    pub public_url: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the swarm service, link classifier and cloud HTTP client.
    ///
    /// # Errors
    /// - `UndertowError::Configuration` - HTTP client could not be built
    pub fn new(
        config: UndertowConfig,
        engine: Arc<dyn SwarmEngine>,
    ) -> undertow_core::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.cloud.user_agent.clone())
            .connect_timeout(config.cloud.connect_timeout)
            .build()
            .map_err(|e| UndertowError::Configuration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let swarm = SwarmService::new(
            engine,
            MediaResolver::new(config.swarm.media_suffix.clone()),
        );

        Ok(Self {
            swarm,
            classifier: LinkClassifier::new(config.cloud.host_marker.clone()),
            public_url: config.server.public_base_url().into(),
            config: Arc::new(config),
            http,
            started_at: Instant::now(),
        })
    }
}

/// Routes of the bridge, with permissive CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(proxy_cloud_stream).post(create_stream))
        .route("/stream/torrent/{filename}", get(stream_torrent))
        .route("/api/health", get(api_health))
        .route("/api/jobs", get(api_jobs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
///
/// When no public URL is configured, stream URLs point at the bound port.
///
/// # Errors
/// - `UndertowError::Io` - Address could not be bound or the server failed
/// - `UndertowError::Configuration` - Shared state could not be built
pub async fn run_server(
    mut config: UndertowConfig,
    engine: Arc<dyn SwarmEngine>,
) -> undertow_core::Result<()> {
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;

    if config.server.public_url.is_none() {
        config.server.public_url = Some(format!("http://localhost:{}", addr.port()));
    }

    let state = AppState::new(config, engine)?;
    info!("Undertow streaming bridge running on http://{}", addr);
    serve(listener, state, shutdown_signal()).await
}

/// Serves `state` on an already bound listener until `shutdown` resolves,
/// then releases every swarm job.
///
/// # Errors
/// - `UndertowError::Io` - Accept loop failed
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> undertow_core::Result<()> {
    let swarm = state.swarm.clone();

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    let released = swarm.shutdown();
    info!("Server stopped, released {} swarm jobs", released);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
