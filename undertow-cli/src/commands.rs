//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use undertow_core::config::UndertowConfig;
use undertow_core::{LinkClassifier, LinkError, LinkKind};
use undertow_sim::{LibraryEngineConfig, LibrarySwarmEngine};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming bridge
    Serve {
        /// Host to bind to (default from UNDERTOW_HOST or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (default from PORT, UNDERTOW_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
        /// Base URL used in returned stream URLs
        #[arg(long)]
        public_url: Option<String>,
        /// Seconds to wait for swarm metadata
        #[arg(long)]
        ready_timeout: Option<u64>,
        /// Media library served by the development swarm engine
        #[arg(long, default_value = "library")]
        library: PathBuf,
        /// Simulated metadata latency in milliseconds
        #[arg(long, default_value = "200")]
        metadata_delay_ms: u64,
        /// Probability that a simulated download fails
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,
        /// Seed for failure injection
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Show which backend would serve a link
    Classify {
        /// Link to classify
        link: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            public_url,
            ready_timeout,
            library,
            metadata_delay_ms,
            failure_rate,
            seed,
        } => {
            let mut config = UndertowConfig::from_env();
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if public_url.is_some() {
                config.server.public_url = public_url;
            }
            if let Some(seconds) = ready_timeout {
                config.swarm.ready_timeout = Duration::from_secs(seconds);
            }

            let engine_config = LibraryEngineConfig {
                metadata_delay: Duration::from_millis(metadata_delay_ms),
                failure_rate,
                seed,
                chunk_size: config.streaming.chunk_size,
            };
            serve(config, library, engine_config).await
        }
        Commands::Classify { link } => {
            println!("{}", classify(&link));
            Ok(())
        }
    }
}

/// Runs the bridge against the library-backed swarm engine.
///
/// # Errors
/// - Server could not bind or failed while running
pub async fn serve(
    config: UndertowConfig,
    library: PathBuf,
    engine_config: LibraryEngineConfig,
) -> anyhow::Result<()> {
    if !library.is_dir() {
        tracing::warn!(
            "Library directory {} does not exist; every swarm link will time out",
            library.display()
        );
    }

    tracing::info!(
        "Serving swarm links from library {} (ready timeout {:?})",
        library.display(),
        config.swarm.ready_timeout
    );
    let engine = Arc::new(LibrarySwarmEngine::new(library, engine_config));

    undertow_web::run_server(config, engine)
        .await
        .context("streaming bridge stopped with an error")
}

/// Human-readable classifier verdict.
pub fn classify(link: &str) -> String {
    let classifier = LinkClassifier::new(UndertowConfig::from_env().cloud.host_marker);
    match classifier.classify_required(Some(link)) {
        Ok(LinkKind::Swarm) => "swarm identifier (served by POST /stream)".to_string(),
        Ok(LinkKind::CloudFile { file_id }) => {
            format!("cloud file {file_id} (served by GET /stream)")
        }
        Ok(LinkKind::Unsupported { reason }) => {
            format!("unsupported: {}", LinkError::from(reason))
        }
        Err(e) => format!("unsupported: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_verdicts() {
        assert!(classify("magnet:?xt=urn:btih:abc").starts_with("swarm"));
        assert_eq!(
            classify("https://drive.google.com/file/d/XYZ/view"),
            "cloud file XYZ (served by GET /stream)"
        );
        assert_eq!(
            classify("https://drive.google.com/open"),
            "unsupported: Invalid cloud file link"
        );
        assert_eq!(classify("  "), "unsupported: A valid link is required");
    }
}
