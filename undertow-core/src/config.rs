//! Centralized configuration for Undertow.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub server: ServerConfig,
    pub swarm: SwarmConfig,
    pub streaming: StreamingConfig,
    pub cloud: CloudConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,
    /// Listening port
    pub port: u16,
    /// Base URL used when handing stream links back to callers.
    /// `None` means `http://localhost:<port>`.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// Base URL that stream links are built from, without trailing slash.
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }
}

/// Swarm job configuration.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// How long a single `POST /stream` caller waits for metadata
    pub ready_timeout: Duration,
    /// Suffix a contained file must end with to be served
    pub media_suffix: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            media_suffix: ".mp4".to_string(),
        }
    }
}

/// Range streaming configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Preferred read size when pulling bytes from a swarm file
    pub chunk_size: usize,
    /// Content type announced for torrent-backed streams
    pub content_type: &'static str,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024, // 256 KiB
            content_type: "video/mp4",
        }
    }
}

/// Cloud file proxy configuration.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Substring identifying cloud-file links
    pub host_marker: String,
    /// Endpoint that serves `?id=<file id>&export=download`
    pub download_base_url: String,
    /// User agent for upstream requests
    pub user_agent: String,
    /// Connect timeout for upstream requests
    pub connect_timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            host_marker: "drive.google.com".to_string(),
            download_base_url: "https://drive.google.com/uc".to_string(),
            user_agent: concat!("undertow/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("UNDERTOW_HOST") {
            config.server.host = host;
        }

        // `PORT` is the conventional listening-port variable; the prefixed one wins.
        for key in ["PORT", "UNDERTOW_PORT"] {
            if let Ok(port) = std::env::var(key) {
                if let Ok(port) = port.parse::<u16>() {
                    config.server.port = port;
                }
            }
        }

        if let Ok(url) = std::env::var("UNDERTOW_PUBLIC_URL") {
            config.server.public_url = Some(url);
        }

        if let Ok(timeout) = std::env::var("UNDERTOW_READY_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.swarm.ready_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(base) = std::env::var("UNDERTOW_CLOUD_BASE_URL") {
            config.cloud.download_base_url = base;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.server.port = 0;
        config.server.public_url = Some("http://localhost:3000".to_string());
        config.swarm.ready_timeout = Duration::from_millis(500);
        config.streaming.chunk_size = 64;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = UndertowConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.swarm.ready_timeout, Duration::from_secs(30));
        assert_eq!(config.swarm.media_suffix, ".mp4");
        assert_eq!(config.streaming.content_type, "video/mp4");
        assert_eq!(config.cloud.host_marker, "drive.google.com");
        assert_eq!(config.server.public_base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_public_url_trailing_slash_trimmed() {
        let server = ServerConfig {
            public_url: Some("https://media.example.com/".to_string()),
            ..Default::default()
        };
        assert_eq!(server.public_base_url(), "https://media.example.com");
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("PORT", "4000");
            std::env::set_var("UNDERTOW_READY_TIMEOUT", "5");
            std::env::set_var("UNDERTOW_CLOUD_BASE_URL", "http://127.0.0.1:9/uc");
        }

        let config = UndertowConfig::from_env();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.swarm.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.cloud.download_base_url, "http://127.0.0.1:9/uc");

        unsafe {
            std::env::remove_var("PORT");
            std::env::remove_var("UNDERTOW_READY_TIMEOUT");
            std::env::remove_var("UNDERTOW_CLOUD_BASE_URL");
        }
    }
}
