//! Undertow Core - swarm-backed media resolution
//!
//! This crate provides the building blocks behind the streaming bridge:
//! link classification, the swarm job registry and lifecycle manager,
//! media file resolution, byte-range handling and configuration.

pub mod config;
pub mod link;
pub mod magnet;
pub mod streaming;
pub mod swarm;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::UndertowConfig;
pub use link::{LinkClassifier, LinkError, LinkKind};
pub use streaming::{ByteRange, RangeError};
pub use swarm::{ReadyOutcome, SwarmError, SwarmService};

/// Core errors that can bubble up from any Undertow subsystem.
///
/// Groups failures into the three classes the HTTP layer cares about:
/// bad client input, a swarm that never became ready, and backend faults.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("No {suffix} file found in {resource}")]
    NoMediaFile { resource: String, suffix: String },

    #[error("File {name} not found among active jobs")]
    FileNotFound { name: String },

    #[error("Swarm resource {identifier} did not become ready in time")]
    ResourceTimeout { identifier: String },

    #[error("Cloud fetch failed: {reason}")]
    CloudFetch { reason: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a message that is safe to surface to HTTP callers.
    ///
    /// Client errors repeat their cause. Backend failures collapse into a
    /// generic message; the underlying cause is only logged.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Link(e) => e.to_string(),
            UndertowError::Range(e) => e.to_string(),
            UndertowError::NoMediaFile { .. } => "No MP4 file found in the torrent".to_string(),
            UndertowError::FileNotFound { .. } => "File not found.".to_string(),
            UndertowError::ResourceTimeout { .. } => {
                "Torrent loading timed out. Please try again.".to_string()
            }
            UndertowError::Swarm(_) => "Failed to process the torrent.".to_string(),
            UndertowError::CloudFetch { .. } => "Failed to stream the file.".to_string(),
            UndertowError::Configuration { .. } => "Configuration error occurred".to_string(),
            UndertowError::Io(_) => "Failed to stream the file.".to_string(),
        }
    }

    /// Checks if this error is due to caller input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Link(_)
                | UndertowError::Range(_)
                | UndertowError::NoMediaFile { .. }
                | UndertowError::FileNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_classified() {
        assert!(UndertowError::Link(LinkError::Missing).is_user_error());
        assert!(
            UndertowError::NoMediaFile {
                resource: "x".to_string(),
                suffix: ".mp4".to_string()
            }
            .is_user_error()
        );
        assert!(
            !UndertowError::ResourceTimeout {
                identifier: "magnet:?xt=urn:btih:abc".to_string()
            }
            .is_user_error()
        );
    }

    #[test]
    fn test_backend_failure_hides_cause() {
        let error = UndertowError::Swarm(SwarmError::Backend {
            reason: "tracker exploded at 10.0.0.7".to_string(),
        });
        assert_eq!(error.user_message(), "Failed to process the torrent.");
        assert!(!error.user_message().contains("10.0.0.7"));
    }
}
