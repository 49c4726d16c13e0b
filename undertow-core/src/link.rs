//! Link classification
//!
//! Decides which backend serves a caller-supplied link: the peer swarm,
//! the cloud-file proxy, or neither.

use std::sync::LazyLock;

use regex::Regex;

/// Scheme prefix of swarm identifiers.
pub const SWARM_PREFIX: &str = "magnet:";

static CLOUD_FILE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").ok());

/// Backend a link resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Swarm identifier, passed through opaque
    Swarm,
    /// Cloud-hosted file with its extracted id
    CloudFile { file_id: String },
    /// Neither backend applies
    Unsupported { reason: UnsupportedReason },
}

/// Why a link was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// Link matches no known backend
    UnknownScheme,
    /// Link names the cloud host but carries no file id
    MalformedCloudLink,
}

/// Errors surfaced to callers for unusable links.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("A valid link is required")]
    Missing,

    #[error("Unsupported link type")]
    Unsupported,

    #[error("Unsupported link type. Only magnet links are supported.")]
    SwarmOnly,

    #[error("Invalid cloud file link")]
    MalformedCloudLink,
}

impl From<UnsupportedReason> for LinkError {
    fn from(reason: UnsupportedReason) -> Self {
        match reason {
            UnsupportedReason::UnknownScheme => LinkError::Unsupported,
            UnsupportedReason::MalformedCloudLink => LinkError::MalformedCloudLink,
        }
    }
}

/// Stateless link classifier.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    cloud_host_marker: String,
}

impl LinkClassifier {
    /// Creates a classifier recognising cloud links by `cloud_host_marker`.
    pub fn new(cloud_host_marker: impl Into<String>) -> Self {
        Self {
            cloud_host_marker: cloud_host_marker.into(),
        }
    }

    /// Classifies a link. Has no side effects.
    pub fn classify(&self, link: &str) -> LinkKind {
        if link.starts_with(SWARM_PREFIX) {
            return LinkKind::Swarm;
        }

        if link.contains(&self.cloud_host_marker) {
            return match extract_cloud_file_id(link) {
                Some(file_id) => LinkKind::CloudFile { file_id },
                None => LinkKind::Unsupported {
                    reason: UnsupportedReason::MalformedCloudLink,
                },
            };
        }

        LinkKind::Unsupported {
            reason: UnsupportedReason::UnknownScheme,
        }
    }

    /// Validates an optional request field and classifies it as given,
    /// without trimming.
    ///
    /// # Errors
    /// - `LinkError::Missing` - Link absent or blank
    pub fn classify_required(&self, link: Option<&str>) -> Result<LinkKind, LinkError> {
        match link {
            Some(link) if !link.trim().is_empty() => Ok(self.classify(link)),
            _ => Err(LinkError::Missing),
        }
    }
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new("drive.google.com")
    }
}

/// Extracts the file id from the `/d/<id>` path segment of a cloud link.
pub fn extract_cloud_file_id(link: &str) -> Option<String> {
    CLOUD_FILE_ID
        .as_ref()?
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}
