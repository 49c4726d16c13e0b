//! Swarm-backed media jobs
//!
//! The peer-swarm engine is an external collaborator reached through the
//! traits below. [`SwarmService`] owns the job table and bridges the engine's
//! asynchronous readiness events to short-lived HTTP requests.

pub mod job;
pub mod registry;
pub mod resolver;
pub mod service;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

pub use job::{JobPhase, SwarmJob, Waiter};
pub use registry::SwarmRegistry;
pub use resolver::{MediaFile, MediaResolver};
pub use service::{JobSnapshot, ReadyOutcome, SwarmService};
#[cfg(any(test, feature = "test-utils"))]
pub use test_mocks::{MockFile, MockSwarmEngine};

use crate::streaming::{ByteRange, ByteStream};

/// Peer-swarm engine capability.
///
/// `add` returns immediately; metadata arrives later on the handle's event
/// channel. It is synchronous so the registry can call it while holding its
/// lock, which keeps the one-add-per-identifier guarantee trivial.
pub trait SwarmEngine: Send + Sync {
    /// Starts fetching the resource named by `identifier`.
    ///
    /// # Errors
    /// - `SwarmError::InvalidIdentifier` - Engine cannot interpret the identifier
    /// - `SwarmError::Backend` - Engine refused the download
    fn add(&self, identifier: &str) -> Result<SwarmHandle, SwarmError>;
}

/// Live download held by the engine.
pub trait SwarmTorrent: Send + Sync {
    /// Releases every backend resource held for this download. Idempotent.
    fn destroy(&self);
}

/// One file contained in a ready swarm resource.
pub trait SwarmFile: Send + Sync {
    /// File name as listed by the resource
    fn name(&self) -> &str;

    /// Length in bytes
    fn length(&self) -> u64;

    /// Opens an ordered read over `range`, or the whole file for `None`.
    ///
    /// # Errors
    /// - `SwarmError::Destroyed` - The owning download was torn down
    /// - `SwarmError::Io` - The read could not be started
    fn open(&self, range: Option<ByteRange>) -> Result<ByteStream, SwarmError>;
}

/// Result of [`SwarmEngine::add`].
pub struct SwarmHandle {
    pub torrent: Arc<dyn SwarmTorrent>,
    pub events: mpsc::UnboundedReceiver<SwarmEvent>,
}

/// Notifications emitted by a download.
pub enum SwarmEvent {
    /// Metadata is known
    Ready(SwarmContents),
    /// Every piece has been downloaded
    Done,
    /// The download failed, before or after becoming ready
    Error(SwarmError),
}

/// Metadata of a ready swarm resource.
#[derive(Clone)]
pub struct SwarmContents {
    /// Display name of the resource
    pub name: String,
    /// Contained files in listing order
    pub files: Vec<Arc<dyn SwarmFile>>,
}

impl fmt::Debug for SwarmContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwarmContents")
            .field("name", &self.name)
            .field(
                "files",
                &self.files.iter().map(|file| file.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Errors reported by the swarm engine or its files.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Invalid swarm identifier: {reason}")]
    InvalidIdentifier { reason: String },

    #[error("Swarm backend error: {reason}")]
    Backend { reason: String },

    #[error("Swarm download was destroyed")]
    Destroyed,

    #[error("Swarm engine stopped reporting")]
    EngineShutdown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
