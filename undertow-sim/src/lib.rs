//! Undertow Simulation - offline swarm engine for development.

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! [`LibrarySwarmEngine`] answers swarm identifiers from a local media
//! library instead of a peer swarm. Metadata arrives after a configurable
//! delay and failures are injected from a seeded RNG, so runs against the
//! HTTP bridge are reproducible without network access.

pub mod library;
pub mod library_file;

pub use library::{LibraryEngineConfig, LibrarySwarmEngine};
pub use library_file::LibraryFile;
