//! Undertow Web - HTTP streaming bridge

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! JSON API that turns caller-supplied links into playable streams:
//! swarm resources are served with byte ranges, cloud files are proxied.

pub mod error;
pub mod handlers;
pub mod server;
pub mod streaming;

// Re-export main types
pub use error::ApiError;
pub use server::{AppState, build_router, run_server, serve};
