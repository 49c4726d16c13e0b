//! Response bodies for the two stream backends
//!
//! Swarm files are served from the local swarm engine with byte-range
//! support; cloud files are fetched remotely and piped through unchanged.

pub mod cloud_proxy;
pub mod range_responder;

pub use cloud_proxy::{direct_download_url, serve_cloud_file};
pub use range_responder::{GuardedBody, requested_range, serve_range};
