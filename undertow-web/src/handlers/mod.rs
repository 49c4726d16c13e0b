//! HTTP request handlers organized by functionality

pub mod api;
pub mod streaming;

// Re-export handler functions
pub use api::{HealthStatus, api_health, api_jobs};
pub use streaming::{
    StreamQuery, StreamRequest, StreamResponse, create_stream, proxy_cloud_stream, stream_torrent,
};
