//! Integration tests for Undertow
//!
//! These tests drive the full router in-process against the mock swarm
//! engine. They cover the job lifecycle as seen over HTTP, the range
//! responder contract and the operational endpoints.

#[path = "support.rs"]
mod support;

#[path = "integration/http_api.rs"]
mod http_api;
#[path = "integration/lifecycle.rs"]
mod lifecycle;
#[path = "integration/range_streaming.rs"]
mod range_streaming;
