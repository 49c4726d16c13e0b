//! End-to-end tests for Undertow
//!
//! These tests follow complete caller workflows: resolving a swarm link and
//! seeking through the stream, proxying a cloud file from a live upstream,
//! and serving a local library over a real socket.

#[path = "../support.rs"]
mod support;

mod cloud_proxy;
mod library_workflow;
mod streaming_workflow;
