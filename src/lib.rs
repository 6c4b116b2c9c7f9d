//! Labbridge – correlated async RPC between a backend and a workbench frontend
//!
//! This crate implements the backend half of the bridge:
//! - Request/response pairing over a transport with no built-in correlation
//! - Identity and singleton registries for endpoints
//! - Weakly held connection handles for remote disposable objects
//! - A declarative transform protocol turning payloads into live handles
//! - Task tracking, cancellation on close, and pluggable error hooks
//! - A ready handshake gating operations until the frontend is initialized

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Core correlation layer: endpoints, waiters, transforms, connections
pub mod rpc;

/// Thin typed call-sites over the core for common frontend operations
pub mod frontend;

/// Shared helpers
pub mod util;

// Re-export key types for convenience
pub use rpc::{BridgeConfig, Endpoint, EndpointBuilder};

/// Current version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version advertised to the frontend
pub const PROTOCOL_VERSION: &str = "1.0.0";
