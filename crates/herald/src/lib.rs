//! herald: WebSocket fan-out broadcaster with optional last-message replay.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and server configuration.
pub mod config;
/// Per-connection handshake gate, registration and read loop.
pub mod connection;
/// Error types for broadcaster operations.
pub mod error;
/// Registry, last-message cache and broadcast fan-out.
pub mod hub;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Logging and metrics hooks invoked by the hub.
pub mod observer;
/// Origin and host allow-list decisions.
pub mod origin;
/// Line-oriented input that feeds broadcasts.
pub mod producer;
/// Connection handles and the membership set.
pub mod registry;
/// Accept loop and shared server state.
pub mod server;

pub use hub::Hub;
pub use server::{run, run_with_shutdown, ServerState};
