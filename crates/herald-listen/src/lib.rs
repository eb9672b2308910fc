//! Subscriber for a herald broadcaster: connect, print each message, and
//! reconnect with backoff when the connection drops.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Reconnect delay with jitter.
pub mod backoff;
/// Command-line options.
pub mod config;
/// Error type.
pub mod error;
/// Connect and relay loop.
pub mod listen;

pub use error::ListenError;
pub use listen::run;
