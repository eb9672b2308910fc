//! Common types shared by the herald broadcaster and its subscribers.
//!
//! This crate provides:
//! - The broadcast payload and its JSON wire codec ([`message`])
//! - Protocol constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod message;
pub mod types;

pub use message::{Message, MessageError};
