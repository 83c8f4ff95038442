//! # alcoord common library
//!
//! Shared code for the annotation coordinator and its model clients:
//! - Wire protocol messages (`ClientMessage` / `ServerMessage`)
//! - Configuration loading and data folder resolution
//! - Timestamp helpers used for latency telemetry

pub mod config;
pub mod error;
pub mod protocol;
pub mod time;

pub use error::{Error, Result};
pub use protocol::{ClientMessage, ServerMessage};
