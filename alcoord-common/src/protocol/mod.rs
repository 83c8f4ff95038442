//! Wire protocol for the `/model` coordination channel
//!
//! Every frame is one JSON object tagged by `type`. Both directions form a
//! closed set of variants with fixed field lists; decoding always validates
//! field values before a message reaches a handler.

mod client_messages;
mod server_messages;

pub use client_messages::ClientMessage;
pub use server_messages::ServerMessage;

use crate::{Error, Result};

/// Endpoint path the coordination channel is served under
pub const MODEL_ENDPOINT: &str = "/model";

/// Binary class label carried by annotations
pub type Label = i64;

/// True when `label` is one of the two binary classes
pub fn is_valid_label(label: Label) -> bool {
    label == 0 || label == 1
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidMessage(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_seconds(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidMessage(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, value
        )));
    }
    Ok(())
}

fn require_ratio(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidMessage(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )));
    }
    Ok(())
}

fn require_label(field: &str, value: Label) -> Result<()> {
    if !is_valid_label(value) {
        return Err(Error::InvalidMessage(format!(
            "{} must be 0 or 1, got {}",
            field, value
        )));
    }
    Ok(())
}
