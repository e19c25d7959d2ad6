//! Error handlers
//!
//! Logging for errors that reach the dispatch boundary.

use crate::error::types::ChannelError;
use log::{error, warn};

/// Log an error that terminated the control channel.
pub fn handle_fatal(peer: &str, err: &ChannelError) {
    error!("Control channel to {} failed: {}", peer, err);
}

/// Log an error raised by a command handler. The dispatch loop keeps going.
pub fn handle_handler_error(command: &str, err: &ChannelError) {
    warn!("Handler for '{}' failed: {}", command, err);
}
