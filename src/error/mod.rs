//! Error handling
//!
//! Defines the channel error type and the fatal-error handling path.

pub mod handlers;
pub mod types;

pub use types::*;
