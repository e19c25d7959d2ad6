//! Utility functions
//!
//! Provides logging setup, URI handling and lock helpers.

pub mod logging;
pub mod network;
pub mod sync;
