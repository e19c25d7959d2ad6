//! Logging utilities
//!
//! Provides logging setup and configuration.

/// Setup logging for the client. Honours `RUST_LOG`, defaulting to `info`.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
