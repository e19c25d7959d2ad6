pub mod auth;
pub mod bell;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod utils;

pub use bell::Bell;
pub use client::{Channel, Command};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use protocol::Reply;
