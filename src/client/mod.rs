//! Control channel client
//!
//! The channel, its command pipeline, the connection tasks and feature
//! detection.

pub mod channel;
pub mod command;
pub mod features;
pub(crate) mod handler;
pub(crate) mod pipeline;

pub use channel::Channel;
pub use command::{Command, ReplyHandler, SyncHandler};
pub use features::FeatureSet;
