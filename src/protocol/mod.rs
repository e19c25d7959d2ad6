//! FTP control-channel protocol
//!
//! Reply representation, reply decoding, command encoding and reply codes.

pub mod decoder;
pub mod encoder;
pub mod encoding;
pub mod reply;
pub mod responses;

pub use decoder::{ReplyDecoder, unprotect_reply};
pub use encoder::{encode_command, join_command};
pub use encoding::TextEncoding;
pub use reply::{Reply, ReplyKind};
