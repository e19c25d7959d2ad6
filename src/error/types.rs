//! Error types
//!
//! Defines the error type shared by every part of the control channel.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::protocol::Reply;

/// Errors produced by the control channel.
///
/// The type is `Clone` because a single failure (for example the connection
/// dropping) has to resolve every pending command future at once.
#[derive(Debug, Clone)]
pub enum ChannelError {
    /// A reply carried a code outside `[100, 699]`.
    InvalidReplyCode(u16),
    /// A reply with no lines was constructed.
    EmptyReply,
    /// A reply line could not be parsed.
    MalformedReply(String),
    /// A protected (6xx) reply could not be unwrapped.
    BadProtectedReply(String),
    /// A reply line exceeded the configured maximum length.
    LineTooLong(usize),
    /// The server answered a command with a 4xx/5xx reply.
    NegativeReply(Reply),
    /// The AUTH/ADAT exchange failed.
    Handshake(String),
    /// The security context failed to protect or unprotect a payload.
    Security(String),
    /// A command handler returned an error or panicked.
    Handler(String),
    /// The connection failed.
    Io(Arc<io::Error>),
    /// The channel has been closed.
    Closed,
    /// The URI could not be turned into a server address.
    InvalidUri(String),
}

impl ChannelError {
    /// Returns true if the error cannot be attributed to a single command and
    /// must close the whole channel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::InvalidReplyCode(_)
                | ChannelError::EmptyReply
                | ChannelError::MalformedReply(_)
                | ChannelError::BadProtectedReply(_)
                | ChannelError::LineTooLong(_)
                | ChannelError::Io(_)
                | ChannelError::Closed
        )
    }

    /// Returns the reply behind a negative-reply error, if any.
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            ChannelError::NegativeReply(reply) => Some(reply),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::InvalidReplyCode(code) => write!(f, "Bad reply code: {}", code),
            ChannelError::EmptyReply => write!(f, "Reply has no lines"),
            ChannelError::MalformedReply(s) => write!(f, "Bad reply from server: {}", s),
            ChannelError::BadProtectedReply(s) => write!(f, "Bad protected reply: {}", s),
            ChannelError::LineTooLong(n) => write!(f, "Reply line longer than {} bytes", n),
            ChannelError::NegativeReply(r) => write!(f, "{} {}", r.code(), r.description()),
            ChannelError::Handshake(s) => write!(f, "Authentication failed: {}", s),
            ChannelError::Security(s) => write!(f, "Security context error: {}", s),
            ChannelError::Handler(s) => write!(f, "Command handler failed: {}", s),
            ChannelError::Io(e) => write!(f, "I/O error: {}", e),
            ChannelError::Closed => write!(f, "Control channel closed"),
            ChannelError::InvalidUri(s) => write!(f, "Invalid URI: {}", s),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(error: io::Error) -> Self {
        ChannelError::Io(Arc::new(error))
    }
}

impl From<base64::DecodeError> for ChannelError {
    fn from(error: base64::DecodeError) -> Self {
        ChannelError::BadProtectedReply(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ChannelError::MalformedReply("x".into()).is_fatal());
        assert!(ChannelError::InvalidReplyCode(42).is_fatal());
        assert!(ChannelError::from(io::Error::other("boom")).is_fatal());
        assert!(!ChannelError::Handshake("denied".into()).is_fatal());
        assert!(!ChannelError::Handler("oops".into()).is_fatal());
    }

    #[test]
    fn test_negative_reply_display_uses_description() {
        let reply = Reply::new(530, vec![b"Login incorrect.".to_vec()]).unwrap();
        let err = ChannelError::NegativeReply(reply);
        assert_eq!(err.to_string(), "530 Not logged in");
        assert_eq!(err.reply().map(|r| r.code()), Some(530));
        assert!(!err.is_fatal());
    }
}
