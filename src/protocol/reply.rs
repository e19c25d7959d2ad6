//! Module `reply`
//!
//! Defines the `Reply` type, an immutable decoded server response made of a
//! status code and one or more lines, together with its classification.

use std::fmt;

use crate::error::ChannelError;
use crate::protocol::encoding::TextEncoding;
use crate::protocol::responses;

/// The class of a reply, derived from the first digit of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// 1xx: more replies to the same command will follow.
    Preliminary,
    /// 2xx: the command succeeded.
    Complete,
    /// 3xx: the command needs a follow-up command.
    Incomplete,
    /// 4xx and 5xx: the command failed.
    Negative,
    /// 6xx: the payload is an encoded inner reply.
    Protected,
}

/// A reply from the server.
///
/// Lines are kept as raw bytes with the code prefix stripped and are decoded
/// with the channel's text encoding on access.
#[derive(Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<Vec<u8>>,
    encoding: TextEncoding,
}

impl Reply {
    /// Creates a reply decoded as UTF-8.
    ///
    /// Fails if `code` is outside `[100, 699]` or `lines` is empty.
    pub fn new(code: u16, lines: Vec<Vec<u8>>) -> Result<Self, ChannelError> {
        Self::with_encoding(code, lines, TextEncoding::Utf8)
    }

    /// Creates a reply whose lines are decoded with `encoding`.
    pub fn with_encoding(
        code: u16,
        lines: Vec<Vec<u8>>,
        encoding: TextEncoding,
    ) -> Result<Self, ChannelError> {
        if !(100..700).contains(&code) {
            return Err(ChannelError::InvalidReplyCode(code));
        }
        if lines.is_empty() {
            return Err(ChannelError::EmptyReply);
        }
        Ok(Self {
            code,
            lines,
            encoding,
        })
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// Number of lines in the reply.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false; a reply has at least one line.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns line `i` decoded as text, or an empty string if out of range.
    pub fn line(&self, i: usize) -> String {
        self.lines
            .get(i)
            .map(|l| self.encoding.decode(l))
            .unwrap_or_default()
    }

    /// Returns every line decoded as text.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().map(|l| self.encoding.decode(l)).collect()
    }

    /// Returns the undecoded lines.
    pub fn raw_lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    /// Returns the message carried by the reply.
    ///
    /// A single-line reply's message is its line. For a multi-line reply it
    /// is the lines between the first and the last, joined with newlines; a
    /// two-line reply has no interior and falls back to its first line.
    pub fn message(&self) -> String {
        if self.lines.len() <= 2 {
            return self.line(0);
        }
        self.lines[1..self.lines.len() - 1]
            .iter()
            .map(|l| self.encoding.decode(l))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns a human-readable description of the reply code.
    pub fn description(&self) -> &'static str {
        responses::describe(self.code)
    }

    pub fn kind(&self) -> ReplyKind {
        match self.code / 100 {
            1 => ReplyKind::Preliminary,
            2 => ReplyKind::Complete,
            3 => ReplyKind::Incomplete,
            6 => ReplyKind::Protected,
            _ => ReplyKind::Negative,
        }
    }

    /// Returns true if further replies are expected before the command has
    /// been fulfilled.
    pub fn is_preliminary(&self) -> bool {
        self.kind() == ReplyKind::Preliminary
    }

    /// Returns true if the command completed successfully.
    pub fn is_complete(&self) -> bool {
        self.kind() == ReplyKind::Complete
    }

    /// Returns true if the command needs a follow-up command.
    pub fn is_incomplete(&self) -> bool {
        self.kind() == ReplyKind::Incomplete
    }

    /// Returns true if the reply indicates a failure.
    pub fn is_negative(&self) -> bool {
        self.kind() == ReplyKind::Negative
    }

    /// Returns true if the lines are an encoded inner reply.
    ///
    /// Callers normally never see these: the channel unwraps them. One only
    /// leaks through when the server sends it with no security context set.
    pub fn is_protected(&self) -> bool {
        self.kind() == ReplyKind::Protected
    }

    /// Turns a negative reply into an error, anything else into `Ok`.
    pub fn into_result(self) -> Result<Reply, ChannelError> {
        if self.is_negative() {
            Err(ChannelError::NegativeReply(self))
        } else {
            Ok(self)
        }
    }
}

/// Renders the reply the way it appeared on the wire, without the final
/// line terminator.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let text = self.encoding.decode(line);
            if i == last {
                write!(f, "{} {}", self.code, text)?;
            } else {
                writeln!(f, "{}-{}", self.code, text)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("code", &self.code)
            .field("lines", &self.lines())
            .finish()
    }
}
