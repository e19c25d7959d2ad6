//! Reply decoding
//!
//! Turns framed reply lines into `Reply` values. Lines belonging to one
//! logical reply are accumulated until the final line (`CODE text`) arrives.
//! Protected (6xx) replies are unwrapped with the active security context and
//! decoded again as standalone replies.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::warn;

use crate::auth::SecurityContext;
use crate::error::ChannelError;
use crate::protocol::encoding::TextEncoding;
use crate::protocol::reply::Reply;

/// Stateful line accumulator for one control connection.
#[derive(Debug)]
pub struct ReplyDecoder {
    lines: Vec<Vec<u8>>,
    code: u16,
    code_prefix: [u8; 3],
    encoding: TextEncoding,
}

impl ReplyDecoder {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            lines: Vec::new(),
            code: 0,
            code_prefix: [0; 3],
            encoding,
        }
    }

    /// Returns true if a reply is partially accumulated.
    pub fn in_progress(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Decodes one line with its line terminator already stripped.
    ///
    /// Returns `Ok(None)` while the reply is incomplete. An error means the
    /// stream can no longer be trusted and the connection must be closed.
    pub fn decode_line(&mut self, line: &[u8]) -> Result<Option<Reply>, ChannelError> {
        // Some servers prefix lines with a NUL byte.
        let line = match line.first() {
            Some(0) => &line[1..],
            _ => line,
        };

        let (sep, text) = if self.lines.is_empty() {
            match self.parse_header(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        } else if line.len() >= 4
            && line[..3] == self.code_prefix
            && (line[3] == b' ' || line[3] == b'-')
        {
            (line[3], &line[4..])
        } else {
            // Folded continuation line without the code prefix.
            (b'-', line)
        };

        self.lines.push(text.to_vec());

        if sep == b' ' {
            let lines = std::mem::take(&mut self.lines);
            Reply::with_encoding(self.code, lines, self.encoding).map(Some)
        } else {
            Ok(None)
        }
    }

    fn parse_header<'a>(&mut self, line: &'a [u8]) -> Result<(u8, &'a [u8]), ChannelError> {
        if line.len() < 4 {
            return Err(ChannelError::MalformedReply(self.encoding.decode(line)));
        }
        let digits = &line[..3];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(ChannelError::MalformedReply(self.encoding.decode(line)));
        }
        let code = digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
        if !(100..700).contains(&code) {
            return Err(ChannelError::InvalidReplyCode(code));
        }
        let sep = line[3];
        if sep != b' ' && sep != b'-' {
            return Err(ChannelError::MalformedReply(self.encoding.decode(line)));
        }
        self.code = code;
        self.code_prefix.copy_from_slice(digits);
        Ok((sep, &line[4..]))
    }

    fn reset(&mut self) {
        self.lines.clear();
        self.code = 0;
    }
}

/// Unwraps a protected reply into the inner reply it carries.
///
/// Every line is base64-decoded, unprotected and fed to a fresh decoder; the
/// first reply that comes out is the real one. Nested protection is unwrapped
/// as well.
///
/// With no security context the protected reply is handed back unchanged.
/// This is a leniency towards misbehaving servers, not a security guarantee:
/// the caller receives a 6xx reply it cannot read.
pub fn unprotect_reply(
    reply: Reply,
    security: Option<&mut (dyn SecurityContext + '_)>,
    encoding: TextEncoding,
) -> Result<Reply, ChannelError> {
    let Some(security) = security else {
        warn!("Protected reply {} received with no security context", reply.code());
        return Ok(reply);
    };

    let mut decoder = ReplyDecoder::new(encoding);
    for line in reply.raw_lines() {
        let wrapped = STANDARD.decode(line.trim_ascii())?;
        let plain = security
            .unprotect(&wrapped)
            .map_err(|e| ChannelError::BadProtectedReply(e.to_string()))?;
        for inner in split_lines(&plain) {
            if let Some(inner_reply) = decoder.decode_line(inner)? {
                if inner_reply.is_protected() {
                    return unprotect_reply(inner_reply, Some(&mut *security), encoding);
                }
                return Ok(inner_reply);
            }
        }
    }

    Err(ChannelError::BadProtectedReply(format!(
        "{} reply does not contain a complete inner reply",
        reply.code()
    )))
}

/// Splits a buffer into lines, stripping `\r\n` or `\n` terminators.
pub fn split_lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.split(|b| *b == b'\n')
        .map(strip_line_ending)
        .filter(|l| !l.is_empty())
}

/// Strips a trailing `\r\n`, `\n` or `\r` from a line.
pub fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::GssSecurityContext;
    use crate::auth::security::tests::XorMechanism;

    fn decode_all(decoder: &mut ReplyDecoder, input: &[u8]) -> Vec<Reply> {
        split_lines(input)
            .filter_map(|l| decoder.decode_line(l).unwrap())
            .collect()
    }

    #[test]
    fn test_single_line_reply() {
        let mut d = ReplyDecoder::new(TextEncoding::Utf8);
        let replies = decode_all(&mut d, b"230 Login ok.\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code(), 230);
        assert_eq!(replies[0].len(), 1);
        assert!(replies[0].is_complete());
        assert_eq!(replies[0].message(), "Login ok.");
    }

    #[test]
    fn test_multi_line_reply() {
        let mut d = ReplyDecoder::new(TextEncoding::Utf8);
        assert!(d.decode_line(b"150-line1").unwrap().is_none());
        assert!(d.in_progress());
        assert!(d.decode_line(b"150-line2").unwrap().is_none());
        let r = d.decode_line(b"150 line3").unwrap().unwrap();
        assert_eq!(r.code(), 150);
        assert_eq!(r.lines(), vec!["line1", "line2", "line3"]);
        assert!(r.is_preliminary());
        assert!(!r.is_incomplete());
        assert!(!d.in_progress());
    }

    #[test]
    fn test_unprefixed_continuation() {
        let mut d = ReplyDecoder::new(TextEncoding::Utf8);
        let replies = decode_all(
            &mut d,
            b"211-Features:\r\n UTF8\r\n MLST type*;size*;\r\n211 End\r\n",
        );
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].lines(), vec!["Features:", " UTF8", " MLST type*;size*;", "End"]);
    }

    #[test]
    fn test_other_code_inside_reply_is_continuation() {
        let mut d = ReplyDecoder::new(TextEncoding::Utf8);
        assert!(d.decode_line(b"214-Help").unwrap().is_none());
        // A different code does not terminate the reply.
        assert!(d.decode_line(b"200 not the end").unwrap().is_none());
        let r = d.decode_line(b"214 end").unwrap().unwrap();
        assert_eq!(r.lines(), vec!["Help", "200 not the end", "end"]);
    }

    #[test]
    fn test_leading_nul_is_stripped() {
        let mut d = ReplyDecoder::new(TextEncoding::Utf8);
        let r = d.decode_line(b"\0220 ready").unwrap().unwrap();
        assert_eq!(r.code(), 220);
        assert_eq!(r.line(0), "ready");
    }

    #[test]
    fn test_malformed_headers_are_fatal() {
        let mut d = ReplyDecoder::new(TextEncoding::Utf8);
        assert!(matches!(d.decode_line(b"hello"), Err(ChannelError::MalformedReply(_))));
        assert!(matches!(d.decode_line(b"22"), Err(ChannelError::MalformedReply(_))));
        assert!(matches!(d.decode_line(b"220x"), Err(ChannelError::MalformedReply(_))));
        assert!(matches!(d.decode_line(b"099 low"), Err(ChannelError::InvalidReplyCode(99))));
        assert!(matches!(d.decode_line(b"700 high"), Err(ChannelError::InvalidReplyCode(700))));
        assert!(!d.in_progress());
    }

    #[test]
    fn test_protected_reply_without_context_is_returned_verbatim() {
        let outer = Reply::new(631, vec![b"AAAA".to_vec()]).unwrap();
        let r = unprotect_reply(outer.clone(), None, TextEncoding::Utf8).unwrap();
        assert_eq!(r, outer);
        assert!(r.is_protected());
    }

    fn protect_lines(ctx: &mut dyn SecurityContext, wire: &[u8]) -> Vec<u8> {
        STANDARD.encode(ctx.protect(wire).unwrap()).into_bytes()
    }

    #[test]
    fn test_protected_reply_round_trip() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let line = protect_lines(&mut ctx, b"250-first\r\n250 second\r\n");
        let outer = Reply::new(632, vec![line]).unwrap();

        let inner = unprotect_reply(outer, Some(&mut ctx), TextEncoding::Utf8).unwrap();
        assert_eq!(inner.code(), 250);
        assert_eq!(inner.lines(), vec!["first", "second"]);
    }

    #[test]
    fn test_protected_reply_spread_over_lines() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let first = protect_lines(&mut ctx, b"250-first\r\n");
        let second = protect_lines(&mut ctx, b"250 second\r\n");
        let outer = Reply::new(632, vec![first, second]).unwrap();

        let inner = unprotect_reply(outer, Some(&mut ctx), TextEncoding::Utf8).unwrap();
        assert_eq!(inner.lines(), vec!["first", "second"]);
    }

    #[test]
    fn test_nested_protected_reply() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let inner = protect_lines(&mut ctx, b"226 done\r\n");
        let mut middle = b"633 ".to_vec();
        middle.extend_from_slice(&inner);
        middle.extend_from_slice(b"\r\n");
        let outer = Reply::new(633, vec![protect_lines(&mut ctx, &middle)]).unwrap();

        let r = unprotect_reply(outer, Some(&mut ctx), TextEncoding::Utf8).unwrap();
        assert_eq!(r.code(), 226);
        assert_eq!(r.message(), "done");
    }

    #[test]
    fn test_incomplete_protected_reply_is_an_error() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let line = protect_lines(&mut ctx, b"250-never finished\r\n");
        let outer = Reply::new(632, vec![line]).unwrap();
        assert!(matches!(
            unprotect_reply(outer, Some(&mut ctx), TextEncoding::Utf8),
            Err(ChannelError::BadProtectedReply(_))
        ));
    }

    #[test]
    fn test_bad_base64_is_an_error() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let outer = Reply::new(631, vec![b"!!not base64!!".to_vec()]).unwrap();
        let err = unprotect_reply(outer, Some(&mut ctx), TextEncoding::Utf8).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_split_lines() {
        let lines: Vec<&[u8]> = split_lines(b"a\r\nb\nc").collect();
        assert_eq!(lines, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
    }
}
