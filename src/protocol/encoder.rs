//! Command encoding
//!
//! Serializes one command into one line on the wire. With an active security
//! context the command body is protected, base64-encoded and sent as
//! `ENC <payload>`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::auth::SecurityContext;
use crate::error::ChannelError;
use crate::protocol::encoding::TextEncoding;

/// Marker token that prefixes protected command bodies.
pub const PROTECTED_PREFIX: &str = "ENC";

pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Joins a verb and its arguments with single spaces.
pub fn join_command(verb: &str, args: &[&str]) -> String {
    let mut text = String::from(verb);
    for arg in args {
        text.push(' ');
        text.push_str(arg);
    }
    text
}

/// Encodes `text` as a CRLF-terminated command line.
///
/// `text` must not contain line terminators itself.
pub fn encode_command(
    text: &str,
    security: Option<&mut (dyn SecurityContext + '_)>,
    encoding: TextEncoding,
) -> Result<Vec<u8>, ChannelError> {
    let body = encoding.encode(text);

    let mut line = match security {
        Some(security) => {
            let protected = security.protect(&body)?;
            let mut line = Vec::with_capacity(protected.len() * 4 / 3 + 8);
            line.extend_from_slice(PROTECTED_PREFIX.as_bytes());
            line.push(b' ');
            line.extend_from_slice(STANDARD.encode(protected).as_bytes());
            line
        }
        None => body,
    };
    line.extend_from_slice(LINE_TERMINATOR);
    Ok(line)
}

/// Returns the command text safe to log, with PASS arguments hidden.
pub fn redact(text: &str) -> String {
    match text.split_once(' ') {
        Some((verb, _)) if verb.eq_ignore_ascii_case("PASS") => format!("{} ****", verb),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::GssSecurityContext;
    use crate::auth::security::tests::XorMechanism;

    #[test]
    fn test_join_command() {
        assert_eq!(join_command("USER", &["bob"]), "USER bob");
        assert_eq!(join_command("HELP", &["SITE"]), "HELP SITE");
        assert_eq!(join_command("FEAT", &[]), "FEAT");
    }

    #[test]
    fn test_plain_command() {
        let line = encode_command("USER bob", None, TextEncoding::Utf8).unwrap();
        assert_eq!(line, b"USER bob\r\n".to_vec());
    }

    #[test]
    fn test_protected_command() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let line = encode_command("PWD", Some(&mut ctx), TextEncoding::Utf8).unwrap();
        let line = String::from_utf8(line).unwrap();
        assert!(line.starts_with("ENC "));
        assert!(line.ends_with("\r\n"));

        let payload = STANDARD.decode(line[4..line.len() - 2].as_bytes()).unwrap();
        assert_eq!(ctx.unprotect(&payload).unwrap(), b"PWD".to_vec());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("PASS hunter2"), "PASS ****");
        assert_eq!(redact("pass hunter2"), "pass ****");
        assert_eq!(redact("USER bob"), "USER bob");
        assert_eq!(redact("PASV"), "PASV");
    }
}
