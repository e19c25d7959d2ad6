//! FTP reply codes
//!
//! Reply codes the channel reacts to, and human-readable descriptions for
//! every code defined by RFC 959 and RFC 2228.

pub const SERVICE_READY: u16 = 220;
pub const LOGIN_SUCCESS: u16 = 230;
pub const SECURITY_EXCHANGE_COMPLETE: u16 = 234;
pub const SECURITY_DATA_ACCEPTED: u16 = 235;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const SECURITY_MECHANISM_OK: u16 = 334;
pub const SECURITY_DATA_NEEDED: u16 = 335;

/// Return a description meaningful to a human for a reply code.
///
/// Unknown codes fall back to a description of their class.
pub fn describe(code: u16) -> &'static str {
    match code {
        110 => "Restart marker reply",
        120 => "Service ready in a few minutes",
        125 => "Data connection already open; transfer starting",
        150 => "File status okay; about to open data connection",
        200 => "Command okay",
        202 => "Command not implemented, superfluous at this site",
        211 => "System status, or system help reply",
        212 => "Directory status",
        213 => "File status",
        214 => "Help message",
        215 => "System type",
        220 => "Service ready for new user",
        221 => "Service closing control connection",
        225 => "Data connection open; no transfer in progress",
        226 => "Closing data connection",
        227 => "Entering passive mode",
        230 => "User logged in, proceed",
        232 => "User logged in, authorized by security data exchange",
        234 => "Security data exchange complete",
        235 => "Security data exchange completed successfully",
        250 => "Requested file action okay, completed",
        257 => "Pathname created",
        331 => "User name okay, need password",
        332 => "Need account for login",
        334 => "Requested security mechanism is ok",
        335 => "Security data is acceptable; more is required",
        336 => "Username okay, need password; challenge is included",
        350 => "Requested file action pending further information",
        421 => "Service not available, closing control connection",
        425 => "Can't open data connection",
        426 => "Connection closed; transfer aborted",
        431 => "Need some unavailable resource to process security",
        450 => "Requested file action not taken",
        451 => "Requested action aborted: local error in processing",
        452 => "Requested action not taken: insufficient storage space",
        500 => "Syntax error, command unrecognized",
        501 => "Syntax error in parameters or arguments",
        502 => "Command not implemented",
        503 => "Bad sequence of commands",
        504 => "Command not implemented for that parameter",
        530 => "Not logged in",
        532 => "Need account for storing files",
        533 => "Command protection level denied for policy reasons",
        534 => "Request denied for policy reasons",
        535 => "Failed security check",
        536 => "Data protection level not supported by security mechanism",
        537 => "Command protection level not supported by security mechanism",
        550 => "Requested action not taken: file unavailable",
        551 => "Requested action aborted: page type unknown",
        552 => "Requested file action aborted: exceeded storage allocation",
        553 => "Requested action not taken: file name not allowed",
        631 => "Integrity protected reply",
        632 => "Confidentiality and integrity protected reply",
        633 => "Confidentiality protected reply",
        _ => match code / 100 {
            1 => "Positive preliminary reply",
            2 => "Positive completion reply",
            3 => "Positive intermediate reply",
            4 => "Transient negative completion reply",
            5 => "Permanent negative completion reply",
            6 => "Protected reply",
            _ => "Unknown reply",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(describe(PASSWORD_REQUIRED), "User name okay, need password");
        assert_eq!(describe(530), "Not logged in");
    }

    #[test]
    fn test_unknown_codes_fall_back_to_class() {
        assert_eq!(describe(299), "Positive completion reply");
        assert_eq!(describe(599), "Permanent negative completion reply");
    }
}
