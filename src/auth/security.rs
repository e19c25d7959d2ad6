//! Security contexts
//!
//! A security context holds the state of the channel with respect to
//! security and protects or unprotects command and reply payloads once an
//! AUTH/ADAT exchange has established it.

use crate::error::ChannelError;

/// Pluggable security capability for the control channel.
pub trait SecurityContext: Send {
    /// Returns true once the security exchange has completed.
    fn established(&self) -> bool;

    /// Feeds a raw (not base64) input token from the server and returns the
    /// token to send back with ADAT, or `None` if the context is established.
    fn handshake(&mut self, token: &[u8]) -> Result<Option<Vec<u8>>, ChannelError>;

    /// Recovers the plaintext from protected bytes (not a base64 encoding
    /// thereof).
    fn unprotect(&mut self, bytes: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Protects a plaintext payload.
    fn protect(&mut self, bytes: &[u8]) -> Result<Vec<u8>, ChannelError>;
}

/// The subset of the GSS-API a control channel needs from a mechanism.
///
/// Implementations wrap a concrete mechanism such as Kerberos or GSI.
pub trait GssMechanism: Send {
    /// One step of `gss_init_sec_context` towards `target`.
    fn init_sec_context(&mut self, target: &str, input: &[u8]) -> Result<Vec<u8>, ChannelError>;

    fn is_established(&self) -> bool;

    /// `gss_wrap` with confidentiality requested.
    fn wrap(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// `gss_unwrap`.
    fn unwrap(&mut self, wrapped: &[u8]) -> Result<Vec<u8>, ChannelError>;
}

/// A security context based on GSSAPI.
pub struct GssSecurityContext<M: GssMechanism> {
    mechanism: M,
    target: String,
}

impl<M: GssMechanism> GssSecurityContext<M> {
    /// Creates a context that authenticates against the `host` service on
    /// `hostname`.
    pub fn new(mechanism: M, hostname: &str) -> Self {
        Self {
            mechanism,
            target: format!("host@{}", hostname),
        }
    }

    /// The service name the context is negotiated with.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl<M: GssMechanism> SecurityContext for GssSecurityContext<M> {
    fn established(&self) -> bool {
        self.mechanism.is_established()
    }

    fn handshake(&mut self, token: &[u8]) -> Result<Option<Vec<u8>>, ChannelError> {
        if self.established() {
            return Ok(None);
        }
        let out = self.mechanism.init_sec_context(&self.target, token)?;
        Ok(Some(out))
    }

    fn unprotect(&mut self, bytes: &[u8]) -> Result<Vec<u8>, ChannelError> {
        self.mechanism.unwrap(bytes)
    }

    fn protect(&mut self, bytes: &[u8]) -> Result<Vec<u8>, ChannelError> {
        self.mechanism.wrap(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Test mechanism: established after `rounds` init calls, wraps by XOR.
    pub(crate) struct XorMechanism {
        pub(crate) rounds: usize,
        pub(crate) calls: usize,
        pub(crate) key: u8,
    }

    impl XorMechanism {
        pub(crate) fn new(rounds: usize) -> Self {
            Self {
                rounds,
                calls: 0,
                key: 0x5a,
            }
        }
    }

    impl GssMechanism for XorMechanism {
        fn init_sec_context(&mut self, _target: &str, _input: &[u8]) -> Result<Vec<u8>, ChannelError> {
            self.calls += 1;
            Ok(format!("token-{}", self.calls).into_bytes())
        }

        fn is_established(&self) -> bool {
            self.calls >= self.rounds
        }

        fn wrap(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
            Ok(plaintext.iter().map(|b| b ^ self.key).collect())
        }

        fn unwrap(&mut self, wrapped: &[u8]) -> Result<Vec<u8>, ChannelError> {
            Ok(wrapped.iter().map(|b| b ^ self.key).collect())
        }
    }

    #[test]
    fn test_handshake_stops_once_established() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(2), "ftp.example.org");
        assert_eq!(ctx.target(), "host@ftp.example.org");
        assert_eq!(ctx.handshake(b"").unwrap(), Some(b"token-1".to_vec()));
        assert!(!ctx.established());
        assert_eq!(ctx.handshake(b"abc").unwrap(), Some(b"token-2".to_vec()));
        assert!(ctx.established());
        assert_eq!(ctx.handshake(b"abc").unwrap(), None);
    }

    #[test]
    fn test_protect_unprotect_are_inverses() {
        let mut ctx = GssSecurityContext::new(XorMechanism::new(1), "h");
        let wrapped = ctx.protect(b"PWD").unwrap();
        assert_ne!(wrapped, b"PWD".to_vec());
        assert_eq!(ctx.unprotect(&wrapped).unwrap(), b"PWD".to_vec());
    }
}
