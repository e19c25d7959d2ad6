//! Authentication
//!
//! Password login, the AUTH/ADAT security exchange and the security
//! contexts it produces.

pub mod handshake;
pub mod password;
pub mod security;

pub use handshake::authenticate;
pub use password::{authorize, authorize_anonymous};
pub use security::{GssMechanism, GssSecurityContext, SecurityContext};
