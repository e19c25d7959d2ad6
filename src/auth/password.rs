//! Password login
//!
//! Implements the USER/PASS exchange. PASS is only sent when the server asks
//! for it with 331; any other terminal reply to USER ends the login.

use log::{debug, info};

use crate::bell::Bell;
use crate::client::Channel;
use crate::protocol::Reply;
use crate::protocol::responses::PASSWORD_REQUIRED;

/// Logs in as `user` with `password`.
///
/// Resolves with the reply that ended the exchange: the reply to PASS if one
/// was sent, otherwise the reply to USER. A negative reply resolves as
/// `ChannelError::NegativeReply`.
pub fn authorize(channel: &Channel, user: &str, password: &str) -> Bell<Reply> {
    let outcome = Bell::new();
    let done = outcome.clone();
    let password = password.to_string();
    let who = user.to_string();

    let login = channel.command_with("USER", &[user], move |channel, reply| {
        if reply.is_preliminary() {
            return Ok(());
        }
        if reply.code() == PASSWORD_REQUIRED {
            debug!("Password required for {}", who);
            channel.command("PASS", &[password.as_str()]).reply().promise(&done);
        } else {
            done.ring(reply.clone().into_result());
        }
        Ok(())
    });

    // Covers a USER command that never reached its handler.
    let failed = outcome.clone();
    login.bell().on_ring(move |result| {
        if let Err(e) = result {
            failed.ring_err(e.clone());
        }
    });

    let user = user.to_string();
    outcome.on_ring(move |result| match result {
        Ok(reply) => info!("Logged in as {}: {}", user, reply),
        Err(e) => info!("Login as {} failed: {}", user, e),
    });
    outcome
}

/// Logs in with the configured default credentials, `anonymous` with an
/// empty password unless configured otherwise.
pub fn authorize_anonymous(channel: &Channel) -> Bell<Reply> {
    let config = channel.config();
    authorize(channel, &config.default_user, &config.default_password)
}
