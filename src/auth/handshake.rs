//! AUTH/ADAT security exchange
//!
//! Negotiates a GSSAPI security context over the control channel:
//!
//! ```text
//! --> AUTH GSSAPI
//! <-- 334 ...                      server accepts the mechanism
//! --> ADAT <base64 token>
//! <-- 335 ADAT=<base64 token>      repeated until the context is complete
//! <-- 235 [ADAT=<base64 token>]
//! ```
//!
//! The context is installed on the channel only when the server completes
//! the exchange with a 2xx reply and the context reports itself established.

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};

use crate::auth::security::{GssMechanism, GssSecurityContext, SecurityContext};
use crate::bell::Bell;
use crate::client::Channel;
use crate::error::ChannelError;
use crate::protocol::{Reply, ReplyKind};
use crate::utils::sync::lock;

/// Prefix of the token carried in the first line of an ADAT reply.
const ADAT_TOKEN_PREFIX: &str = "ADAT=";

/// State shared by the handlers of one exchange.
#[derive(Clone)]
struct Exchange {
    /// Taken when the context is installed on the channel.
    context: Arc<Mutex<Option<Box<dyn SecurityContext>>>>,
    outcome: Bell<Reply>,
}

impl Exchange {
    fn on_reply(&self, channel: &Channel, reply: &Reply) -> Result<(), ChannelError> {
        match reply.kind() {
            ReplyKind::Preliminary => Ok(()),
            ReplyKind::Incomplete => self.step(channel, reply),
            ReplyKind::Complete => self.finish(channel, reply),
            ReplyKind::Negative => Err(ChannelError::Handshake(format!(
                "{} {}",
                reply.code(),
                reply.description()
            ))),
            ReplyKind::Protected => Err(ChannelError::Handshake(format!(
                "unexpected protected reply {}",
                reply.code()
            ))),
        }
    }

    /// The server wants more security data: feed its token to the context
    /// and answer with ADAT.
    fn step(&self, channel: &Channel, reply: &Reply) -> Result<(), ChannelError> {
        let token = adat_token(reply)?;
        let output = {
            let mut guard = lock(&self.context);
            let context = guard
                .as_mut()
                .ok_or_else(|| ChannelError::Handshake("exchange already finished".into()))?;
            context.handshake(&token)?
        };

        match output {
            Some(output) => {
                debug!("Sending {} byte security token", output.len());
                let encoded = STANDARD.encode(output);
                self.send(channel, "ADAT", &[encoded.as_str()]);
                Ok(())
            }
            None => Err(ChannelError::Handshake(
                "server wants more data but the context is already established".into(),
            )),
        }
    }

    /// The server accepted the exchange. Install the context if it agrees.
    fn finish(&self, channel: &Channel, reply: &Reply) -> Result<(), ChannelError> {
        let token = adat_token(reply)?;
        let mut context = lock(&self.context)
            .take()
            .ok_or_else(|| ChannelError::Handshake("exchange already finished".into()))?;

        if !token.is_empty() && !context.established() {
            // A final token needs no answer.
            context.handshake(&token)?;
        }
        if !context.established() {
            return Err(ChannelError::Handshake(format!(
                "server completed the exchange with {} before the context was established",
                reply.code()
            )));
        }

        channel.set_security(context);
        self.outcome.ring_ok(reply.clone());
        Ok(())
    }

    /// Issues one command of the exchange. Its failures, including errors
    /// returned by its handler, end the exchange.
    fn send(&self, channel: &Channel, verb: &str, args: &[&str]) {
        let exchange = self.clone();
        let command = channel.command_with(verb, args, move |channel, reply| {
            exchange.on_reply(channel, reply)
        });

        let outcome = self.outcome.clone();
        command.bell().on_ring(move |result| {
            if let Err(e) = result {
                outcome.ring_err(e.clone());
            }
        });
    }
}

/// Extracts the raw token from the first line of `reply`. A reply without
/// an `ADAT=` token carries an empty one.
fn adat_token(reply: &Reply) -> Result<Vec<u8>, ChannelError> {
    let line = reply.line(0);
    match line.trim().strip_prefix(ADAT_TOKEN_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded.trim())
            .map_err(|e| ChannelError::Handshake(format!("bad ADAT token: {}", e))),
        None => Ok(Vec::new()),
    }
}

/// Authenticates the channel with a GSSAPI `mechanism`, targeting the
/// `host` service of the server's host name.
///
/// Resolves with the reply that completed the exchange. On failure the
/// channel is left without a security context.
pub fn authenticate<M>(channel: &Channel, mechanism: M) -> Bell<Reply>
where
    M: GssMechanism + 'static,
{
    let context = GssSecurityContext::new(mechanism, &channel.address().host);
    debug!("Authenticating as {}", context.target());

    let context: Box<dyn SecurityContext> = Box::new(context);
    let exchange = Exchange {
        context: Arc::new(Mutex::new(Some(context))),
        outcome: Bell::new(),
    };

    let mechanism_name = channel.config().auth_mechanism.clone();
    exchange.send(channel, "AUTH", &[mechanism_name.as_str()]);

    let outcome = exchange.outcome.clone();
    let host = channel.address().host.clone();
    outcome.on_ring(move |result| {
        if let Err(e) = result {
            warn!("Authentication with {} failed: {}", host, e);
        }
    });
    outcome
}
