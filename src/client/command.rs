//! Module `command`
//!
//! A `Command` is the future for the server's reply to one command written
//! to the channel. Commands without text are sync markers: nothing goes on
//! the wire and they resolve, with no reply, when the pipeline reaches them.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::bell::Bell;
use crate::client::Channel;
use crate::error::ChannelError;
use crate::error::handlers::handle_handler_error;
use crate::protocol::Reply;
use crate::protocol::encoder::redact;
use crate::utils::sync::lock;

/// Per-reply handler of a command. Called once per preliminary reply and
/// once more for the terminal reply.
pub type ReplyHandler = Box<dyn FnMut(&Channel, &Reply) -> Result<(), ChannelError> + Send>;

/// Handler of a sync marker, called once when the pipeline reaches it.
pub type SyncHandler = Box<dyn FnOnce(&Channel) -> Result<(), ChannelError> + Send>;

pub(crate) enum Handler {
    Reply(ReplyHandler),
    Sync(SyncHandler),
}

/// The queued half of a command, owned by the pipeline until resolved.
pub(crate) struct Pending {
    text: Option<String>,
    bell: Bell<Option<Reply>>,
    handler: Mutex<Option<Handler>>,
}

impl Pending {
    pub(crate) fn new(text: Option<String>, handler: Option<Handler>) -> Self {
        Self {
            text,
            bell: Bell::new(),
            handler: Mutex::new(handler),
        }
    }

    pub(crate) fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub(crate) fn is_sync(&self) -> bool {
        self.text.is_none()
    }

    /// Text safe for logs and queue dumps.
    pub(crate) fn label(&self) -> String {
        match &self.text {
            Some(text) => redact(text),
            None => "<sync>".to_string(),
        }
    }

    /// Runs the handler for `reply` (`None` for a sync marker) and resolves
    /// the future if the command is finished.
    ///
    /// Handler errors and panics become the command's error; they never
    /// propagate to the caller, which is the dispatch loop.
    pub(crate) fn deliver(&self, channel: &Channel, reply: Option<&Reply>) {
        let terminal = match reply {
            Some(reply) => !reply.is_preliminary(),
            None => true,
        };

        let result = {
            let mut slot = lock(&self.handler);
            match (slot.take(), reply) {
                (Some(Handler::Reply(mut handler)), Some(reply)) => {
                    let outcome = catch_handler(|| handler(channel, reply));
                    if !terminal {
                        *slot = Some(Handler::Reply(handler));
                    }
                    outcome
                }
                (Some(Handler::Sync(handler)), None) => catch_handler(|| handler(channel)),
                (handler, _) => {
                    if !terminal {
                        *slot = handler;
                    }
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            handle_handler_error(&self.label(), &e);
            self.bell.ring_err(e);
        }

        match reply {
            _ if self.is_sync() => {
                self.bell.ring_ok(None);
            }
            Some(reply) if terminal => {
                self.bell.ring(reply.clone().into_result().map(Some));
            }
            _ => {}
        }
    }

    /// Resolves the command with `err` without running its handler.
    pub(crate) fn fail(&self, err: ChannelError) {
        lock(&self.handler).take();
        self.bell.ring_err(err);
    }
}

fn catch_handler<F>(f: F) -> Result<(), ChannelError>
where
    F: FnOnce() -> Result<(), ChannelError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Err(ChannelError::Handler(message))
    })
}

/// Handle to an issued command.
///
/// Resolves with the terminal reply, with `None` for a sync marker, or with
/// an error: `ChannelError::NegativeReply` for a 4xx/5xx reply, the handler's
/// error, or the error that closed the channel.
#[derive(Clone)]
pub struct Command {
    pending: Arc<Pending>,
    bell: Bell<Option<Reply>>,
}

impl Command {
    pub(crate) fn new(pending: Arc<Pending>) -> Self {
        let bell = pending.bell.clone();
        Self { pending, bell }
    }

    /// The command text, or `None` for a sync marker.
    pub fn text(&self) -> Option<&str> {
        self.pending.text()
    }

    pub fn is_sync(&self) -> bool {
        self.pending.is_sync()
    }

    pub fn is_done(&self) -> bool {
        self.bell.is_done()
    }

    /// The future backing this command.
    pub fn bell(&self) -> Bell<Option<Reply>> {
        self.bell.clone()
    }

    /// Blocks until the command resolves. Not for use inside handlers or on
    /// an async runtime worker.
    pub fn wait(&self) -> Result<Option<Reply>, ChannelError> {
        self.bell.wait()
    }

    /// Rings `bell` with this command's result once it is known.
    pub fn promise(&self, bell: &Bell<Option<Reply>>) -> Bell<Option<Reply>> {
        self.bell.promise(bell);
        bell.clone()
    }

    /// The terminal reply as a `Bell<Reply>`. A sync marker has no reply and
    /// resolves with an error.
    pub fn reply(&self) -> Bell<Reply> {
        self.bell.map(|reply| {
            reply.ok_or_else(|| ChannelError::Handler("sync marker has no reply".to_string()))
        })
    }
}

impl Future for Command {
    type Output = Result<Option<Reply>, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.bell).poll(cx)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.pending.label())
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_flag() {
        assert!(Pending::new(None, None).is_sync());
        assert!(!Pending::new(Some("NOOP".into()), None).is_sync());
    }

    #[test]
    fn test_label_redacts_password() {
        let pending = Pending::new(Some("PASS secret".into()), None);
        assert_eq!(pending.label(), "PASS ****");
        assert_eq!(Pending::new(None, None).label(), "<sync>");
    }

    #[test]
    fn test_fail_resolves_without_handler() {
        let pending = Arc::new(Pending::new(Some("NOOP".into()), None));
        let command = Command::new(Arc::clone(&pending));
        pending.fail(ChannelError::Closed);
        assert!(matches!(command.wait(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_catch_handler_turns_panics_into_errors() {
        let result = catch_handler(|| panic!("bad handler"));
        assert!(matches!(result, Err(ChannelError::Handler(m)) if m == "bad handler"));
    }
}
