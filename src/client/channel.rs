//! Module `channel`
//!
//! `Channel` is the composition root of the control connection. It owns the
//! command pipeline, the active security context and the feature set, and
//! exposes the command-issuing API.
//!
//! Commands may be issued from any thread. Replies are decoded and dispatched
//! on the connection's reader task, one at a time.

use std::sync::{Arc, Mutex, Weak};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::{GssMechanism, SecurityContext, handshake, password};
use crate::bell::Bell;
use crate::client::command::{Command, Handler, Pending};
use crate::client::features::FeatureSet;
use crate::client::handler::{read_replies, write_commands};
use crate::client::pipeline::{Issued, Pipeline};
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::protocol::responses::SERVICE_READY;
use crate::protocol::{Reply, ReplyDecoder, encode_command, join_command, unprotect_reply};
use crate::utils::network::{ServerAddress, ServerKind, parse_uri};
use crate::utils::sync::lock;

struct Shared {
    address: ServerAddress,
    config: ChannelConfig,
    pipeline: Pipeline,
    security: Mutex<Option<Box<dyn SecurityContext>>>,
    features: FeatureSet,
    welcome: Bell<Reply>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        // Outstanding bells may still be held by callers.
        let pending = self.pipeline.close(ChannelError::Closed);
        if !pending.is_empty() {
            debug!("Channel dropped with {} pending command(s)", pending.len());
        }
        for p in pending {
            p.fail(ChannelError::Closed);
        }
        self.welcome.ring_err(ChannelError::Closed);
    }
}

/// An FTP control channel. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

/// Non-owning handle held by the connection tasks, so that dropping every
/// `Channel` shuts the connection down.
#[derive(Clone)]
pub(crate) struct WeakChannel(Weak<Shared>);

impl WeakChannel {
    pub(crate) fn upgrade(&self) -> Option<Channel> {
        self.0.upgrade().map(|shared| Channel { shared })
    }

    /// A handle whose channel is already gone.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        WeakChannel(Weak::new())
    }
}

impl Channel {
    /// Connects to the server named by `uri` with the default configuration.
    pub async fn connect(uri: &str) -> Result<Channel, ChannelError> {
        Self::connect_with(uri, ChannelConfig::default()).await
    }

    /// Connects to the server named by `uri`.
    pub async fn connect_with(uri: &str, config: ChannelConfig) -> Result<Channel, ChannelError> {
        Self::connect_to(parse_uri(uri)?, config).await
    }

    /// Connects to an explicit host and port. A port of 0 selects the
    /// default port for `kind`.
    pub async fn connect_host(
        kind: ServerKind,
        host: &str,
        port: u16,
        config: ChannelConfig,
    ) -> Result<Channel, ChannelError> {
        Self::connect_to(ServerAddress::new(kind, host, Some(port)), config).await
    }

    pub async fn connect_to(
        address: ServerAddress,
        config: ChannelConfig,
    ) -> Result<Channel, ChannelError> {
        let target = address.socket_addr();
        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&target))
            .await
            .map_err(|_| {
                ChannelError::from(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", target),
                ))
            })??;
        info!("Connected to {} server at {}", address.kind, target);
        Ok(Self::from_stream(stream, address, config))
    }

    /// Runs a channel over an already-connected stream. Must be called from
    /// within a Tokio runtime.
    pub fn from_stream<S>(stream: S, address: ServerAddress, config: ChannelConfig) -> Channel
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();

        let channel = Channel {
            shared: Arc::new(Shared {
                address,
                config,
                pipeline: Pipeline::new(tx),
                security: Mutex::new(None),
                features: FeatureSet::new(),
                welcome: Bell::new(),
                reader: Mutex::new(None),
            }),
        };

        let weak = channel.downgrade();
        tokio::spawn(write_commands(write_half, rx, weak.clone()));
        let reader = tokio::spawn(read_replies(
            BufReader::new(read_half),
            weak,
            channel.shared.config.encoding,
            channel.shared.config.max_line_length,
        ));
        *lock(&channel.shared.reader) = Some(reader);

        channel
    }

    pub(crate) fn downgrade(&self) -> WeakChannel {
        WeakChannel(Arc::downgrade(&self.shared))
    }

    pub fn address(&self) -> &ServerAddress {
        &self.shared.address
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// The server greeting. Resolves with the first 220 reply received.
    pub fn welcome(&self) -> Bell<Reply> {
        self.shared.welcome.clone()
    }

    /// Issues `verb` with `args` joined by spaces.
    pub fn command(&self, verb: &str, args: &[&str]) -> Command {
        self.issue(Some(join_command(verb, args)), None)
    }

    /// Issues a command whose replies are also passed to `handler`.
    ///
    /// The handler runs on the channel's reader task once per reply, in
    /// reply order. It may issue further commands but must not block on
    /// them. An error it returns becomes the command's result.
    pub fn command_with<F>(&self, verb: &str, args: &[&str], handler: F) -> Command
    where
        F: FnMut(&Channel, &Reply) -> Result<(), ChannelError> + Send + 'static,
    {
        self.issue(
            Some(join_command(verb, args)),
            Some(Handler::Reply(Box::new(handler))),
        )
    }

    /// Issues a sync marker: resolves once every command issued before it
    /// has received its terminal reply.
    pub fn sync(&self) -> Command {
        self.issue(None, None)
    }

    /// Issues a sync marker that runs `handler` when reached.
    pub fn sync_with<F>(&self, handler: F) -> Command
    where
        F: FnOnce(&Channel) -> Result<(), ChannelError> + Send + 'static,
    {
        self.issue(None, Some(Handler::Sync(Box::new(handler))))
    }

    fn issue(&self, text: Option<String>, handler: Option<Handler>) -> Command {
        let pending = Arc::new(Pending::new(text, handler));
        let command = Command::new(Arc::clone(&pending));
        let encoding = self.shared.config.encoding;

        let issued = self.shared.pipeline.issue(Arc::clone(&pending), |text| {
            let mut guard = lock(&self.shared.security);
            match guard.as_mut() {
                Some(security) => encode_command(text, Some(&mut **security), encoding),
                None => encode_command(text, None, encoding),
            }
        });

        match issued {
            Ok(Issued::Queued) => {
                if !pending.is_sync() {
                    debug!("--> {}", pending.label());
                }
            }
            Ok(Issued::Immediate) => pending.deliver(self, None),
            Err(e) => {
                warn!("Could not issue '{}': {}", pending.label(), e);
                pending.fail(e);
            }
        }
        command
    }

    /// Decodes one line read from the connection and dispatches the reply
    /// it completes, if any. An error is fatal for the channel.
    pub(crate) fn receive_line(
        &self,
        decoder: &mut ReplyDecoder,
        line: &[u8],
    ) -> Result<(), ChannelError> {
        let Some(reply) = decoder.decode_line(line)? else {
            return Ok(());
        };

        let reply = if reply.is_protected() {
            let encoding = self.shared.config.encoding;
            let mut guard = lock(&self.shared.security);
            match guard.as_mut() {
                Some(security) => unprotect_reply(reply, Some(&mut **security), encoding)?,
                None => unprotect_reply(reply, None, encoding)?,
            }
        } else {
            reply
        };

        debug!("<-- {}", reply);
        self.dispatch(reply);
        Ok(())
    }

    /// Hands a decoded reply to the command(s) it resolves.
    fn dispatch(&self, reply: Reply) {
        let welcome = &self.shared.welcome;
        if !welcome.is_done() && reply.code() == SERVICE_READY {
            info!("{} greeted: {}", self.shared.address.host, reply.message());
            welcome.ring_ok(reply);
            return;
        }

        let Some(dispatch) = self.shared.pipeline.take(reply.is_preliminary()) else {
            if !welcome.is_done() && reply.is_negative() {
                warn!("Server refused the connection: {}", reply);
                welcome.ring_err(ChannelError::NegativeReply(reply));
            } else {
                warn!("Dropping unsolicited reply: {}", reply);
            }
            return;
        };

        dispatch.head.deliver(self, Some(&reply));
        for sync in dispatch.syncs {
            sync.deliver(self, None);
        }
    }

    /// Fails every pending command with `err` and refuses new ones.
    pub(crate) fn close_with(&self, err: ChannelError) {
        let pending = self.shared.pipeline.close(err.clone());
        if !pending.is_empty() {
            info!("Failing {} pending command(s): {}", pending.len(), err);
        }
        for p in pending {
            p.fail(err.clone());
        }
        self.shared.welcome.ring_err(err);
    }

    /// Closes the channel. Pending commands fail with `ChannelError::Closed`.
    pub fn close(&self) {
        self.close_with(ChannelError::Closed);
        if let Some(reader) = lock(&self.shared.reader).take() {
            reader.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.pipeline.is_closed()
    }

    /// Makes `security` the active security context. Commands issued from
    /// now on are protected and protected replies are unwrapped with it.
    pub(crate) fn set_security(&self, security: Box<dyn SecurityContext>) {
        *lock(&self.shared.security) = Some(security);
        info!("Security context established with {}", self.shared.address.host);
    }

    /// Returns true if a security context is active.
    pub fn is_protected(&self) -> bool {
        lock(&self.shared.security).is_some()
    }

    /// The server's feature set. Detection starts on the first query.
    pub fn features(&self) -> &FeatureSet {
        &self.shared.features
    }

    /// Checks whether the server supports `cmd`, e.g. `"MLST"` or
    /// `"SITE CHMOD"`.
    pub fn supports(&self, cmd: &str) -> Bell<bool> {
        self.shared.features.supports(self, cmd)
    }

    /// True if the server supports at least one of `cmds`.
    pub fn supports_any(&self, cmds: &[&str]) -> Bell<bool> {
        Bell::any(cmds.iter().map(|cmd| self.supports(cmd)).collect())
    }

    /// True if the server supports every one of `cmds`.
    pub fn supports_all(&self, cmds: &[&str]) -> Bell<bool> {
        Bell::all(cmds.iter().map(|cmd| self.supports(cmd)).collect())
    }

    /// Logs in with USER/PASS. See [`password::authorize`].
    pub fn authorize(&self, user: &str, pass: &str) -> Bell<Reply> {
        password::authorize(self, user, pass)
    }

    /// Logs in with the configured default credentials.
    pub fn authorize_anonymous(&self) -> Bell<Reply> {
        password::authorize_anonymous(self)
    }

    /// Establishes a security context with AUTH/ADAT. See
    /// [`handshake::authenticate`].
    pub fn authenticate<M>(&self, mechanism: M) -> Bell<Reply>
    where
        M: GssMechanism + 'static,
    {
        handshake::authenticate(self, mechanism)
    }

    /// Number of commands waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pipeline.len()
    }

    /// Renders the pending-command queue for operational inspection and
    /// logs it at debug level.
    pub fn dump_queue(&self) -> String {
        let mut dump = String::from("<COMMAND STACK DUMP>\n");
        for (i, label) in self.shared.pipeline.labels().iter().enumerate() {
            dump.push_str(&format!("    {}: {}\n", i + 1, label));
        }
        dump.push_str("</COMMAND STACK DUMP>");
        debug!("{}", dump);
        dump
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.shared.address)
            .field("pending", &self.pending_count())
            .field("protected", &self.is_protected())
            .field("closed", &self.is_closed())
            .finish()
    }
}
