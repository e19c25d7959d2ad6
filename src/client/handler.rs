//! Connection tasks
//!
//! The reader task splits the inbound byte stream into lines, feeds them to
//! the reply decoder and dispatches complete replies. The writer task drains
//! encoded commands in the order they were issued. Both hold only a weak
//! handle on the channel.

use log::{debug, info};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::channel::WeakChannel;
use crate::error::ChannelError;
use crate::error::handlers::handle_fatal;
use crate::protocol::decoder::strip_line_ending;
use crate::protocol::{ReplyDecoder, TextEncoding};

/// Reads replies until the connection ends or a fatal error occurs, then
/// closes the channel with that error.
pub(crate) async fn read_replies<R>(
    mut reader: R,
    channel: WeakChannel,
    encoding: TextEncoding,
    max_line_length: usize,
) where
    R: AsyncBufRead + Unpin,
{
    let mut decoder = ReplyDecoder::new(encoding);
    let mut line = Vec::new();

    loop {
        line.clear();
        let result = read_line(&mut reader, &mut line, max_line_length).await;

        let Some(channel) = channel.upgrade() else {
            debug!("Channel dropped; reader exiting");
            return;
        };
        let peer = channel.address().socket_addr();

        let outcome = match result {
            Ok(0) => {
                info!("Connection closed by server {}", peer);
                Err(ChannelError::Closed)
            }
            Ok(_) => channel.receive_line(&mut decoder, strip_line_ending(&line)),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            if !matches!(e, ChannelError::Closed) {
                handle_fatal(&peer, &e);
            }
            channel.close_with(e);
            return;
        }
    }
}

/// Reads one line, terminator included, into `buf`. Returns 0 at end of
/// stream.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> Result<usize, ChannelError>
where
    R: AsyncBufRead + Unpin,
{
    // Room for the CRLF on top of the payload.
    let limit = max as u64 + 2;
    let n = AsyncReadExt::take(&mut *reader, limit)
        .read_until(b'\n', buf)
        .await?;
    if n as u64 == limit && !buf.ends_with(b"\n") {
        return Err(ChannelError::LineTooLong(max));
    }
    Ok(n)
}

/// Writes encoded commands until the pipeline drops its sender or a write
/// fails; a failed write closes the channel.
pub(crate) async fn write_commands<W>(
    mut writer: W,
    mut commands: UnboundedReceiver<Vec<u8>>,
    channel: WeakChannel,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = commands.recv().await {
        let result = async {
            writer.write_all(&line).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            let err = ChannelError::from(e);
            if let Some(channel) = channel.upgrade() {
                handle_fatal(&channel.address().socket_addr(), &err);
                channel.close_with(err);
            }
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Control connection shutdown failed: {}", e);
    }
}
