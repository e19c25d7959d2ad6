//! Scripted server end of an in-memory control connection.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use ftp_channel::utils::network::{ServerAddress, ServerKind};
use ftp_channel::{Channel, ChannelConfig};

pub struct TestServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl TestServer {
    /// Sends raw reply text; `\r\n` terminators are the caller's.
    pub async fn send(&mut self, text: &str) {
        self.send_bytes(text.as_bytes()).await;
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads the next command line written by the channel, without its
    /// terminator.
    pub async fn expect(&mut self) -> String {
        let mut line = String::new();
        let n = within(self.reader.read_line(&mut line)).await.unwrap();
        assert!(n > 0, "channel closed the connection");
        line.trim_end_matches(['\r', '\n']).to_string()
    }
}

pub fn connect() -> (Channel, TestServer) {
    connect_with(ChannelConfig::default())
}

pub fn connect_with(config: ChannelConfig) -> (Channel, TestServer) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let address = ServerAddress::new(ServerKind::Ftp, "ftp.example.org", None);
    let channel = Channel::from_stream(client, address, config);

    let (reader, writer) = tokio::io::split(server);
    let server = TestServer {
        reader: BufReader::new(reader),
        writer,
    };
    (channel, server)
}

/// Awaits `fut`, failing the test if it takes unreasonably long.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
