use std::net::SocketAddr;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

use super::wire::Envelope;

/// Client side of the notification channel.
pub struct Subscription {
    lines: Lines<BufReader<OwnedReadHalf>>,
    // Held so the connection stays open in both directions.
    _write: tokio::net::tcp::OwnedWriteHalf,
}

impl Subscription {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("cannot connect to notification channel at {addr}"))?;
        let (read, write) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read).lines(),
            _write: write,
        })
    }

    /// Next raw line, or `None` once the server closes the connection.
    pub async fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                other => return Ok(other),
            }
        }
    }

    /// Next decoded envelope. Lines that do not decode are an error.
    pub async fn next_envelope(&mut self) -> anyhow::Result<Option<(String, Envelope)>> {
        let Some(line) = self.next_line().await? else {
            return Ok(None);
        };
        let envelope = Envelope::decode(&line)
            .with_context(|| format!("malformed notification: {line}"))?;
        Ok(Some((line, envelope)))
    }
}
