//! Byte transport between the engine and one device.
//!
//! [`Transport`] is the seam the engine talks through; it knows nothing
//! about the protocol. [`TcpTransport`] is the real implementation: one
//! TCP socket whose read and write halves are always live together or
//! not at all.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::error::{PjError, Result};
use crate::wire::END;

// ── ConnectionInfo ───────────────────────────────────────────────

/// Address of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Transport ────────────────────────────────────────────────────

/// Timeout-bounded byte I/O with a single device.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open the connection. Calling this while connected is a bug.
    async fn connect(&mut self) -> Result<()>;

    /// Read exactly `n` bytes.
    async fn read(&mut self, n: usize) -> Result<Bytes>;

    /// Read up to and including the next `\n`.
    async fn read_line(&mut self) -> Result<Bytes>;

    /// Write all of `data` and flush it.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Close both directions. Idempotent.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn info(&self) -> &ConnectionInfo;
}

// ── TcpTransport ─────────────────────────────────────────────────

struct Channels {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// TCP implementation of [`Transport`].
pub struct TcpTransport {
    info: ConnectionInfo,
    timeout: Duration,
    channels: Option<Channels>,
}

impl TcpTransport {
    pub fn new(info: ConnectionInfo, timeout: Duration) -> Self {
        Self {
            info,
            timeout,
            channels: None,
        }
    }

    fn channels(&mut self) -> Result<&mut Channels> {
        self.channels
            .as_mut()
            .ok_or(PjError::ProtocolViolation("transport is not connected"))
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("info", &self.info)
            .field("timeout", &self.timeout)
            .field("connected", &self.channels.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.channels.is_some() {
            return Err(PjError::ProtocolViolation("transport already connected"));
        }

        let addr = self.info.to_string();
        let stream = match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(PjError::ConnectionRefused);
            }
            Ok(Err(e)) => return Err(PjError::Connection(e)),
            Err(_) => return Err(PjError::ConnectTimeout(self.timeout)),
        };
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        self.channels = Some(Channels {
            reader: BufReader::new(reader),
            writer,
        });
        Ok(())
    }

    async fn read(&mut self, n: usize) -> Result<Bytes> {
        let deadline = self.timeout;
        let channels = self.channels()?;
        let mut buf = vec![0u8; n];
        match timeout(deadline, channels.reader.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(Bytes::from(buf)),
            Ok(Err(e)) => Err(PjError::Connection(e)),
            Err(_) => Err(PjError::ReadTimeout(deadline)),
        }
    }

    async fn read_line(&mut self) -> Result<Bytes> {
        let deadline = self.timeout;
        let channels = self.channels()?;
        let mut buf = Vec::new();
        match timeout(deadline, channels.reader.read_until(END, &mut buf)).await {
            Ok(Ok(0)) => Err(PjError::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "device closed the connection",
            ))),
            Ok(Ok(_)) => Ok(Bytes::from(buf)),
            Ok(Err(e)) => Err(PjError::Connection(e)),
            Err(_) => Err(PjError::ReadTimeout(deadline)),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.timeout;
        let channels = self.channels()?;
        let io = async {
            channels.writer.write_all(data).await?;
            channels.writer.flush().await
        };
        match timeout(deadline, io).await {
            Ok(result) => result.map_err(PjError::Connection),
            Err(_) => Err(PjError::WriteTimeout(deadline)),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut channels) = self.channels.take() {
            let _ = channels.writer.shutdown().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.channels.is_some()
    }

    fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

// ── Tests ────────────────────────────────────────────────────────
