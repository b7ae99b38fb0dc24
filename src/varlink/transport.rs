//! Socket transports carrying varlink messages.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{PodmanError, Result};
use crate::varlink::framing::{read_message, write_message};
use crate::varlink::message::{Reply, Request};

/// A bidirectional channel for varlink messages.
///
/// One request is in flight at a time: `send` a request, then `receive`
/// its reply (repeatedly, while the reply `continues`).
#[async_trait]
pub trait Transport: Send {
    /// Serialize and send a request.
    async fn send(&mut self, request: &Request) -> Result<()>;

    /// Read and decode the next reply.
    async fn receive(&mut self) -> Result<Reply>;

    /// Human-readable peer address, used in logs and errors.
    fn address(&self) -> &str;
}

/// Address of a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    /// Filesystem path.
    Path(PathBuf),
    /// Linux abstract namespace name (written `@name` in varlink uris).
    Abstract(String),
}

impl SocketAddress {
    /// Parse the path part of a `unix:` uri.
    pub fn parse(path: &str) -> Self {
        match path.strip_prefix('@') {
            Some(name) => SocketAddress::Abstract(name.to_string()),
            None => SocketAddress::Path(PathBuf::from(path)),
        }
    }

    pub fn display(&self) -> String {
        match self {
            SocketAddress::Path(path) => format!("unix:{}", path.display()),
            SocketAddress::Abstract(name) => format!("unix:@{}", name),
        }
    }
}

/// Varlink transport over a Unix domain socket.
pub struct UnixTransport {
    /// Buffered reader for incoming messages.
    reader: BufReader<OwnedReadHalf>,
    /// Writer for outgoing messages.
    writer: OwnedWriteHalf,
    address: String,
}

impl UnixTransport {
    /// Connect to the socket at `address`.
    ///
    /// # Errors
    ///
    /// Returns `PodmanError::Connection` if:
    /// - The socket file does not exist
    /// - Connection is refused (service not running)
    /// - Permission denied
    pub async fn connect(address: &SocketAddress) -> Result<Self> {
        let addr = address.display();
        let stream = match address {
            SocketAddress::Path(path) => connect_path(path).await,
            SocketAddress::Abstract(name) => connect_abstract(name),
        }
        .map_err(|source| PodmanError::Connection {
            address: addr.clone(),
            source,
        })?;

        debug!(address = %addr, "Opened varlink socket");
        Ok(Self::from_stream(stream, addr))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream, address: impl Into<String>) -> Self {
        let (read_half, write_half) = stream.into_split();

        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            address: address.into(),
        }
    }
}

async fn connect_path(path: &Path) -> std::io::Result<UnixStream> {
    UnixStream::connect(path).await
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> std::io::Result<UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixStream as StdUnixStream};

    let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
    let stream = StdUnixStream::connect_addr(&addr)?;
    stream.set_nonblocking(true)?;
    UnixStream::from_std(stream)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(name: &str) -> std::io::Result<UnixStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("abstract socket @{} requires Linux", name),
    ))
}

#[async_trait]
impl Transport for UnixTransport {
    async fn send(&mut self, request: &Request) -> Result<()> {
        let body = serde_json::to_string(request)
            .map_err(|e| PodmanError::Protocol(format!("failed to serialize request: {}", e)))?;

        write_message(&mut self.writer, &body).await
    }

    async fn receive(&mut self) -> Result<Reply> {
        let body = read_message(&mut self.reader).await?;

        serde_json::from_str(&body)
            .map_err(|e| PodmanError::Protocol(format!("failed to parse reply: {}", e)))
    }

    fn address(&self) -> &str {
        &self.address
    }
}
