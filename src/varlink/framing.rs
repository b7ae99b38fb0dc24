//! NUL-delimited message framing for varlink over Unix sockets.
//!
//! Every varlink message is a single JSON object followed by one zero byte.
//! JSON text never contains a raw NUL, so the terminator alone marks message
//! boundaries on the stream.
//!
//! # Wire Format
//!
//! ```text
//! {"method":"io.podman.GetVersion"}\0
//! {"parameters":{"version":"1.9.3"}}\0
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{PodmanError, Result};

/// Maximum message size (100MB) to prevent OOM from a misbehaving daemon.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Message terminator.
const TERMINATOR: u8 = 0;

/// Read one NUL-terminated message from the stream.
///
/// # Errors
///
/// Returns an error if:
/// - The stream is closed before any byte arrives (`PodmanError::Io`)
/// - The stream is closed in the middle of a message
/// - The message exceeds `MAX_MESSAGE_SIZE`
/// - The body is not valid UTF-8
pub async fn read_message<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = (MAX_MESSAGE_SIZE + 1) as u64;

    let bytes_read = (&mut *reader).take(limit).read_until(TERMINATOR, &mut buf).await?;

    // EOF - connection closed
    if bytes_read == 0 {
        return Err(PodmanError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by daemon",
        )));
    }

    if buf.last() != Some(&TERMINATOR) {
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(PodmanError::Protocol(format!(
                "message exceeds maximum {} bytes",
                MAX_MESSAGE_SIZE
            )));
        }
        return Err(PodmanError::Protocol(format!(
            "connection closed after {} bytes of an unterminated message",
            buf.len()
        )));
    }
    buf.pop();

    String::from_utf8(buf)
        .map_err(|e| PodmanError::Protocol(format!("message is not valid UTF-8: {}", e)))
}

/// Write one NUL-terminated message to the stream and flush it.
pub async fn write_message<W>(writer: &mut W, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(body.as_bytes()).await?;
    writer.write_all(&[TERMINATOR]).await?;
    writer.flush().await?;

    Ok(())
}
