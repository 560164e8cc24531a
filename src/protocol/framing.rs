//! Wire framing shared by the server and the client.
//!
//! Two framing styles travel over the same stream:
//!
//! ```text
//! Text line:      <utf-8 text>\r\n
//! Length prefix:  <u64, big-endian, 8 bytes><exactly that many raw bytes>
//! ```
//!
//! A connection switches from lines to raw bytes mid-stream, so every read
//! must go through one buffered reader. Bytes pulled into that buffer beyond
//! a line terminator stay there and are handed to the next binary read.

use bytes::BytesMut;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Terminator appended to every line we write.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Width of the upload length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Default upper bound for a single line, terminator included.
pub const DEFAULT_MAX_LINE: usize = 8 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FramingError {
    /// No terminator within the allowed number of bytes
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    /// Stream ended before all 8 prefix bytes arrived
    #[error("connection closed after {received} of 8 length prefix bytes")]
    ShortLengthPrefix { received: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read one line, stripping `\n` or `\r\n`.
///
/// Returns `None` when the stream is at end-of-stream before any byte. A
/// final line without a terminator is still returned. Invalid UTF-8 is
/// replaced rather than rejected.
pub async fn read_line<R>(reader: &mut R, max_len: usize) -> Result<Option<String>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::with_capacity(128);
    let n = (&mut *reader)
        .take(max_len as u64)
        .read_until(b'\n', &mut raw)
        .await?;

    if n == 0 {
        return Ok(None);
    }

    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    } else if n >= max_len {
        return Err(FramingError::LineTooLong { limit: max_len });
    }

    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Write `text` followed by `\r\n` and flush.
///
/// The peer must see the line before any raw bytes that follow it.
pub async fn write_line<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = BytesMut::with_capacity(text.len() + LINE_TERMINATOR.len());
    frame.extend_from_slice(text.as_bytes());
    frame.extend_from_slice(LINE_TERMINATOR);
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Read exactly 8 bytes as a big-endian byte count.
pub async fn read_length_prefix<R>(reader: &mut R) -> Result<u64, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let mut received = 0;

    while received < LENGTH_PREFIX_LEN {
        let n = reader.read(&mut prefix[received..]).await?;
        if n == 0 {
            return Err(FramingError::ShortLengthPrefix { received });
        }
        received += n;
    }

    Ok(u64::from_be_bytes(prefix))
}

/// Write `len` as 8 big-endian bytes and flush.
pub async fn write_length_prefix<W>(writer: &mut W, len: u64) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&len.to_be_bytes()).await?;
    writer.flush().await
}
