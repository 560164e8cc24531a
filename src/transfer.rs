//! Chunked byte transfer between connections and files.
//!
//! Both directions run the same loop: read at most one chunk, never more
//! than what is still owed, write it out, flush, repeat. A transfer ends when
//! the declared byte count is reached or the source runs dry; running dry
//! first is reported as [`TransferError::Truncated`].

use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Default chunk size for both directions
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    /// Source reached end-of-stream before the declared length
    #[error("transfer truncated after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Progress of one transfer.
///
/// `bytes_moved` never exceeds `total_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDescriptor {
    total_bytes: u64,
    bytes_moved: u64,
    chunk_size: usize,
}

impl TransferDescriptor {
    /// A chunk size of zero is raised to one.
    pub fn new(total_bytes: u64, chunk_size: usize) -> Self {
        Self {
            total_bytes,
            bytes_moved: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_moved(&self) -> u64 {
        self.bytes_moved
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn remaining(&self) -> u64 {
        self.total_bytes - self.bytes_moved
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_moved == self.total_bytes
    }

    /// Largest read allowed next: one chunk, capped by what is still owed.
    pub fn next_chunk_len(&self) -> usize {
        self.remaining().min(self.chunk_size as u64) as usize
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(n as u64 <= self.remaining());
        self.bytes_moved += n as u64;
    }

    fn into_result(self) -> Result<Self, TransferError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(TransferError::Truncated {
                expected: self.total_bytes,
                received: self.bytes_moved,
            })
        }
    }
}

/// Copy from `source` to `sink` until the descriptor is complete or the
/// source reaches end-of-stream.
async fn pump<R, W>(
    source: &mut R,
    sink: &mut W,
    descriptor: &mut TransferDescriptor,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; descriptor.next_chunk_len()];

    while !descriptor.is_complete() {
        let want = descriptor.next_chunk_len();
        let n = source.read(&mut buffer[..want]).await?;
        if n == 0 {
            trace!(
                moved = descriptor.bytes_moved(),
                total = descriptor.total_bytes(),
                "Source exhausted"
            );
            break;
        }

        sink.write_all(&buffer[..n]).await?;
        sink.flush().await?;
        descriptor.advance(n);
    }

    Ok(())
}

/// Stream exactly `total_bytes` from `source` (usually a file) to `sink`.
///
/// `total_bytes` is the length already announced to the peer, through a
/// `Content-Length` header or a length prefix. Bytes the source holds beyond
/// it are not read.
pub async fn send_file<R, W>(
    source: &mut R,
    sink: &mut W,
    total_bytes: u64,
    chunk_size: usize,
) -> Result<TransferDescriptor, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut descriptor = TransferDescriptor::new(total_bytes, chunk_size);
    pump(source, sink, &mut descriptor).await?;
    descriptor.into_result()
}

/// Receive exactly `total_bytes` from `source` into `destination`.
///
/// The destination is created or truncated first. Bytes on the wire beyond
/// `total_bytes` are left unread. On any failure the partial file is
/// removed.
pub async fn receive_file<R>(
    source: &mut R,
    destination: &Path,
    total_bytes: u64,
    chunk_size: usize,
) -> Result<TransferDescriptor, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(destination).await?;
    let mut descriptor = TransferDescriptor::new(total_bytes, chunk_size);

    let outcome = match pump(source, &mut file, &mut descriptor).await {
        Ok(()) => descriptor.into_result(),
        Err(e) => Err(TransferError::Io(e)),
    };
    drop(file);

    if outcome.is_err() {
        if let Err(e) = tokio::fs::remove_file(destination).await {
            debug!(path = %destination.display(), error = %e, "Failed to remove partial file");
        }
    }

    outcome
}
