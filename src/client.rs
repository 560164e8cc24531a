//! Client side of the protocol.
//!
//! One [`Client::execute`] call is one connection:
//!
//! - `UPLOAD <name>`: check the local file, connect, send the line, wait
//!   for `OK`, send the 8-byte length and the file, read the status line.
//! - anything else: connect, send the line, read one line back.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::protocol::framing::{self, FramingError, DEFAULT_MAX_LINE};
use crate::protocol::{Command, Request};
use crate::transfer::{self, TransferError, DEFAULT_CHUNK_SIZE};

/// What came back from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutcome {
    /// First line of the server's reply
    Response(String),
    /// File sent in full
    Uploaded {
        file_name: String,
        bytes: u64,
        /// Status line sent after the transfer, if any
        status: Option<String>,
    },
    /// The server answered UPLOAD with something other than `OK`
    Rejected(String),
    /// The server closed without a reply
    NoResponse,
}

impl fmt::Display for ClientOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientOutcome::Response(line) => write!(f, "{}", line),
            ClientOutcome::Uploaded {
                file_name,
                bytes,
                status,
            } => {
                write!(f, "Uploaded {} ({} bytes)", file_name, bytes)?;
                if let Some(status) = status {
                    write!(f, ": {}", status)?;
                }
                Ok(())
            }
            ClientOutcome::Rejected(line) => {
                write!(f, "Server did not acknowledge the upload request: {}", line)
            }
            ClientOutcome::NoResponse => write!(f, "Server closed the connection without a reply"),
        }
    }
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("directory cannot be uploaded: {}", .0.display())]
    IsDirectory(PathBuf),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Issues requests against one server address
#[derive(Debug, Clone)]
pub struct Client {
    server: String,
    /// Directory upload file names are resolved against
    local_dir: PathBuf,
    chunk_size: usize,
    max_line_length: usize,
}

impl Client {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            local_dir: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_line_length: DEFAULT_MAX_LINE,
        }
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Run one request over a fresh connection.
    pub async fn execute(&self, request_line: &str) -> Result<ClientOutcome, ClientError> {
        match Request::parse(request_line) {
            Ok(request) if request.command == Command::Upload => {
                // Checked before connecting; a bad file never reaches the server
                let (file, len) = self.open_upload(&request.target).await?;
                self.upload(request_line, &request.target, file, len).await
            }
            _ => self.send_request(request_line).await,
        }
    }

    async fn open_upload(&self, file_name: &str) -> Result<(File, u64), ClientError> {
        let path = self.local_dir.join(file_name);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ClientError::FileNotFound(path))
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            return Err(ClientError::IsDirectory(path));
        }

        let file = File::open(&path).await?;
        Ok((file, metadata.len()))
    }

    async fn connect(&self) -> io::Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        let stream = TcpStream::connect(&self.server).await?;
        debug!(server = %self.server, "Connected");
        let (reader, writer) = stream.into_split();
        Ok((BufReader::new(reader), writer))
    }

    async fn send_request(&self, request_line: &str) -> Result<ClientOutcome, ClientError> {
        let (mut reader, mut writer) = self.connect().await?;
        framing::write_line(&mut writer, request_line).await?;

        let outcome = match framing::read_line(&mut reader, self.max_line_length).await? {
            Some(line) => ClientOutcome::Response(line),
            None => ClientOutcome::NoResponse,
        };
        Ok(outcome)
    }

    async fn upload(
        &self,
        request_line: &str,
        file_name: &str,
        mut file: File,
        len: u64,
    ) -> Result<ClientOutcome, ClientError> {
        let (mut reader, mut writer) = self.connect().await?;
        framing::write_line(&mut writer, request_line).await?;

        match framing::read_line(&mut reader, self.max_line_length).await? {
            Some(ack) if ack == "OK" => debug!(file = file_name, "Upload acknowledged"),
            Some(other) => return Ok(ClientOutcome::Rejected(other)),
            None => return Ok(ClientOutcome::NoResponse),
        }

        framing::write_length_prefix(&mut writer, len).await?;
        let descriptor = transfer::send_file(&mut file, &mut writer, len, self.chunk_size).await?;
        info!(file = file_name, bytes = descriptor.bytes_moved(), "Upload sent");

        let status = framing::read_line(&mut reader, self.max_line_length).await?;
        Ok(ClientOutcome::Uploaded {
            file_name: file_name.to_string(),
            bytes: descriptor.bytes_moved(),
            status,
        })
    }
}
