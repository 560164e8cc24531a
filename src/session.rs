//! Per-connection session.
//!
//! A session owns one accepted connection and carries it through exactly
//! one exchange:
//!
//! ```text
//! AwaitingRequest -> Dispatching -> ServingGet        -> Closed
//!                                -> ReceivingUpload   -> Closed
//!                                -> RespondingUnknown -> Closed
//! ```
//!
//! `Closed` is reached on every path, including I/O failures: the write side
//! is shut down and both halves are dropped when [`Session::run`] returns.
//!
//! All reads go through a single `BufReader`, which is the one cursor shared
//! by the request line and the raw upload bytes after it.

use chrono::Utc;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tracing::{debug, info, trace, warn};

use crate::access_log::{AccessLog, LogEntry};
use crate::config::Config;
use crate::protocol::framing::{self, FramingError, DEFAULT_MAX_LINE};
use crate::protocol::html;
use crate::protocol::response::{content_type_for, is_uploadable};
use crate::protocol::{Body, Command, Request, RequestError, ResponseEnvelope, Status};
use crate::storage::Storage;
use crate::transfer::{self, TransferError, DEFAULT_CHUNK_SIZE};

/// Tuning knobs a session needs from the server configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub chunk_size: usize,
    pub max_line_length: usize,
    pub request_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_line_length: DEFAULT_MAX_LINE,
            request_timeout: None,
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_line_length: config.max_line_length,
            request_timeout: config.request_timeout,
        }
    }
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Dispatching,
    ServingGet,
    ReceivingUpload,
    RespondingUnknown,
    Closed,
}

/// Errors that end a session without a complete response
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out waiting for the request line")]
    Timeout,
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One connection, one exchange
pub struct Session<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    storage: Arc<Storage>,
    access_log: Arc<AccessLog>,
    settings: SessionSettings,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        storage: Arc<Storage>,
        access_log: Arc<AccessLog>,
        settings: SessionSettings,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            storage,
            access_log,
            settings,
            state: SessionState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the exchange and close the connection.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.process().await;
        self.close().await;
        result
    }

    async fn process(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::AwaitingRequest);

        let line = match self.read_request_line().await {
            Ok(Some(line)) if !line.is_empty() => line,
            Ok(_) => {
                trace!("No request line");
                return Ok(());
            }
            Err(SessionError::Framing(FramingError::LineTooLong { limit })) => {
                debug!(limit, "Request line too long");
                self.transition(SessionState::RespondingUnknown);
                return self
                    .respond_error(Status::BadRequest, "Request line too long")
                    .await;
            }
            Err(e) => return Err(e),
        };

        self.access_log.append(LogEntry::request(&line)).await;
        self.transition(SessionState::Dispatching);

        match Request::parse(&line) {
            Ok(request) => match request.command {
                Command::Get => {
                    self.transition(SessionState::ServingGet);
                    self.serve_get(&request).await
                }
                Command::Upload => {
                    self.transition(SessionState::ReceivingUpload);
                    self.receive_upload(&request).await
                }
                Command::Unknown => {
                    self.transition(SessionState::RespondingUnknown);
                    self.respond_error(Status::NotFound, "Page not found").await
                }
            },
            Err(e) => {
                debug!(error = %e, "Rejected request");
                self.transition(SessionState::RespondingUnknown);
                match e {
                    RequestError::Malformed {
                        command: Command::Upload,
                        ..
                    } => {
                        self.respond_error(Status::BadRequest, "Invalid UPLOAD request")
                            .await
                    }
                    _ => self.respond_error(Status::NotFound, "Page not found").await,
                }
            }
        }
    }

    async fn read_request_line(&mut self) -> Result<Option<String>, SessionError> {
        let max_line = self.settings.max_line_length;
        let read = framing::read_line(&mut self.reader, max_line);

        let line = match self.settings.request_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| SessionError::Timeout)??,
            None => read.await?,
        };
        Ok(line)
    }

    async fn serve_get(&mut self, request: &Request) -> Result<(), SessionError> {
        let path = self.storage.resolve(&request.target);

        if !self.storage.exists(&path).await {
            debug!(path = %request.target, "Not found");
            return self.respond_error(Status::NotFound, "Page not found").await;
        }

        if request.is_file_request() {
            self.serve_file(request, &path).await
        } else {
            self.serve_listing(request, &path).await
        }
    }

    async fn serve_listing(&mut self, request: &Request, path: &Path) -> Result<(), SessionError> {
        let entries = match self.storage.list_children(path).await {
            Ok(entries) => entries,
            Err(e) => return self.respond_io_failure(e).await,
        };

        let base = if request.target == "/" {
            ""
        } else {
            request.target.as_str()
        };
        let page = html::directory_page(base, &entries);
        debug!(path = %request.target, entries = entries.len(), "Directory listing");

        self.respond(ResponseEnvelope::html(Status::Ok, page), "OK")
            .await
    }

    async fn serve_file(&mut self, request: &Request, path: &Path) -> Result<(), SessionError> {
        let name = request.last_segment();
        let content_type = content_type_for(name);

        if content_type == "text/plain" {
            let text = match self.storage.read_text(path).await {
                Ok(text) => text,
                Err(e) => return self.respond_io_failure(e).await,
            };
            let page = html::text_page(name, &text);
            return self
                .respond(ResponseEnvelope::html(Status::Ok, page), "OK")
                .await;
        }

        let (mut file, len) = match self.storage.open(path).await {
            Ok(opened) => opened,
            Err(e) => return self.respond_io_failure(e).await,
        };

        let envelope = ResponseEnvelope::streamed(content_type, len);
        self.writer
            .write_all(&envelope.encode_head(Utc::now()))
            .await?;
        self.writer.flush().await?;

        let descriptor =
            transfer::send_file(&mut file, &mut self.writer, len, self.settings.chunk_size)
                .await?;
        debug!(
            path = %request.target,
            content_type,
            bytes = descriptor.bytes_moved(),
            "File sent"
        );

        self.access_log
            .append(LogEntry::response(Status::Ok.code(), "OK"))
            .await;
        Ok(())
    }

    async fn receive_upload(&mut self, request: &Request) -> Result<(), SessionError> {
        let name = request.target.as_str();

        if !is_uploadable(name) {
            debug!(file = name, "Unsupported upload format");
            return self
                .respond_error(Status::BadRequest, "Invalid File Format")
                .await;
        }

        framing::write_line(&mut self.writer, "OK").await?;
        trace!(file = name, "Upload acknowledged");

        let total_bytes = framing::read_length_prefix(&mut self.reader).await?;

        let destination = match self.storage.create(name).await {
            Ok(destination) => destination,
            Err(e) => return self.respond_io_failure(e).await,
        };

        match transfer::receive_file(
            &mut self.reader,
            &destination,
            total_bytes,
            self.settings.chunk_size,
        )
        .await
        {
            Ok(descriptor) => {
                info!(file = name, bytes = descriptor.bytes_moved(), "Upload complete");
                self.respond(
                    ResponseEnvelope::empty(Status::Ok),
                    "File uploaded successfully.",
                )
                .await
            }
            Err(TransferError::Io(e)) => self.respond_io_failure(e).await,
            Err(e) => {
                warn!(file = name, error = %e, "Upload abandoned");
                Err(e.into())
            }
        }
    }

    /// Write a complete envelope with an inline body.
    async fn respond(
        &mut self,
        envelope: ResponseEnvelope,
        message: &str,
    ) -> Result<(), SessionError> {
        let head = envelope.encode_head(Utc::now());
        self.writer.write_all(&head).await?;
        if let Body::Inline(body) = &envelope.body {
            self.writer.write_all(body).await?;
        }
        self.writer.flush().await?;

        debug!(
            status = envelope.status.code(),
            length = envelope.content_length,
            "Response sent"
        );
        self.access_log
            .append(LogEntry::response(envelope.status.code(), message))
            .await;
        Ok(())
    }

    async fn respond_error(&mut self, status: Status, message: &str) -> Result<(), SessionError> {
        self.respond(ResponseEnvelope::error(status, message), message)
            .await
    }

    /// Report a filesystem failure before any response bytes were sent.
    async fn respond_io_failure(&mut self, error: io::Error) -> Result<(), SessionError> {
        warn!(error = %error, "I/O failure");
        let status = Status::InternalServerError;
        self.respond_error(status, status.reason()).await
    }

    async fn close(&mut self) {
        self.transition(SessionState::Closed);
        if let Err(e) = self.writer.shutdown().await {
            trace!(error = %e, "Shutdown failed");
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, DuplexStream};

    /// Split a raw reply into its head and body.
    fn split_response(raw: &[u8]) -> Option<(&str, Bytes)> {
        let end = raw.windows(4).position(|w| w == b"\r\n\r\n")?;
        let head = std::str::from_utf8(&raw[..end]).ok()?;
        Some((head, Bytes::copy_from_slice(&raw[end + 4..])))
    }

    struct Fixture {
        dir: tempfile::TempDir,
        storage: Arc<Storage>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("public");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello world").unwrap();
        std::fs::create_dir(root.join("docs")).unwrap();
        std::fs::write(root.join("docs").join("logo.png"), [0x89, b'P', b'N', b'G', 0, 1]).unwrap();
        std::fs::write(root.join("blob.bin"), vec![7u8; 10_000]).unwrap();
        let storage = Storage::new(&root, dir.path().join("uploaded"));
        Fixture { dir, storage }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            chunk_size: 1024,
            ..SessionSettings::default()
        }
    }

    /// Send `input`, half-close, and collect everything the session writes.
    async fn exchange(
        storage: &Arc<Storage>,
        settings: SessionSettings,
        input: &[u8],
    ) -> (Result<(), SessionError>, Vec<u8>) {
        let (mut client, server): (DuplexStream, DuplexStream) = tokio::io::duplex(64 * 1024);
        let session = Session::new(server, Arc::clone(storage), AccessLog::disabled(), settings);
        let handle = tokio::spawn(session.run());

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (handle.await.unwrap(), output)
    }

    fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
        head.lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
    }

    fn upload_frame(line: &str, payload: &[u8]) -> Vec<u8> {
        let mut frame = format!("{line}\r\n").into_bytes();
        frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[tokio::test]
    async fn test_get_text_file_inline() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"GET /a.txt HTTP/1.1\r\n").await;
        result.unwrap();

        let (head, body) = split_response(&output).unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(header(head, "Content-Type"), Some("text/html"));
        assert_eq!(header(head, "Connection"), Some("close"));
        assert_eq!(
            header(head, "Content-Length"),
            Some(body.len().to_string().as_str())
        );
        assert_eq!(
            &body[..],
            b"<html><body><h1>Text File: a.txt</h1><p>hello world</p></body></html>"
        );
    }

    #[tokio::test]
    async fn test_get_image_streams_raw_bytes() {
        let fx = fixture();
        let (result, output) =
            exchange(&fx.storage, settings(), b"GET /docs/logo.png HTTP/1.1\r\n").await;
        result.unwrap();

        let (head, body) = split_response(&output).unwrap();
        assert_eq!(header(head, "Content-Type"), Some("image/png"));
        assert_eq!(header(head, "Content-Length"), Some("6"));
        assert_eq!(&body[..], [0x89, b'P', b'N', b'G', 0, 1]);
    }

    #[tokio::test]
    async fn test_get_binary_spans_many_chunks() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"GET /blob.bin HTTP/1.0\r\n").await;
        result.unwrap();

        let (head, body) = split_response(&output).unwrap();
        assert_eq!(header(head, "Content-Type"), Some("application/octet-stream"));
        assert_eq!(header(head, "Content-Length"), Some("10000"));
        assert_eq!(body.len(), 10_000);
        assert!(body.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn test_get_missing_is_404() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"GET /nope.txt HTTP/1.1\r\n").await;
        result.unwrap();
        assert!(output.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn test_get_root_listing() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"GET / HTTP/1.1\r\n").await;
        result.unwrap();

        let (head, body) = split_response(&output).unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        let page = std::str::from_utf8(&body).unwrap();
        assert_eq!(page.matches("<li>").count(), 3);
        assert!(page.contains("<li><a href=\"/a.txt\">a.txt</a></li>"));
        assert!(page.contains("<li><b><i><a href=\"/docs\">docs/</a></i></b></li>"));
    }

    #[tokio::test]
    async fn test_get_nested_listing_links() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"GET /docs HTTP/1.1\r\n").await;
        result.unwrap();

        let (_, body) = split_response(&output).unwrap();
        let page = std::str::from_utf8(&body).unwrap();
        assert!(page.contains("href=\"/docs/logo.png\""));
    }

    #[tokio::test]
    async fn test_extensionless_file_treated_as_directory() {
        let fx = fixture();
        std::fs::write(fx.storage.resolve("/Makefile"), "all:").unwrap();
        let (result, output) = exchange(&fx.storage, settings(), b"GET /Makefile HTTP/1.1\r\n").await;
        result.unwrap();
        assert!(output.starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let fx = fixture();
        let cases: [(&[u8], &[u8]); 5] = [
            (b"GET /a.txt\r\n", b"HTTP/1.1 404"),
            (b"GET /a.txt HTTP/1.1 extra\r\n", b"HTTP/1.1 404"),
            (b"HELLO\r\n", b"HTTP/1.1 404"),
            (b"UPLOAD\r\n", b"HTTP/1.1 400"),
            (b"UPLOAD a.txt b.txt\r\n", b"HTTP/1.1 400"),
        ];

        for (input, expected) in cases {
            let (result, output) = exchange(&fx.storage, settings(), input).await;
            result.unwrap();
            assert!(
                output.starts_with(expected),
                "{:?} -> {:?}",
                String::from_utf8_lossy(input),
                String::from_utf8_lossy(&output)
            );
        }
        assert!(!fx.storage.upload_dir().exists());
    }

    #[tokio::test]
    async fn test_empty_line_closes_silently() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"\r\n").await;
        result.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_eof_closes_silently() {
        let fx = fixture();
        let (result, output) = exchange(&fx.storage, settings(), b"").await;
        result.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_request_line_too_long() {
        let fx = fixture();
        let settings = SessionSettings {
            max_line_length: 16,
            ..settings()
        };
        let (result, output) =
            exchange(&fx.storage, settings, b"GET /a-very-long-path.txt HTTP/1.1\r\n").await;
        result.unwrap();
        assert!(output.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_upload_scenario() {
        let fx = fixture();
        let (result, output) =
            exchange(&fx.storage, settings(), &upload_frame("UPLOAD notes.txt", b"hello")).await;
        result.unwrap();

        let output = std::str::from_utf8(&output).unwrap();
        let envelope = output.strip_prefix("OK\r\n").unwrap();
        assert!(envelope.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(envelope.contains("Content-Type: text/plain\r\n"));
        assert!(envelope.ends_with("Content-Length: 0\r\nConnection: close\r\n\r\n"));

        let stored = fx.dir.path().join("uploaded").join("notes.txt");
        assert_eq!(std::fs::read(stored).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_upload_zero_bytes() {
        let fx = fixture();
        let (result, output) =
            exchange(&fx.storage, settings(), &upload_frame("UPLOAD empty.png", b"")).await;
        result.unwrap();

        assert!(output.starts_with(b"OK\r\nHTTP/1.1 200 OK\r\n"));
        let stored = fx.storage.upload_dir().join("empty.png");
        assert_eq!(std::fs::metadata(stored).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_upload_ignores_trailing_bytes() {
        let fx = fixture();
        let mut frame = upload_frame("UPLOAD photo.jpg", b"\xff\xd8\xff");
        frame.extend_from_slice(b"trailing garbage");
        let (result, _) = exchange(&fx.storage, settings(), &frame).await;
        result.unwrap();

        let stored = fx.storage.upload_dir().join("photo.jpg");
        assert_eq!(std::fs::read(stored).unwrap(), b"\xff\xd8\xff");
    }

    #[tokio::test]
    async fn test_upload_unsupported_format() {
        let fx = fixture();
        let (result, output) =
            exchange(&fx.storage, settings(), &upload_frame("UPLOAD image.gif", b"GIF89a")).await;
        result.unwrap();

        assert!(output.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        let (_, body) = split_response(&output).unwrap();
        assert_eq!(
            &body[..],
            b"<html><body><h1>400 Invalid File Format</h1></body></html>"
        );
        assert!(!fx.storage.upload_dir().exists());
    }

    #[tokio::test]
    async fn test_upload_truncated() {
        let fx = fixture();
        let mut frame = b"UPLOAD big.txt\r\n".to_vec();
        frame.extend_from_slice(&10u64.to_be_bytes());
        frame.extend_from_slice(b"abc");

        let (result, output) = exchange(&fx.storage, settings(), &frame).await;
        match result {
            Err(SessionError::Transfer(TransferError::Truncated { expected, received })) => {
                assert_eq!(expected, 10);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(output, b"OK\r\n");
        assert!(!fx.storage.upload_dir().join("big.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_short_length_prefix() {
        let fx = fixture();
        let (result, output) =
            exchange(&fx.storage, settings(), b"UPLOAD a.txt\r\n\x00\x00\x00").await;
        assert!(matches!(
            result,
            Err(SessionError::Framing(FramingError::ShortLengthPrefix { received: 3 }))
        ));
        assert_eq!(output, b"OK\r\n");
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let fx = fixture();
        let (_client, server) = tokio::io::duplex(1024);
        let settings = SessionSettings {
            request_timeout: Some(Duration::from_millis(50)),
            ..settings()
        };
        let session = Session::new(server, Arc::clone(&fx.storage), AccessLog::disabled(), settings);
        assert!(matches!(session.run().await, Err(SessionError::Timeout)));
    }

    #[tokio::test]
    async fn test_access_log_records_exchange() {
        let fx = fixture();
        let log_path = fx.dir.path().join("log.txt");
        let access_log = AccessLog::open(&log_path).await.unwrap();

        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let session = Session::new(server, Arc::clone(&fx.storage), access_log, settings());
        let handle = tokio::spawn(session.run());
        client.write_all(b"GET /missing HTTP/1.1\r\n").await.unwrap();
        client.shutdown().await.unwrap();
        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        handle.await.unwrap().unwrap();

        let log = std::fs::read_to_string(log_path).unwrap();
        assert_eq!(
            log,
            "REQUEST: GET /missing HTTP/1.1\nRESPONSE: 404 (Page not found)\n"
        );
    }

    #[test]
    fn test_new_session_awaits_request() {
        let fx = fixture();
        let (_client, server) = tokio::io::duplex(16);
        let session = Session::new(server, Arc::clone(&fx.storage), AccessLog::disabled(), settings());
        assert_eq!(session.state(), SessionState::AwaitingRequest);
    }
}
