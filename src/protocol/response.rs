//! Pseudo-HTTP response envelopes.
//!
//! Every reply the server sends after the request line has this shape:
//!
//! ```text
//! HTTP/1.1 <code> <reason>\r\n
//! Server: fileline/<version>\r\n
//! Date: <rfc 7231 date>\r\n
//! Content-Type: <type>\r\n
//! Content-Length: <n>\r\n
//! Connection: close\r\n
//! \r\n
//! <exactly n body bytes>
//! ```
//!
//! There is no keep-alive and no chunked encoding; `Content-Length` is the
//! only way the peer knows where the body ends.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use super::html;

/// Value of the `Server` header
pub const SERVER_NAME: &str = concat!("fileline/", env!("CARGO_PKG_VERSION"));

/// Extensions accepted by UPLOAD.
pub const UPLOAD_EXTENSIONS: &[&str] = &[".txt", ".jpg", ".jpeg", ".png"];

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// Where the body bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Body held in memory
    Inline(Bytes),
    /// Body streamed by the caller after the head is written
    Stream,
}

/// A status line, headers and a body description.
///
/// Constructors set `content_length` from the body, so the declared length
/// always matches what is written for inline bodies. For streamed bodies the
/// caller must send exactly `content_length` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: Status,
    pub content_type: &'static str,
    pub content_length: u64,
    pub body: Body,
}

impl ResponseEnvelope {
    /// Envelope with an in-memory body
    pub fn inline(status: Status, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            content_type,
            content_length: body.len() as u64,
            body: Body::Inline(body),
        }
    }

    /// `text/html` envelope
    pub fn html(status: Status, page: String) -> Self {
        Self::inline(status, "text/html", page)
    }

    /// Error envelope with an HTML body naming the status and `message`
    pub fn error(status: Status, message: &str) -> Self {
        Self::html(status, html::error_page(status.code(), message))
    }

    /// Empty `text/plain` envelope, used to confirm an upload
    pub fn empty(status: Status) -> Self {
        Self::inline(status, "text/plain", Bytes::new())
    }

    /// Envelope whose `len` body bytes are streamed separately
    pub fn streamed(content_type: &'static str, len: u64) -> Self {
        Self {
            status: Status::Ok,
            content_type,
            content_length: len,
            body: Body::Stream,
        }
    }

    /// Encode the status line, headers and blank line.
    pub fn encode_head(&self, date: DateTime<Utc>) -> BytesMut {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Server: {}\r\n\
             Date: {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.status.code(),
            self.status.reason(),
            SERVER_NAME,
            http_date(date),
            self.content_type,
            self.content_length,
        );
        BytesMut::from(head.as_bytes())
    }
}

/// Format a timestamp the way HTTP `Date` headers expect.
pub fn http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Content type from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".jpg") || name.ends_with(".jpeg") {
        "image/jpeg"
    } else if name.ends_with(".png") {
        "image/png"
    } else if name.ends_with(".txt") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

/// Whether UPLOAD accepts this file name. Case-sensitive.
pub fn is_uploadable(name: &str) -> bool {
    UPLOAD_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
