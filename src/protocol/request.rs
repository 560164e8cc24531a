//! Request line parser.
//!
//! Grammar (tokens separated by single spaces, no quoting):
//!
//! ```text
//! GET <path> HTTP/<version>
//! UPLOAD <filename>
//! ```
//!
//! Only the shape is checked here. Which upload extensions are accepted is
//! decided by the session.

use thiserror::Error;

/// Request command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Get,
    Upload,
    Unknown,
}

impl Command {
    fn classify(token: &str) -> Self {
        match token {
            "GET" => Command::Get,
            "UPLOAD" => Command::Upload,
            _ => Command::Unknown,
        }
    }
}

/// A well-formed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Path for GET, file name for UPLOAD
    pub target: String,
    /// `HTTP/x.y` token of a GET request
    pub protocol_version: Option<String>,
}

/// Request line rejections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Known command with the wrong shape
    #[error("malformed {command:?} request: {reason}")]
    Malformed {
        command: Command,
        reason: &'static str,
    },
    /// First token is neither GET nor UPLOAD
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl Request {
    /// Parse a request line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let parts: Vec<&str> = line.split(' ').collect();

        match Command::classify(parts[0]) {
            Command::Get => Self::parse_get(&parts),
            Command::Upload => Self::parse_upload(&parts),
            Command::Unknown => Err(RequestError::UnknownCommand(parts[0].to_string())),
        }
    }

    /// `GET <path> HTTP/<version>`
    fn parse_get(parts: &[&str]) -> Result<Self, RequestError> {
        if parts.len() != 3 {
            return Err(RequestError::Malformed {
                command: Command::Get,
                reason: "expected 3 tokens",
            });
        }

        if !parts[1].starts_with('/') {
            return Err(RequestError::Malformed {
                command: Command::Get,
                reason: "path must start with '/'",
            });
        }

        if !parts[2].starts_with("HTTP/") {
            return Err(RequestError::Malformed {
                command: Command::Get,
                reason: "missing HTTP version",
            });
        }

        Ok(Request {
            command: Command::Get,
            target: parts[1].to_string(),
            protocol_version: Some(parts[2].to_string()),
        })
    }

    /// `UPLOAD <filename>`
    fn parse_upload(parts: &[&str]) -> Result<Self, RequestError> {
        if parts.len() != 2 || parts[1].is_empty() {
            return Err(RequestError::Malformed {
                command: Command::Upload,
                reason: "expected 2 tokens",
            });
        }

        Ok(Request {
            command: Command::Upload,
            target: parts[1].to_string(),
            protocol_version: None,
        })
    }

    /// Final segment of a GET path, empty for `/`.
    ///
    /// Trailing slashes are ignored, so `/docs/` yields `docs`.
    pub fn last_segment(&self) -> &str {
        self.target
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("")
    }

    /// A GET whose last path segment contains a dot is a file request;
    /// anything else is treated as a directory.
    pub fn is_file_request(&self) -> bool {
        self.last_segment().contains('.')
    }
}
