//! Append-only access log.
//!
//! One handle per process, shared by every connection. Each entry goes out
//! as a single `write_all` while holding the mutex, so whole lines from
//! different connections may interleave but a line is never split.
//!
//! ```text
//! REQUEST: GET /docs HTTP/1.1
//! RESPONSE: 200 (OK)
//! ```

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Which side of the exchange an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// One access log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub direction: Direction,
    pub text: String,
}

impl LogEntry {
    pub fn request(line: &str) -> Self {
        Self {
            direction: Direction::Request,
            text: line.to_string(),
        }
    }

    pub fn response(code: u16, message: &str) -> Self {
        Self {
            direction: Direction::Response,
            text: format!("{} ({})", code, message),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Request => write!(f, "REQUEST: {}", self.text),
            Direction::Response => write!(f, "RESPONSE: {}", self.text),
        }
    }
}

/// Shared append-only sink
#[derive(Debug)]
pub struct AccessLog {
    sink: Option<Mutex<File>>,
}

impl AccessLog {
    /// Open (or create) `path` for appending.
    pub async fn open(path: &Path) -> io::Result<Arc<Self>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Arc::new(Self {
            sink: Some(Mutex::new(file)),
        }))
    }

    /// A log that drops every entry.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self { sink: None })
    }

    /// Append one entry as one line.
    ///
    /// Failures are reported through `tracing` and otherwise ignored; a
    /// broken log never fails a connection.
    pub async fn append(&self, entry: LogEntry) {
        let Some(sink) = &self.sink else {
            return;
        };

        let mut line = entry.to_string();
        line.push('\n');

        let mut file = sink.lock().await;
        let result = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to append to access log");
        }
    }
}
