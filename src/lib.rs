//! fileline: a line-framed file server and its client
//!
//! One request per TCP connection:
//! - `GET <path> HTTP/<version>` serves a directory listing or a file
//!   inside a pseudo-HTTP response
//! - `UPLOAD <name>` is acknowledged with `OK`, then receives an 8-byte
//!   length prefix and exactly that many bytes into the uploads directory
//!
//! Features:
//! - One task per connection, connection closed after every exchange
//! - Chunked transfers bounded by the declared byte count
//! - Shared append-only access log
//! - Configuration via CLI arguments or TOML file

pub mod access_log;
pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod transfer;
