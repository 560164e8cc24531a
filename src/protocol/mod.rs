//! Wire protocol.
//!
//! A connection carries exactly one exchange:
//!
//! ```text
//! GET <path> HTTP/<version>\r\n        ->  pseudo-HTTP response, close
//!
//! UPLOAD <filename>\r\n                ->  OK\r\n
//! <u64 length, big-endian><bytes>      ->  pseudo-HTTP 200, empty body, close
//! ```
//!
//! - `framing`: text lines and 8-byte length prefixes
//! - `request`: request line parsing
//! - `response`: response envelopes and content types
//! - `html`: listing, text and error pages

pub mod framing;
pub mod html;
pub mod request;
pub mod response;

pub use framing::FramingError;
pub use request::{Command, Request, RequestError};
pub use response::{Body, ResponseEnvelope, Status};
