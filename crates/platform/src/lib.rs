//! # sftpkit Platform
//!
//! Shared types and traits for the sftpkit SFTP client.
//!
//! This crate provides:
//! - Unified error types (`Error`, `Result`) and the SFTP status code table
//! - Stream traits (`ByteStream`, `SubsystemChannel`) the client is built on
//!
//! # Examples
//!
//! ```
//! use sftpkit_platform::{Error, ErrorKind, StatusCode, StatusError};
//!
//! let err: Error = StatusError::new("stat", StatusCode::NoSuchFile, "").into();
//! assert_eq!(err.kind(), ErrorKind::Status);
//! assert!(err.is_not_found());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod traits;

pub use error::{Error, ErrorKind, Result, StatusCode, StatusError};
pub use traits::{ByteStream, SubsystemChannel};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
