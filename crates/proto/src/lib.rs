//! Protocol implementations for the sftpkit client.
//!
//! This crate provides a Rust implementation of the SSH File Transfer
//! Protocol, version 3, on top of any ordered, reliable duplex byte stream.
//!
//! - **Codec** - every SFTP v3 packet kind, encoded and decoded bit-exactly
//! - **Client** - version handshake and one method per request kind
//! - **Transfers** - whole-file download/upload and directory listing
//!
//! # Features
//!
//! - `sftp` (default) - SFTP client
//! - `serde` - `Serialize`/`Deserialize` for attribute and config types
//!
//! # Example
//!
//! ```rust
//! use sftpkit_proto::sftp::{FileAttrs, Message, Packet};
//!
//! let mut attrs = FileAttrs::new();
//! attrs.set_size(11).set_permissions(0o100644);
//!
//! let frame = Message::Attrs(attrs.clone()).to_frame(7);
//! let packet = Packet::from_bytes(&frame).unwrap();
//! assert_eq!(packet.request_id, Some(7));
//! assert_eq!(packet.message, Message::Attrs(attrs));
//! ```
//!
//! # Scope
//!
//! Establishing and authenticating the SSH channel is left to the caller;
//! the client only needs a stream on which the "sftp" subsystem runs.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "sftp")]
pub mod sftp;
