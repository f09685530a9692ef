//! SFTP (SSH File Transfer Protocol) implementation.
//!
//! This module implements the client side of SFTP v3, the most widely
//! supported version.
//!
//! # Architecture
//!
//! SFTP runs as an SSH subsystem over an SSH channel:
//! 1. Open SSH channel (outside this crate)
//! 2. Request "sftp" subsystem ([`SubsystemChannel`](sftpkit_platform::SubsystemChannel))
//! 3. Exchange SFTP protocol messages (this module)
//!
//! Layers, leaves first:
//!
//! - [`wire`] / [`attrs`] / [`message`] - the packet codec and the
//!   flag-driven attribute record
//! - [`transport`] - framing over the byte stream and request ids
//! - [`client`] - handshake and one method per request kind
//! - [`transfer`] - whole-file download/upload and directory listing
//!
//! # Protocol Flow
//!
//! ```text
//! Client                          Server
//!   |                               |
//!   |-- SSH_FXP_INIT -------------->|
//!   |<- SSH_FXP_VERSION ------------|
//!   |                               |
//!   |-- SSH_FXP_OPEN -------------->|
//!   |<- SSH_FXP_HANDLE -------------|
//!   |                               |
//!   |-- SSH_FXP_READ -------------->|
//!   |<- SSH_FXP_DATA ---------------|
//!   |-- SSH_FXP_READ -------------->|
//!   |<- SSH_FXP_STATUS (EOF) -------|
//!   |                               |
//!   |-- SSH_FXP_CLOSE ------------->|
//!   |<- SSH_FXP_STATUS (OK) --------|
//! ```
//!
//! Requests are strictly one at a time: each call writes a request and waits
//! for the next packet, which is taken as its reply.
//!
//! # Example
//!
//! ```rust,no_run
//! use sftpkit_proto::sftp::{SftpClient, SftpConfig};
//!
//! # async fn example(stream: tokio::io::DuplexStream) -> sftpkit_platform::Result<()> {
//! let sftp = SftpClient::connect(stream, SftpConfig::default()).await?;
//!
//! // Upload file
//! sftp.upload("local.txt", "/remote/file.txt").await?;
//!
//! // Download file
//! sftp.download("/remote/file.txt", "local.txt").await?;
//!
//! // List directory
//! for entry in sftp.list_dir("/remote/path").await? {
//!     println!("{}", entry.filename);
//! }
//!
//! sftp.close_session().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - [SFTP Draft v3](https://datatracker.ietf.org/doc/html/draft-ietf-secsh-filexfer-02)

pub mod attrs;
pub mod client;
pub mod config;
pub mod logging;
pub mod message;
pub mod transfer;
pub mod transport;
pub mod types;
mod wire;

pub use attrs::{AttrFlags, Extensions, FileAttrs, FileMode, FileType};
pub use client::{SessionState, SftpClient, SFTP_SUBSYSTEM};
pub use config::{SftpConfig, SftpConfigBuilder};
pub use message::{Message, Packet, PacketType, SFTP_VERSION};
pub use transport::SftpTransport;
pub use types::{DirEntry, FileHandle, Metadata, OpenFlags, Status};
