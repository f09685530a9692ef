//! Error types for sftpkit
//!
//! Every failure surfaced by the client falls into one of four classes (see
//! [`ErrorKind`]): transport, framing, server status or usage. Nothing is
//! retried internally; callers inspect the class and decide.

use std::fmt;

/// SFTP status codes (SSH_FX_*) as defined for protocol version 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    /// SSH_FX_OK - Success
    Ok,
    /// SSH_FX_EOF - End of file
    Eof,
    /// SSH_FX_NO_SUCH_FILE - No such file
    NoSuchFile,
    /// SSH_FX_PERMISSION_DENIED - Permission denied
    PermissionDenied,
    /// SSH_FX_FAILURE - General failure
    Failure,
    /// SSH_FX_BAD_MESSAGE - Bad message
    BadMessage,
    /// SSH_FX_NO_CONNECTION - No connection
    NoConnection,
    /// SSH_FX_CONNECTION_LOST - Connection lost
    ConnectionLost,
    /// SSH_FX_OP_UNSUPPORTED - Operation not supported
    OpUnsupported,
    /// A code outside the version 3 table
    Unknown(u32),
}

impl StatusCode {
    /// Convert from the wire value. Never fails; unknown codes are kept verbatim.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Eof,
            2 => Self::NoSuchFile,
            3 => Self::PermissionDenied,
            4 => Self::Failure,
            5 => Self::BadMessage,
            6 => Self::NoConnection,
            7 => Self::ConnectionLost,
            8 => Self::OpUnsupported,
            other => Self::Unknown(other),
        }
    }

    /// Wire value of this code.
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Eof => 1,
            Self::NoSuchFile => 2,
            Self::PermissionDenied => 3,
            Self::Failure => 4,
            Self::BadMessage => 5,
            Self::NoConnection => 6,
            Self::ConnectionLost => 7,
            Self::OpUnsupported => 8,
            Self::Unknown(code) => *code,
        }
    }

    /// Returns the default description used when the server sends no message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ok => "Success",
            Self::Eof => "End of file",
            Self::NoSuchFile => "No such file or directory",
            Self::PermissionDenied => "Permission denied",
            Self::Failure => "Failure",
            Self::BadMessage => "Bad message",
            Self::NoConnection => "No connection",
            Self::ConnectionLost => "Connection lost",
            Self::OpUnsupported => "Operation not supported",
            Self::Unknown(_) => "Unknown status",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_u32())
    }
}

/// A non-OK status reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    /// Operation that received the status (e.g. "stat")
    pub op: &'static str,
    /// Decoded status code
    pub code: StatusCode,
    /// Server supplied message, possibly empty
    pub message: String,
    /// Server supplied language tag, possibly empty
    pub language_tag: String,
}

impl StatusError {
    /// Creates a new status error.
    pub fn new(op: &'static str, code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            op,
            code,
            message: message.into(),
            language_tag: String::new(),
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = if self.message.is_empty() {
            self.code.message()
        } else {
            self.message.as_str()
        };
        write!(
            f,
            "{} failed with status {}: {}",
            self.op,
            self.code.as_u32(),
            message
        )
    }
}

impl std::error::Error for StatusError {}

/// Broad error classes used to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stream read/write failed or the peer went away
    Transport,
    /// Corrupt or undecodable packet
    Framing,
    /// Server reported a non-OK status
    Status,
    /// Programming error or protocol desynchronization
    Usage,
}

/// Unified error type for all sftpkit operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the channel while a response was awaited
    #[error("SFTP channel closed by peer")]
    ChannelClosed,

    /// Packet framing violated (short input, length mismatch, oversized frame)
    #[error("Framing error: {0}")]
    Framing(String),

    /// Packet body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Server returned a non-OK status
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Response kind does not match the request that was sent
    #[error("Unexpected {got} response to {op} (expected {expected})")]
    UnexpectedPacket {
        /// Operation that was performed
        op: &'static str,
        /// Response kinds the operation accepts
        expected: &'static str,
        /// Response kind actually received
        got: String,
    },

    /// Server speaks a protocol version other than the supported one
    #[error("Unsupported SFTP version {got} (expected {expected})")]
    VersionMismatch {
        /// Version this client implements
        expected: u32,
        /// Version announced by the server
        got: u32,
    },

    /// Operation attempted in a session state that does not permit it
    #[error("Cannot {op}: session is {state}")]
    InvalidState {
        /// Operation that was attempted
        op: &'static str,
        /// Session state at the time
        state: String,
    },

    /// Response id differs from the id of the outstanding request
    #[error("Response id {got} does not match request id {expected}")]
    RequestIdMismatch {
        /// Id of the request that was sent
        expected: u32,
        /// Id carried by the response
        got: u32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::ChannelClosed => ErrorKind::Transport,
            Error::Framing(_) | Error::Decode(_) | Error::RequestIdMismatch { .. } => {
                ErrorKind::Framing
            }
            Error::Status(_) => ErrorKind::Status,
            Error::UnexpectedPacket { .. }
            | Error::VersionMismatch { .. }
            | Error::InvalidState { .. }
            | Error::Config(_) => ErrorKind::Usage,
        }
    }

    /// Returns the server status code, if this is a status error.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Status(status) => Some(status.code),
            _ => None,
        }
    }

    /// True if the server reported end-of-file.
    pub fn is_eof(&self) -> bool {
        self.status_code() == Some(StatusCode::Eof)
    }

    /// True if the server reported that the path does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NoSuchFile)
    }
}

/// Result type for sftpkit operations
pub type Result<T> = std::result::Result<T, Error>;
