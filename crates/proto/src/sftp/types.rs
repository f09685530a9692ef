//! SFTP data types and structures.

use super::attrs::FileAttrs;
use sftpkit_platform::{Error, Result, StatusCode, StatusError};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// File open flags (SSH_FXF_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    /// SSH_FXF_READ - Open for reading
    pub const READ: Self = Self(0x00000001);
    /// SSH_FXF_WRITE - Open for writing
    pub const WRITE: Self = Self(0x00000002);
    /// SSH_FXF_APPEND - Force writes to append
    pub const APPEND: Self = Self(0x00000004);
    /// SSH_FXF_CREAT - Create if doesn't exist
    pub const CREAT: Self = Self(0x00000008);
    /// SSH_FXF_TRUNC - Truncate to 0 length
    pub const TRUNC: Self = Self(0x00000010);
    /// SSH_FXF_EXCL - Fail if file exists
    pub const EXCL: Self = Self(0x00000020);

    /// Raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// An open file or directory on the server.
///
/// The token is opaque and server-issued; the path is remembered only for
/// diagnostics. Pass the handle back to [`close`](super::SftpClient::close)
/// when done.
#[derive(Clone, PartialEq, Eq)]
pub struct FileHandle {
    handle: Vec<u8>,
    path: String,
}

impl FileHandle {
    /// Wraps a server handle.
    pub fn new(handle: Vec<u8>, path: impl Into<String>) -> Self {
        Self {
            handle,
            path: path.into(),
        }
    }

    /// Opaque server token.
    pub fn as_bytes(&self) -> &[u8] {
        &self.handle
    }

    /// Remote path this handle was opened for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True for a handle with no server token (closing it is a no-op).
    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("handle", &hex::encode(&self.handle))
            .field("path", &self.path)
            .finish()
    }
}

/// One entry of a NAME response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// File name (a bare name for READDIR, a full path for REALPATH/READLINK)
    pub filename: String,
    /// Server formatted `ls -l` style line, not parsed
    pub longname: String,
    /// Attributes
    pub attrs: FileAttrs,
}

impl DirEntry {
    /// Creates a new entry.
    pub fn new(
        filename: impl Into<String>,
        longname: impl Into<String>,
        attrs: FileAttrs,
    ) -> Self {
        Self {
            filename: filename.into(),
            longname: longname.into(),
            attrs,
        }
    }
}

/// Result of the stat family: the attributes plus the name they were asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Path (or handle path for `fstat`) that was queried
    pub name: String,
    /// Attributes returned by the server
    pub attrs: FileAttrs,
}

impl Metadata {
    /// File size, if reported.
    pub fn len(&self) -> Option<u64> {
        self.attrs.size()
    }

    /// True if the server reported a directory.
    pub fn is_dir(&self) -> bool {
        self.attrs.is_dir()
    }

    /// True if the server reported a regular file.
    pub fn is_file(&self) -> bool {
        self.attrs.is_file()
    }
}

/// Payload of an SSH_FXP_STATUS packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Status code
    pub code: StatusCode,
    /// Human readable message
    pub message: String,
    /// Language tag of `message`
    pub language_tag: String,
}

impl Status {
    /// Creates a status with an empty language tag.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            language_tag: String::new(),
        }
    }

    /// A plain SSH_FX_OK.
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    /// Converts the status into the error for `op`; OK never produces one.
    pub fn into_error(self, op: &'static str) -> Option<Error> {
        if self.code == StatusCode::Ok {
            return None;
        }
        Some(Error::Status(StatusError {
            op,
            code: self.code,
            message: self.message,
            language_tag: self.language_tag,
        }))
    }

    /// Maps the status to `Ok(())` for SSH_FX_OK and an error otherwise.
    pub fn into_result(self, op: &'static str) -> Result<()> {
        match self.into_error(op) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sftpkit_platform::ErrorKind;

    #[test]
    fn test_open_flags_combine() {
        let flags = OpenFlags::WRITE | OpenFlags::CREAT | OpenFlags::TRUNC;
        assert_eq!(flags.bits(), 0x1a);
        assert!(flags.contains(OpenFlags::CREAT));
        assert!(!flags.contains(OpenFlags::READ));
    }

    #[test]
    fn test_ok_status_never_errors() {
        assert!(Status::ok().into_error("close").is_none());
        assert!(Status::new(StatusCode::Ok, "fine").into_result("close").is_ok());
    }

    #[test]
    fn test_every_code_maps_to_distinct_error() {
        let mut seen = Vec::new();
        for code in 1..9 {
            let err = Status::new(StatusCode::from_u32(code), "")
                .into_error("write")
                .unwrap();
            assert_eq!(err.kind(), ErrorKind::Status);
            let status = err.status_code().unwrap();
            assert_eq!(status.as_u32(), code);
            assert!(!seen.contains(&status));
            seen.push(status);
        }
    }

    #[test]
    fn test_empty_message_surfaces_code() {
        let err = Status::new(StatusCode::Failure, "")
            .into_result("mkdir")
            .unwrap_err();
        match &err {
            Error::Status(status) => {
                assert_eq!(status.code, StatusCode::Failure);
                assert_eq!(status.message, "");
                assert_eq!(status.op, "mkdir");
            }
            other => panic!("Expected status error, got {:?}", other),
        }
        assert_eq!(err.to_string(), "mkdir failed with status 4: Failure");
    }

    #[test]
    fn test_eof_is_an_error_outside_paging_ops() {
        let err = Status::new(StatusCode::Eof, "").into_result("write").unwrap_err();
        assert!(err.is_eof());
        assert_eq!(err.kind(), ErrorKind::Status);
    }

    #[test]
    fn test_handle_debug_is_hex() {
        let handle = FileHandle::new(vec![0xde, 0xad], "/tmp/x");
        assert_eq!(
            format!("{:?}", handle),
            "FileHandle { handle: \"dead\", path: \"/tmp/x\" }"
        );
        assert!(FileHandle::new(Vec::new(), "").is_empty());
    }
}
