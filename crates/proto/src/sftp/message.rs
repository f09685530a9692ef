//! SFTP protocol messages.
//!
//! Defines the SFTP packet kinds and their serialization.
//!
//! # Packet Format
//!
//! ```text
//! uint32    length      (bytes following this field)
//! byte      type
//! uint32    request-id  (absent for SSH_FXP_INIT and SSH_FXP_VERSION)
//! byte[n]   type specific fields
//! ```

use super::attrs::{Extensions, FileAttrs};
use super::types::{DirEntry, OpenFlags, Status};
use super::wire::{write_bytes, write_string, WireReader};
use bytes::{BufMut, BytesMut};
use sftpkit_platform::{Error, Result, StatusCode};
use std::fmt;

/// SFTP protocol version (v3).
pub const SFTP_VERSION: u32 = 3;

/// Size of the length prefix.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Smallest valid frame: length + type + request id (or version).
pub const MIN_PACKET_LEN: usize = 9;

/// SFTP message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SSH_FXP_INIT - Initialize SFTP session
    Init = 1,
    /// SSH_FXP_VERSION - Version response
    Version = 2,
    /// SSH_FXP_OPEN - Open file
    Open = 3,
    /// SSH_FXP_CLOSE - Close file/directory
    Close = 4,
    /// SSH_FXP_READ - Read from file
    Read = 5,
    /// SSH_FXP_WRITE - Write to file
    Write = 6,
    /// SSH_FXP_LSTAT - Get file attributes (no follow symlinks)
    LStat = 7,
    /// SSH_FXP_FSTAT - Get file attributes by handle
    FStat = 8,
    /// SSH_FXP_SETSTAT - Set file attributes
    SetStat = 9,
    /// SSH_FXP_FSETSTAT - Set file attributes by handle
    FSetStat = 10,
    /// SSH_FXP_OPENDIR - Open directory
    OpenDir = 11,
    /// SSH_FXP_READDIR - Read directory
    ReadDir = 12,
    /// SSH_FXP_REMOVE - Remove file
    Remove = 13,
    /// SSH_FXP_MKDIR - Create directory
    MkDir = 14,
    /// SSH_FXP_RMDIR - Remove directory
    RmDir = 15,
    /// SSH_FXP_REALPATH - Canonicalize path
    RealPath = 16,
    /// SSH_FXP_STAT - Get file attributes
    Stat = 17,
    /// SSH_FXP_RENAME - Rename file/directory
    Rename = 18,
    /// SSH_FXP_READLINK - Read symbolic link
    ReadLink = 19,
    /// SSH_FXP_SYMLINK - Create symbolic link
    Symlink = 20,

    // Response messages
    /// SSH_FXP_STATUS - Status response
    Status = 101,
    /// SSH_FXP_HANDLE - File handle response
    Handle = 102,
    /// SSH_FXP_DATA - Data response
    Data = 103,
    /// SSH_FXP_NAME - Name response
    Name = 104,
    /// SSH_FXP_ATTRS - Attributes response
    Attrs = 105,
}

impl PacketType {
    /// Convert from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Init),
            2 => Some(Self::Version),
            3 => Some(Self::Open),
            4 => Some(Self::Close),
            5 => Some(Self::Read),
            6 => Some(Self::Write),
            7 => Some(Self::LStat),
            8 => Some(Self::FStat),
            9 => Some(Self::SetStat),
            10 => Some(Self::FSetStat),
            11 => Some(Self::OpenDir),
            12 => Some(Self::ReadDir),
            13 => Some(Self::Remove),
            14 => Some(Self::MkDir),
            15 => Some(Self::RmDir),
            16 => Some(Self::RealPath),
            17 => Some(Self::Stat),
            18 => Some(Self::Rename),
            19 => Some(Self::ReadLink),
            20 => Some(Self::Symlink),
            101 => Some(Self::Status),
            102 => Some(Self::Handle),
            103 => Some(Self::Data),
            104 => Some(Self::Name),
            105 => Some(Self::Attrs),
            _ => None,
        }
    }

    /// True for the two handshake kinds, which carry no request id.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Init | Self::Version)
    }

    /// Protocol name, e.g. `SSH_FXP_STATUS`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "SSH_FXP_INIT",
            Self::Version => "SSH_FXP_VERSION",
            Self::Open => "SSH_FXP_OPEN",
            Self::Close => "SSH_FXP_CLOSE",
            Self::Read => "SSH_FXP_READ",
            Self::Write => "SSH_FXP_WRITE",
            Self::LStat => "SSH_FXP_LSTAT",
            Self::FStat => "SSH_FXP_FSTAT",
            Self::SetStat => "SSH_FXP_SETSTAT",
            Self::FSetStat => "SSH_FXP_FSETSTAT",
            Self::OpenDir => "SSH_FXP_OPENDIR",
            Self::ReadDir => "SSH_FXP_READDIR",
            Self::Remove => "SSH_FXP_REMOVE",
            Self::MkDir => "SSH_FXP_MKDIR",
            Self::RmDir => "SSH_FXP_RMDIR",
            Self::RealPath => "SSH_FXP_REALPATH",
            Self::Stat => "SSH_FXP_STAT",
            Self::Rename => "SSH_FXP_RENAME",
            Self::ReadLink => "SSH_FXP_READLINK",
            Self::Symlink => "SSH_FXP_SYMLINK",
            Self::Status => "SSH_FXP_STATUS",
            Self::Handle => "SSH_FXP_HANDLE",
            Self::Data => "SSH_FXP_DATA",
            Self::Name => "SSH_FXP_NAME",
            Self::Attrs => "SSH_FXP_ATTRS",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SFTP message body, one variant per packet kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client hello
    Init {
        /// Highest version the client speaks
        version: u32,
        /// Client extensions
        extensions: Extensions,
    },
    /// Server hello
    Version {
        /// Version the server speaks
        version: u32,
        /// Server extensions
        extensions: Extensions,
    },
    /// Open a file
    Open {
        /// Remote path
        path: String,
        /// SSH_FXF_* flags
        pflags: OpenFlags,
        /// Initial attributes for created files
        attrs: FileAttrs,
    },
    /// Close a handle
    Close {
        /// Handle token
        handle: Vec<u8>,
    },
    /// Read from a file handle
    Read {
        /// Handle token
        handle: Vec<u8>,
        /// Byte offset
        offset: u64,
        /// Maximum bytes to return
        len: u32,
    },
    /// Write to a file handle
    Write {
        /// Handle token
        handle: Vec<u8>,
        /// Byte offset
        offset: u64,
        /// Bytes to write
        data: Vec<u8>,
    },
    /// Stat without following symlinks
    LStat {
        /// Remote path
        path: String,
    },
    /// Stat an open handle
    FStat {
        /// Handle token
        handle: Vec<u8>,
    },
    /// Change attributes by path
    SetStat {
        /// Remote path
        path: String,
        /// Attributes to apply
        attrs: FileAttrs,
    },
    /// Change attributes by handle
    FSetStat {
        /// Handle token
        handle: Vec<u8>,
        /// Attributes to apply
        attrs: FileAttrs,
    },
    /// Open a directory for listing
    OpenDir {
        /// Remote path
        path: String,
    },
    /// Read the next batch of directory entries
    ReadDir {
        /// Handle token
        handle: Vec<u8>,
    },
    /// Remove a file
    Remove {
        /// Remote path
        path: String,
    },
    /// Create a directory
    MkDir {
        /// Remote path
        path: String,
        /// Initial attributes
        attrs: FileAttrs,
    },
    /// Remove a directory
    RmDir {
        /// Remote path
        path: String,
    },
    /// Canonicalize a path
    RealPath {
        /// Remote path
        path: String,
    },
    /// Stat following symlinks
    Stat {
        /// Remote path
        path: String,
    },
    /// Rename a file or directory
    Rename {
        /// Existing path
        old_path: String,
        /// New path
        new_path: String,
    },
    /// Read a symlink target
    ReadLink {
        /// Remote path
        path: String,
    },
    /// Create a symlink
    Symlink {
        /// Path of the link to create
        link_path: String,
        /// Path the link points to
        target_path: String,
    },
    /// Status response
    Status(Status),
    /// Handle response
    Handle(Vec<u8>),
    /// Data response
    Data(Vec<u8>),
    /// Name response
    Name(Vec<DirEntry>),
    /// Attributes response
    Attrs(FileAttrs),
}

impl Message {
    /// Packet kind of this message.
    pub fn kind(&self) -> PacketType {
        match self {
            Self::Init { .. } => PacketType::Init,
            Self::Version { .. } => PacketType::Version,
            Self::Open { .. } => PacketType::Open,
            Self::Close { .. } => PacketType::Close,
            Self::Read { .. } => PacketType::Read,
            Self::Write { .. } => PacketType::Write,
            Self::LStat { .. } => PacketType::LStat,
            Self::FStat { .. } => PacketType::FStat,
            Self::SetStat { .. } => PacketType::SetStat,
            Self::FSetStat { .. } => PacketType::FSetStat,
            Self::OpenDir { .. } => PacketType::OpenDir,
            Self::ReadDir { .. } => PacketType::ReadDir,
            Self::Remove { .. } => PacketType::Remove,
            Self::MkDir { .. } => PacketType::MkDir,
            Self::RmDir { .. } => PacketType::RmDir,
            Self::RealPath { .. } => PacketType::RealPath,
            Self::Stat { .. } => PacketType::Stat,
            Self::Rename { .. } => PacketType::Rename,
            Self::ReadLink { .. } => PacketType::ReadLink,
            Self::Symlink { .. } => PacketType::Symlink,
            Self::Status(_) => PacketType::Status,
            Self::Handle(_) => PacketType::Handle,
            Self::Data(_) => PacketType::Data,
            Self::Name(_) => PacketType::Name,
            Self::Attrs(_) => PacketType::Attrs,
        }
    }

    /// Serializes to a complete frame.
    ///
    /// `request_id` is ignored for INIT and VERSION, which carry none.
    pub fn to_frame(&self, request_id: u32) -> Vec<u8> {
        let kind = self.kind();
        let mut buf = BytesMut::with_capacity(64);

        // length is patched once the body is known
        buf.put_u32(0);
        buf.put_u8(kind as u8);
        if !kind.is_handshake() {
            buf.put_u32(request_id);
        }
        self.write_body(&mut buf);

        let length = (buf.len() - LENGTH_FIELD_LEN) as u32;
        buf[..LENGTH_FIELD_LEN].copy_from_slice(&length.to_be_bytes());
        buf.to_vec()
    }

    fn write_body(&self, buf: &mut BytesMut) {
        match self {
            Self::Init {
                version,
                extensions,
            }
            | Self::Version {
                version,
                extensions,
            } => {
                buf.put_u32(*version);
                extensions.write_pairs(buf);
            }
            Self::Open {
                path,
                pflags,
                attrs,
            } => {
                write_string(buf, path);
                buf.put_u32(pflags.bits());
                attrs.write_to(buf);
            }
            Self::Close { handle } | Self::FStat { handle } | Self::ReadDir { handle } => {
                write_bytes(buf, handle);
            }
            Self::Read {
                handle,
                offset,
                len,
            } => {
                write_bytes(buf, handle);
                buf.put_u64(*offset);
                buf.put_u32(*len);
            }
            Self::Write {
                handle,
                offset,
                data,
            } => {
                write_bytes(buf, handle);
                buf.put_u64(*offset);
                write_bytes(buf, data);
            }
            Self::LStat { path }
            | Self::OpenDir { path }
            | Self::Remove { path }
            | Self::RmDir { path }
            | Self::RealPath { path }
            | Self::Stat { path }
            | Self::ReadLink { path } => {
                write_string(buf, path);
            }
            Self::SetStat { path, attrs } | Self::MkDir { path, attrs } => {
                write_string(buf, path);
                attrs.write_to(buf);
            }
            Self::FSetStat { handle, attrs } => {
                write_bytes(buf, handle);
                attrs.write_to(buf);
            }
            Self::Rename { old_path, new_path } => {
                write_string(buf, old_path);
                write_string(buf, new_path);
            }
            Self::Symlink {
                link_path,
                target_path,
            } => {
                write_string(buf, link_path);
                write_string(buf, target_path);
            }
            Self::Status(status) => {
                buf.put_u32(status.code.as_u32());
                write_string(buf, &status.message);
                write_string(buf, &status.language_tag);
            }
            Self::Handle(handle) => write_bytes(buf, handle),
            Self::Data(data) => write_bytes(buf, data),
            Self::Name(entries) => {
                buf.put_u32(entries.len() as u32);
                for entry in entries {
                    write_string(buf, &entry.filename);
                    write_string(buf, &entry.longname);
                    entry.attrs.write_to(buf);
                }
            }
            Self::Attrs(attrs) => attrs.write_to(buf),
        }
    }

    fn read_body(kind: PacketType, r: &mut WireReader<'_>) -> Result<Self> {
        let msg = match kind {
            PacketType::Init | PacketType::Version => {
                let version = r.get_u32()?;
                let mut extensions = Extensions::new();
                while !r.is_empty() {
                    let name = r.get_string()?;
                    let value = r.get_string()?;
                    extensions.push(name, value);
                }
                if kind == PacketType::Init {
                    Self::Init {
                        version,
                        extensions,
                    }
                } else {
                    Self::Version {
                        version,
                        extensions,
                    }
                }
            }
            PacketType::Open => {
                let path = r.get_string()?;
                let pflags = OpenFlags(r.get_u32()?);
                let attrs = read_attrs(r)?;
                Self::Open {
                    path,
                    pflags,
                    attrs,
                }
            }
            PacketType::Close => Self::Close {
                handle: r.get_bytes()?,
            },
            PacketType::Read => Self::Read {
                handle: r.get_bytes()?,
                offset: r.get_u64()?,
                len: r.get_u32()?,
            },
            PacketType::Write => Self::Write {
                handle: r.get_bytes()?,
                offset: r.get_u64()?,
                data: r.get_bytes()?,
            },
            PacketType::LStat => Self::LStat {
                path: r.get_string()?,
            },
            PacketType::FStat => Self::FStat {
                handle: r.get_bytes()?,
            },
            PacketType::SetStat => Self::SetStat {
                path: r.get_string()?,
                attrs: read_attrs(r)?,
            },
            PacketType::FSetStat => Self::FSetStat {
                handle: r.get_bytes()?,
                attrs: read_attrs(r)?,
            },
            PacketType::OpenDir => Self::OpenDir {
                path: r.get_string()?,
            },
            PacketType::ReadDir => Self::ReadDir {
                handle: r.get_bytes()?,
            },
            PacketType::Remove => Self::Remove {
                path: r.get_string()?,
            },
            PacketType::MkDir => Self::MkDir {
                path: r.get_string()?,
                attrs: read_attrs(r)?,
            },
            PacketType::RmDir => Self::RmDir {
                path: r.get_string()?,
            },
            PacketType::RealPath => Self::RealPath {
                path: r.get_string()?,
            },
            PacketType::Stat => Self::Stat {
                path: r.get_string()?,
            },
            PacketType::Rename => Self::Rename {
                old_path: r.get_string()?,
                new_path: r.get_string()?,
            },
            PacketType::ReadLink => Self::ReadLink {
                path: r.get_string()?,
            },
            PacketType::Symlink => Self::Symlink {
                link_path: r.get_string()?,
                target_path: r.get_string()?,
            },
            PacketType::Status => Self::Status(Status {
                code: StatusCode::from_u32(r.get_u32()?),
                message: r.get_string()?,
                language_tag: r.get_string()?,
            }),
            PacketType::Handle => Self::Handle(r.get_bytes()?),
            PacketType::Data => Self::Data(r.get_bytes()?),
            PacketType::Name => {
                let count = r.get_u32()? as usize;
                // each entry is at least two empty strings and a flags word
                if count > r.remaining() / 12 {
                    return Err(Error::Decode(format!(
                        "NAME count {} exceeds remaining {} bytes",
                        count,
                        r.remaining()
                    )));
                }
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let filename = r.get_string_lossy()?;
                    let longname = r.get_string_lossy()?;
                    let attrs = read_attrs(r)?;
                    entries.push(DirEntry {
                        filename,
                        longname,
                        attrs,
                    });
                }
                Self::Name(entries)
            }
            PacketType::Attrs => Self::Attrs(read_attrs(r)?),
        };
        Ok(msg)
    }
}

fn read_attrs(r: &mut WireReader<'_>) -> Result<FileAttrs> {
    let (attrs, used) = FileAttrs::from_bytes(r.rest())?;
    r.advance(used)?;
    Ok(attrs)
}

/// A decoded SFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Request id; `None` only for INIT and VERSION
    pub request_id: Option<u32>,
    /// Declared length (bytes after the length field)
    pub length: u32,
    /// Packet body
    pub message: Message,
}

impl Packet {
    /// Packet kind.
    pub fn kind(&self) -> PacketType {
        self.message.kind()
    }

    /// Serializes back to a frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.message.to_frame(self.request_id.unwrap_or(0))
    }

    /// Returns the length field if `buf` starts with one.
    pub fn declared_len(buf: &[u8]) -> Option<u32> {
        let prefix: [u8; LENGTH_FIELD_LEN] = buf.get(..LENGTH_FIELD_LEN)?.try_into().ok()?;
        Some(u32::from_be_bytes(prefix))
    }

    /// Returns the full frame size if `buf` starts with a length prefix.
    ///
    /// `None` also when the size does not fit in `usize`.
    pub fn frame_len(buf: &[u8]) -> Option<usize> {
        let declared = usize::try_from(Self::declared_len(buf)?).ok()?;
        declared.checked_add(LENGTH_FIELD_LEN)
    }

    /// Parses one complete frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Framing`] if the frame is shorter than [`MIN_PACKET_LEN`] or
    ///   the length field disagrees with the bytes present
    /// - [`Error::Decode`] for unknown kinds, truncated fields or trailing bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_PACKET_LEN {
            return Err(Error::Framing(format!(
                "SFTP packet too short: {} bytes (minimum {})",
                data.len(),
                MIN_PACKET_LEN
            )));
        }

        let mut r = WireReader::new(data);
        let length = r.get_u32()?;
        if length as usize != r.remaining() {
            return Err(Error::Framing(format!(
                "SFTP packet length field says {} bytes, {} present",
                length,
                r.remaining()
            )));
        }

        let type_byte = r.get_u8()?;
        let kind = PacketType::from_u8(type_byte)
            .ok_or_else(|| Error::Decode(format!("Unknown SFTP packet type: {}", type_byte)))?;

        let request_id = if kind.is_handshake() {
            None
        } else {
            Some(r.get_u32()?)
        };

        let message = Message::read_body(kind, &mut r)?;

        if !r.is_empty() {
            return Err(Error::Decode(format!(
                "{} bytes left over after {}",
                r.remaining(),
                kind
            )));
        }

        Ok(Self {
            request_id,
            length,
            message,
        })
    }
}
