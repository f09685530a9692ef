//! SFTP file attributes (`ATTRS`).
//!
//! # Format
//!
//! ```text
//! uint32   flags
//! uint64   size            present only if flag SSH_FILEXFER_ATTR_SIZE
//! uint32   uid             present only if flag SSH_FILEXFER_ATTR_UIDGID
//! uint32   gid             present only if flag SSH_FILEXFER_ATTR_UIDGID
//! uint32   permissions     present only if flag SSH_FILEXFER_ATTR_PERMISSIONS
//! uint32   atime           present only if flag SSH_FILEXFER_ATTR_ACMODTIME
//! uint32   mtime           present only if flag SSH_FILEXFER_ATTR_ACMODTIME
//! uint32   extended_count  present only if flag SSH_FILEXFER_ATTR_EXTENDED
//! string   extended_type   } repeated extended_count times
//! string   extended_data   }
//! ```
//!
//! The field order is part of the wire contract.

use super::wire::{write_string, WireReader};
use bytes::{BufMut, BytesMut};
use sftpkit_platform::{Error, Result};
use std::fmt;
use std::slice;

/// File attribute flags (SSH_FILEXFER_ATTR_*).
#[derive(Debug, Clone, Copy)]
pub struct AttrFlags(pub u32);

impl AttrFlags {
    /// SSH_FILEXFER_ATTR_SIZE
    pub const SIZE: u32 = 0x00000001;
    /// SSH_FILEXFER_ATTR_UIDGID
    pub const UIDGID: u32 = 0x00000002;
    /// SSH_FILEXFER_ATTR_PERMISSIONS
    pub const PERMISSIONS: u32 = 0x00000004;
    /// SSH_FILEXFER_ATTR_ACMODTIME
    pub const ACMODTIME: u32 = 0x00000008;
    /// SSH_FILEXFER_ATTR_EXTENDED
    pub const EXTENDED: u32 = 0x80000000;

    /// Every flag understood by protocol version 3.
    pub const ALL: u32 =
        Self::SIZE | Self::UIDGID | Self::PERMISSIONS | Self::ACMODTIME | Self::EXTENDED;
}

/// Name/value string pairs.
///
/// Used both for the extensions a server announces in its VERSION packet and
/// for the extended block of [`FileAttrs`]. Pairs keep their wire order and
/// repeated names are kept, so a decoded block re-encodes with the same count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extensions(Vec<(String, String)>);

impl Extensions {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first pair with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// True if the named extension is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Appends a pair.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates pairs in wire order.
    pub fn iter(&self) -> slice::Iter<'_, (String, String)> {
        self.0.iter()
    }

    pub(crate) fn write_pairs(&self, buf: &mut BytesMut) {
        for (name, value) in &self.0 {
            write_string(buf, name);
            write_string(buf, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Extensions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Extensions {
    type Item = &'a (String, String);
    type IntoIter = slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// File type derived from the POSIX `S_IFMT` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Block device
    BlockDevice,
    /// Character device
    CharDevice,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// Unknown type
    Unknown,
}

/// File mode (permissions).
///
/// A read-only projection of the low 16 bits of the `permissions` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl FileMode {
    /// POSIX file type mask
    pub const S_IFMT: u32 = 0o170000;
    /// Socket
    pub const S_IFSOCK: u32 = 0o140000;
    /// Symbolic link
    pub const S_IFLNK: u32 = 0o120000;
    /// Regular file
    pub const S_IFREG: u32 = 0o100000;
    /// Block device
    pub const S_IFBLK: u32 = 0o060000;
    /// Directory
    pub const S_IFDIR: u32 = 0o040000;
    /// Character device
    pub const S_IFCHR: u32 = 0o020000;
    /// FIFO
    pub const S_IFIFO: u32 = 0o010000;

    /// Set user id on execution
    pub const SETUID: u32 = 0o4000;
    /// Set group id on execution
    pub const SETGID: u32 = 0o2000;
    /// Sticky bit
    pub const STICKY: u32 = 0o1000;

    /// Owner read
    pub const USER_READ: u32 = 0o400;
    /// Owner write
    pub const USER_WRITE: u32 = 0o200;
    /// Owner execute
    pub const USER_EXEC: u32 = 0o100;
    /// Group read
    pub const GROUP_READ: u32 = 0o040;
    /// Group write
    pub const GROUP_WRITE: u32 = 0o020;
    /// Group execute
    pub const GROUP_EXEC: u32 = 0o010;
    /// Others read
    pub const OTHER_READ: u32 = 0o004;
    /// Others write
    pub const OTHER_WRITE: u32 = 0o002;
    /// Others execute
    pub const OTHER_EXEC: u32 = 0o001;

    /// Default file permissions (0644 = rw-r--r--)
    pub const DEFAULT_FILE: u32 = 0o644;
    /// Default directory permissions (0755 = rwxr-xr-x)
    pub const DEFAULT_DIR: u32 = 0o755;

    fn bits(&self) -> u32 {
        self.0 & 0xffff
    }

    /// Returns the file type.
    pub fn file_type(&self) -> FileType {
        match self.bits() & Self::S_IFMT {
            Self::S_IFREG => FileType::Regular,
            Self::S_IFDIR => FileType::Directory,
            Self::S_IFLNK => FileType::Symlink,
            Self::S_IFBLK => FileType::BlockDevice,
            Self::S_IFCHR => FileType::CharDevice,
            Self::S_IFIFO => FileType::Fifo,
            Self::S_IFSOCK => FileType::Socket,
            _ => FileType::Unknown,
        }
    }

    /// Permission bits (`rwxrwxrwx`) without type or special bits.
    pub fn permissions(&self) -> u32 {
        self.bits() & 0o777
    }

    /// True if the setuid bit is set.
    pub fn is_setuid(&self) -> bool {
        self.bits() & Self::SETUID != 0
    }

    /// True if the setgid bit is set.
    pub fn is_setgid(&self) -> bool {
        self.bits() & Self::SETGID != 0
    }

    /// True if the sticky bit is set.
    pub fn is_sticky(&self) -> bool {
        self.bits() & Self::STICKY != 0
    }
}

impl fmt::Display for FileMode {
    /// Renders the mode the way `ls -l` does, e.g. `drwxr-xr-x`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.file_type() {
            FileType::Regular => '-',
            FileType::Directory => 'd',
            FileType::Symlink => 'l',
            FileType::BlockDevice => 'b',
            FileType::CharDevice => 'c',
            FileType::Fifo => 'p',
            FileType::Socket => 's',
            FileType::Unknown => '?',
        };
        let bits = self.bits();
        let flag = |mask: u32, c: char| if bits & mask != 0 { c } else { '-' };
        let exec = |mask: u32, special: bool, set: char, unset: char| {
            match (bits & mask != 0, special) {
                (true, true) => set,
                (false, true) => unset,
                (true, false) => 'x',
                (false, false) => '-',
            }
        };

        let s: String = [
            kind,
            flag(Self::USER_READ, 'r'),
            flag(Self::USER_WRITE, 'w'),
            exec(Self::USER_EXEC, self.is_setuid(), 's', 'S'),
            flag(Self::GROUP_READ, 'r'),
            flag(Self::GROUP_WRITE, 'w'),
            exec(Self::GROUP_EXEC, self.is_setgid(), 's', 'S'),
            flag(Self::OTHER_READ, 'r'),
            flag(Self::OTHER_WRITE, 'w'),
            exec(Self::OTHER_EXEC, self.is_sticky(), 't', 'T'),
        ]
        .iter()
        .collect();
        f.write_str(&s)
    }
}

/// File attributes.
///
/// A field is only ever encoded when its flag bit is set, and the setters are
/// the only way to populate a field, so flags and contents cannot disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileAttrs {
    flags: u32,
    size: u64,
    uid: u32,
    gid: u32,
    permissions: u32,
    atime: u32,
    mtime: u32,
    extended: Extensions,
}

impl FileAttrs {
    /// Creates empty attributes (no flags set).
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence bitmask.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// True if no attribute is present.
    pub fn is_empty(&self) -> bool {
        self.flags == 0
    }

    /// File size in bytes.
    pub fn size(&self) -> Option<u64> {
        (self.flags & AttrFlags::SIZE != 0).then_some(self.size)
    }

    /// Owner and group ids.
    pub fn uid_gid(&self) -> Option<(u32, u32)> {
        (self.flags & AttrFlags::UIDGID != 0).then_some((self.uid, self.gid))
    }

    /// Raw permission bits as sent by the server.
    pub fn permissions(&self) -> Option<u32> {
        (self.flags & AttrFlags::PERMISSIONS != 0).then_some(self.permissions)
    }

    /// Access and modification times (Unix seconds).
    pub fn times(&self) -> Option<(u32, u32)> {
        (self.flags & AttrFlags::ACMODTIME != 0).then_some((self.atime, self.mtime))
    }

    /// Modification time (Unix seconds).
    pub fn mtime(&self) -> Option<u32> {
        self.times().map(|(_, mtime)| mtime)
    }

    /// Extended name/value pairs; empty unless the EXTENDED flag is set.
    pub fn extended(&self) -> &Extensions {
        &self.extended
    }

    /// Portable view of the permission bits.
    pub fn mode(&self) -> Option<FileMode> {
        self.permissions().map(FileMode)
    }

    /// File type, if permissions are present.
    pub fn file_type(&self) -> Option<FileType> {
        self.mode().map(|m| m.file_type())
    }

    /// True if the permissions mark a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }

    /// True if the permissions mark a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type() == Some(FileType::Regular)
    }

    /// True if the permissions mark a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.file_type() == Some(FileType::Symlink)
    }

    /// Sets the size.
    pub fn set_size(&mut self, size: u64) -> &mut Self {
        self.size = size;
        self.flags |= AttrFlags::SIZE;
        self
    }

    /// Sets owner and group ids.
    pub fn set_uid_gid(&mut self, uid: u32, gid: u32) -> &mut Self {
        self.uid = uid;
        self.gid = gid;
        self.flags |= AttrFlags::UIDGID;
        self
    }

    /// Sets permission bits.
    pub fn set_permissions(&mut self, permissions: u32) -> &mut Self {
        self.permissions = permissions;
        self.flags |= AttrFlags::PERMISSIONS;
        self
    }

    /// Sets access and modification times.
    pub fn set_times(&mut self, atime: u32, mtime: u32) -> &mut Self {
        self.atime = atime;
        self.mtime = mtime;
        self.flags |= AttrFlags::ACMODTIME;
        self
    }

    /// Adds one extended pair.
    pub fn add_extended(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.extended.push(name, value);
        self.flags |= AttrFlags::EXTENDED;
        self
    }

    /// Builds attributes from local file metadata.
    ///
    /// Size and times are always taken; mode and ownership only where the
    /// platform exposes them.
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mut attrs = Self::new();
        attrs.set_size(meta.len());

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            attrs.set_uid_gid(meta.uid(), meta.gid());
            attrs.set_permissions(meta.mode());
        }
        #[cfg(not(unix))]
        {
            let mode = if meta.is_dir() {
                FileMode::S_IFDIR | FileMode::DEFAULT_DIR
            } else {
                FileMode::S_IFREG | FileMode::DEFAULT_FILE
            };
            attrs.set_permissions(mode);
        }

        let unix_secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as u32)
        };
        if let Some(mtime) = unix_secs(meta.modified()) {
            let atime = unix_secs(meta.accessed()).unwrap_or(mtime);
            attrs.set_times(atime, mtime);
        }

        attrs
    }

    /// Serializes into `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u32(self.flags);

        if self.flags & AttrFlags::SIZE != 0 {
            buf.put_u64(self.size);
        }
        if self.flags & AttrFlags::UIDGID != 0 {
            buf.put_u32(self.uid);
            buf.put_u32(self.gid);
        }
        if self.flags & AttrFlags::PERMISSIONS != 0 {
            buf.put_u32(self.permissions);
        }
        if self.flags & AttrFlags::ACMODTIME != 0 {
            buf.put_u32(self.atime);
            buf.put_u32(self.mtime);
        }
        if self.flags & AttrFlags::EXTENDED != 0 {
            buf.put_u32(self.extended.len() as u32);
            self.extended.write_pairs(buf);
        }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Parses from bytes.
    ///
    /// Returns the attributes and the number of bytes consumed, so callers can
    /// keep parsing whatever follows (NAME responses embed one block per entry).
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = WireReader::new(data);
        let flags = reader.get_u32()?;

        // an unknown bit may announce a field of unknown size; skipping it
        // would misparse everything after this block
        if flags & !AttrFlags::ALL != 0 {
            return Err(Error::Decode(format!(
                "Unknown attribute flags 0x{:08x}",
                flags & !AttrFlags::ALL
            )));
        }

        let mut attrs = Self::new();

        if flags & AttrFlags::SIZE != 0 {
            attrs.set_size(reader.get_u64()?);
        }
        if flags & AttrFlags::UIDGID != 0 {
            let uid = reader.get_u32()?;
            let gid = reader.get_u32()?;
            attrs.set_uid_gid(uid, gid);
        }
        if flags & AttrFlags::PERMISSIONS != 0 {
            attrs.set_permissions(reader.get_u32()?);
        }
        if flags & AttrFlags::ACMODTIME != 0 {
            let atime = reader.get_u32()?;
            let mtime = reader.get_u32()?;
            attrs.set_times(atime, mtime);
        }
        if flags & AttrFlags::EXTENDED != 0 {
            let count = reader.get_u32()?;
            // an EXTENDED flag with zero pairs still round-trips
            attrs.flags |= AttrFlags::EXTENDED;
            for _ in 0..count {
                let name = reader.get_string()?;
                let value = reader.get_string()?;
                attrs.add_extended(name, value);
            }
        }

        Ok((attrs, reader.consumed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_attrs_is_just_flags() {
        let attrs = FileAttrs::new();
        assert_eq!(attrs.to_bytes(), vec![0, 0, 0, 0]);
        let (parsed, used) = FileAttrs::from_bytes(&[0, 0, 0, 0, 0xaa]).unwrap();
        assert_eq!(parsed, attrs);
        assert_eq!(used, 4);
    }

    #[test]
    fn test_setters_set_flags() {
        let mut attrs = FileAttrs::new();
        attrs.set_size(1024).set_permissions(0o100644);
        assert_eq!(attrs.flags(), AttrFlags::SIZE | AttrFlags::PERMISSIONS);
        assert_eq!(attrs.size(), Some(1024));
        assert_eq!(attrs.uid_gid(), None);
        assert!(attrs.is_file());
    }

    #[test]
    fn test_field_order_on_wire() {
        let mut attrs = FileAttrs::new();
        attrs
            .set_times(10, 20)
            .set_permissions(0o755)
            .set_uid_gid(1000, 100)
            .set_size(5);

        let bytes = attrs.to_bytes();
        assert_eq!(
            bytes,
            vec![
                0, 0, 0, 0x0f, // flags
                0, 0, 0, 0, 0, 0, 0, 5, // size
                0, 0, 0x03, 0xe8, 0, 0, 0, 100, // uid, gid
                0, 0, 0x01, 0xed, // permissions
                0, 0, 0, 10, 0, 0, 0, 20, // atime, mtime
            ]
        );
    }

    #[test]
    fn test_extended_roundtrip_reports_consumed() {
        let mut attrs = FileAttrs::new();
        attrs.set_size(1).add_extended("acl@example.com", "rw");

        let mut bytes = attrs.to_bytes();
        let len = bytes.len();
        bytes.extend_from_slice(b"trailing");

        let (parsed, used) = FileAttrs::from_bytes(&bytes).unwrap();
        assert_eq!(used, len);
        assert_eq!(parsed, attrs);
        assert_eq!(parsed.extended().get("acl@example.com"), Some("rw"));
    }

    #[test]
    fn test_duplicate_extension_names_kept() {
        // flags = EXTENDED, two pairs both named "x"
        let mut bytes = vec![0x80, 0, 0, 0, 0, 0, 0, 2];
        for value in [b"1", b"2"] {
            bytes.extend_from_slice(&[0, 0, 0, 1, b'x', 0, 0, 0, 1]);
            bytes.extend_from_slice(value);
        }

        let (parsed, used) = FileAttrs::from_bytes(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(parsed.extended().len(), 2);
        assert_eq!(parsed.extended().get("x"), Some("1"));
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_truncated_attrs_rejected() {
        // SIZE flag without the 8 size bytes
        assert!(FileAttrs::from_bytes(&[0, 0, 0, 1, 0, 0]).is_err());
        assert!(FileAttrs::from_bytes(&[0, 0]).is_err());
    }

    #[test]
    fn test_unknown_flags_rejected() {
        let err = FileAttrs::from_bytes(&[0, 0, 0, 0x10, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_file_mode_projection() {
        let dir = FileMode(0o040755);
        assert_eq!(dir.file_type(), FileType::Directory);
        assert_eq!(dir.permissions(), 0o755);
        assert_eq!(dir.to_string(), "drwxr-xr-x");

        let tmp = FileMode(0o041777);
        assert!(tmp.is_sticky());
        assert_eq!(tmp.to_string(), "drwxrwxrwt");

        let suid = FileMode(0o104755);
        assert!(suid.is_setuid());
        assert!(!suid.is_setgid());
        assert_eq!(suid.to_string(), "-rwsr-xr-x");

        assert_eq!(FileMode(0o120777).file_type(), FileType::Symlink);
        assert_eq!(FileMode(0o010644).file_type(), FileType::Fifo);
        assert_eq!(FileMode(0o140755).file_type(), FileType::Socket);
        assert_eq!(FileMode(0o060660).file_type(), FileType::BlockDevice);
        assert_eq!(FileMode(0o020620).file_type(), FileType::CharDevice);
        assert_eq!(FileMode(0o644).file_type(), FileType::Unknown);
    }

    #[test]
    fn test_from_metadata() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"12345").unwrap();
        let meta = std::fs::metadata(file.path()).unwrap();

        let attrs = FileAttrs::from_metadata(&meta);
        assert_eq!(attrs.size(), Some(5));
        assert!(attrs.is_file());
        assert!(attrs.mtime().is_some());
    }
}
