//! Primitive SFTP wire encoding.
//!
//! All integers are big-endian. Strings are `uint32 length || bytes` with no
//! terminator.

use bytes::{Buf, BufMut, BytesMut};
use sftpkit_platform::{Error, Result};

/// Writes a length-prefixed UTF-8 string.
pub(crate) fn write_string(buf: &mut BytesMut, s: &str) {
    write_bytes(buf, s.as_bytes());
}

/// Writes a length-prefixed byte string.
pub(crate) fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Cursor over a packet body.
///
/// Every getter checks the remaining length first so truncated input becomes
/// a [`Error::Decode`] rather than a panic.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, consumed: 0 }
    }

    /// Bytes read so far.
    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::Decode(format!(
                "Cannot read {} at offset {}: need {} bytes, have {}",
                what,
                self.consumed,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8> {
        self.need(1, "byte")?;
        self.consumed += 1;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32> {
        self.need(4, "uint32")?;
        self.consumed += 4;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn get_u64(&mut self) -> Result<u64> {
        self.need(8, "uint64")?;
        self.consumed += 8;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        self.need(len, "string body")?;
        let bytes = self.buf[..len].to_vec();
        self.buf.advance(len);
        self.consumed += len;
        Ok(bytes)
    }

    pub(crate) fn get_string(&mut self) -> Result<String> {
        let offset = self.consumed;
        String::from_utf8(self.get_bytes()?).map_err(|_| {
            Error::Decode(format!("String at offset {} contains invalid UTF-8", offset))
        })
    }

    /// Reads a string that is only displayed, replacing invalid UTF-8.
    ///
    /// v3 file names are raw bytes in the server's encoding.
    pub(crate) fn get_string_lossy(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Skips bytes already parsed by a nested decoder.
    pub(crate) fn advance(&mut self, n: usize) -> Result<()> {
        self.need(n, "nested field")?;
        self.buf.advance(n);
        self.consumed += n;
        Ok(())
    }

    /// Unread tail, for nested decoders that report their own length.
    pub(crate) fn rest(&self) -> &'a [u8] {
        self.buf
    }
}
