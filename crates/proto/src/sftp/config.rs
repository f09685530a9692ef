//! SFTP client configuration
//!
//! Provides the configuration structure and builder for [`SftpClient`](super::SftpClient).

use sftpkit_platform::{Error, Result};

/// Default cap for a single READ request.
///
/// Kept below the 32 KiB packet limit most SSH channels advertise.
pub const DEFAULT_MAX_READ_SIZE: u32 = 32_000;

/// Default chunk size for uploads.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 32_000;

/// Default limit for inbound frames.
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 256 * 1024;

/// Bytes of an SSH_FXP_DATA frame that are not data:
/// length + type + request id + string length.
pub const DATA_HEADER_LEN: u32 = 4 + 1 + 4 + 4;

/// Client configuration for SFTP sessions
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SftpConfig {
    /// Largest `len` sent in a READ request
    pub max_read_size: u32,

    /// Chunk size used by uploads
    pub write_chunk_size: usize,

    /// Largest inbound frame accepted (bytes after the length field)
    pub max_packet_size: u32,

    /// Reject responses whose request id differs from the request sent.
    ///
    /// Off by default: responses are assumed to arrive in request order and
    /// ids are not compared.
    pub verify_request_ids: bool,

    /// First request id; `None` seeds from the current Unix time
    pub initial_request_id: Option<u32>,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            max_read_size: DEFAULT_MAX_READ_SIZE,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            verify_request_ids: false,
            initial_request_id: None,
        }
    }
}

impl SftpConfig {
    /// Create builder for client configuration
    pub fn builder() -> SftpConfigBuilder {
        SftpConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_read_size == 0 {
            return Err(Error::Config("max_read_size cannot be zero".into()));
        }
        if self.write_chunk_size == 0 {
            return Err(Error::Config("write_chunk_size cannot be zero".into()));
        }
        if self.max_packet_size < DATA_HEADER_LEN {
            return Err(Error::Config(format!(
                "max_packet_size must be at least {} bytes",
                DATA_HEADER_LEN
            )));
        }
        if self.max_read_size > self.max_packet_size - DATA_HEADER_LEN {
            return Err(Error::Config(format!(
                "max_read_size {} does not fit in max_packet_size {}",
                self.max_read_size, self.max_packet_size
            )));
        }
        Ok(())
    }
}

/// Builder for SftpConfig
#[derive(Default)]
pub struct SftpConfigBuilder {
    max_read_size: Option<u32>,
    write_chunk_size: Option<usize>,
    max_packet_size: Option<u32>,
    verify_request_ids: Option<bool>,
    initial_request_id: Option<u32>,
}

impl SftpConfigBuilder {
    /// Create new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the READ request cap
    pub fn with_max_read_size(mut self, size: u32) -> Self {
        self.max_read_size = Some(size);
        self
    }

    /// Set the upload chunk size
    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = Some(size);
        self
    }

    /// Set the inbound frame limit
    pub fn with_max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = Some(size);
        self
    }

    /// Enable or disable response id verification
    pub fn with_verify_request_ids(mut self, verify: bool) -> Self {
        self.verify_request_ids = Some(verify);
        self
    }

    /// Set the first request id
    pub fn with_initial_request_id(mut self, id: u32) -> Self {
        self.initial_request_id = Some(id);
        self
    }

    /// Build and validate configuration
    pub fn build(self) -> Result<SftpConfig> {
        let defaults = SftpConfig::default();
        let config = SftpConfig {
            max_read_size: self.max_read_size.unwrap_or(defaults.max_read_size),
            write_chunk_size: self.write_chunk_size.unwrap_or(defaults.write_chunk_size),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            verify_request_ids: self
                .verify_request_ids
                .unwrap_or(defaults.verify_request_ids),
            initial_request_id: self.initial_request_id,
        };

        config.validate()?;
        Ok(config)
    }
}
