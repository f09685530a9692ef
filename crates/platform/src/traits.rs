//! Core traits shared by sftpkit components

use crate::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Ordered, reliable duplex byte stream.
///
/// Anything that can be read from and written to asynchronously qualifies:
/// an SSH session channel, a pipe pair, or `tokio::io::duplex` in tests.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A secure channel able to start a named subsystem.
///
/// The SSH transport and authentication live outside this workspace; they
/// only need to hand back a byte stream once the subsystem is running.
#[async_trait::async_trait]
pub trait SubsystemChannel: Send {
    /// Stream produced once the subsystem has been accepted
    type Stream: ByteStream;

    /// Request the given subsystem (e.g. "sftp") on this channel
    ///
    /// # Errors
    ///
    /// Returns an error if the peer refuses the request or the channel fails
    async fn request_subsystem(&mut self, name: &str) -> Result<Self::Stream>;
}
