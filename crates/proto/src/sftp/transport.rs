//! SFTP packet transport.
//!
//! Owns the duplex byte stream and the request id counter and turns "write a
//! request, wait for the reply" into one call. Only one request is ever in
//! flight: the reply read after a write is taken to be the answer to that
//! write. Response ids are compared only when
//! [`SftpConfig::verify_request_ids`] is set.

use super::config::SftpConfig;
use super::logging;
use super::message::{Message, Packet};
use bytes::BytesMut;
use sftpkit_platform::{ByteStream, Error, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const READ_CHUNK: usize = 8 * 1024;

/// Framed request/response transport over a byte stream.
pub struct SftpTransport<S> {
    stream: S,
    read_buf: BytesMut,
    next_request_id: u32,
    max_packet_size: u32,
    verify_request_ids: bool,
}

impl<S: ByteStream> SftpTransport<S> {
    /// Wraps a stream on which the "sftp" subsystem is already running.
    pub fn new(stream: S, config: &SftpConfig) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            next_request_id: config.initial_request_id.unwrap_or_else(seed_request_id),
            max_packet_size: config.max_packet_size,
            verify_request_ids: config.verify_request_ids,
        }
    }

    /// Gets the next request ID.
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// Sends one message and waits for the next packet from the server.
    ///
    /// The whole frame is written before reading; a short write is an error.
    pub async fn send(&mut self, message: &Message) -> Result<Packet> {
        let kind = message.kind();
        let request_id = if kind.is_handshake() {
            0
        } else {
            self.next_request_id()
        };

        let frame = message.to_frame(request_id);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        logging::log_request(request_id, kind, frame.len());

        let packet = self.read_packet().await?;

        if self.verify_request_ids && !kind.is_handshake() {
            if let Some(got) = packet.request_id {
                if got != request_id {
                    return Err(Error::RequestIdMismatch {
                        expected: request_id,
                        got,
                    });
                }
            }
        }

        Ok(packet)
    }

    /// Reads exactly one packet, accumulating partial reads.
    ///
    /// A frame larger than the configured limit is a framing error and the
    /// buffered input is discarded: the stream cannot be resynchronized.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            let mut need = None;
            if let Some(declared) = Packet::declared_len(&self.read_buf) {
                if declared > self.max_packet_size {
                    self.read_buf.clear();
                    return Err(Error::Framing(format!(
                        "SFTP packet of {} bytes exceeds limit {}",
                        declared, self.max_packet_size
                    )));
                }
                let total = Packet::frame_len(&self.read_buf).ok_or_else(|| {
                    Error::Framing(format!("SFTP packet of {} bytes is too large", declared))
                })?;
                if self.read_buf.len() >= total {
                    let frame = self.read_buf.split_to(total);
                    let packet = Packet::from_bytes(&frame)?;
                    logging::log_response(packet.request_id, packet.kind(), frame.len());
                    return Ok(packet);
                }
                self.read_buf.reserve(total - self.read_buf.len());
                need = Some(total);
            } else {
                self.read_buf.reserve(READ_CHUNK);
            }

            logging::log_partial_frame(self.read_buf.len(), need);
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ChannelClosed);
            }
        }
    }

    /// Shuts down the write half, releasing the subsystem channel.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn seed_request_id() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(1)
}
