//! Structured logging for SFTP operations
//!
//! Provides structured, contextual logging using the `tracing` framework.
//!
//! # Log Levels
//!
//! - **TRACE**: Raw frame sizes
//! - **DEBUG**: Every request/response pair
//! - **INFO**: Handshake and completed transfers
//! - **WARN**: Best-effort cleanup that failed, sessions closed after a failure
//!
//! # Example
//!
//! ```no_run
//! use sftpkit_proto::sftp::logging;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("sftpkit_proto::sftp=debug")
//!     .init();
//!
//! logging::log_handshake_complete(3, 2);
//! ```

use super::message::PacketType;
use tracing::{debug, info, trace, warn};

/// Log an outgoing request
pub fn log_request(request_id: u32, kind: PacketType, frame_len: usize) {
    debug!(
        request_id = request_id,
        kind = kind.name(),
        frame_len = frame_len,
        "SFTP request sent"
    );
}

/// Log a decoded response
pub fn log_response(request_id: Option<u32>, kind: PacketType, frame_len: usize) {
    debug!(
        request_id = ?request_id,
        kind = kind.name(),
        frame_len = frame_len,
        "SFTP response received"
    );
}

/// Log a partial read while a frame is being accumulated
pub fn log_partial_frame(have: usize, need: Option<usize>) {
    trace!(have = have, need = ?need, "Waiting for rest of SFTP frame");
}

/// Log successful version negotiation
///
/// # Arguments
///
/// * `version` - Version announced by the server
/// * `extensions` - Number of server extensions
pub fn log_handshake_complete(version: u32, extensions: usize) {
    info!(
        version = version,
        extensions = extensions,
        "SFTP protocol initialized"
    );
}

/// Log a handle being opened
pub fn log_handle_opened(op: &str, path: &str, handle: &[u8]) {
    debug!(
        op = op,
        path = path,
        handle = %hex::encode(handle),
        "SFTP handle opened"
    );
}

/// Log a completed transfer
///
/// # Arguments
///
/// * `direction` - "download" or "upload"
/// * `remote` - Remote path
/// * `bytes` - Bytes transferred
pub fn log_transfer_complete(direction: &str, remote: &str, bytes: u64) {
    info!(
        direction = direction,
        remote = remote,
        bytes = bytes,
        "SFTP transfer complete"
    );
}

/// Log a session closed because its stream can no longer be trusted
pub fn log_session_closed(reason: &str) {
    warn!(reason = reason, "SFTP session closed after failed round trip");
}

/// Log a failed best-effort cleanup (e.g. closing a handle after an error)
pub fn log_cleanup_failed(op: &str, path: &str, error: &str) {
    warn!(op = op, path = path, error = error, "SFTP cleanup failed");
}
