//! SFTP client implementation.

use super::attrs::{Extensions, FileAttrs};
use super::config::SftpConfig;
use super::logging;
use super::message::{Message, Packet, PacketType, SFTP_VERSION};
use super::transport::SftpTransport;
use super::types::{DirEntry, FileHandle, Metadata, OpenFlags, Status};
use sftpkit_platform::{ByteStream, Error, ErrorKind, Result, StatusCode, SubsystemChannel};
use std::fmt;
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::debug;

/// Subsystem name requested on the SSH channel.
pub const SFTP_SUBSYSTEM: &str = "sftp";

/// SFTP session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stream attached, INIT not sent yet
    Unconnected,
    /// INIT sent, waiting for VERSION
    Initializing,
    /// Version agreed, requests allowed
    Ready,
    /// Closed by the caller, after a failed handshake, or after a round trip
    /// that left the stream out of step
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconnected => "unconnected",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What the server announced in its VERSION packet.
#[derive(Debug, Clone)]
struct ServerInfo {
    version: u32,
    extensions: Extensions,
}

struct Session<S> {
    transport: SftpTransport<S>,
    state: SessionState,
    /// Set while a request is written but its reply not yet read
    in_flight: bool,
    /// Stream already shut down
    released: bool,
}

impl<S> Session<S> {
    /// A caller dropped mid round trip (e.g. by a timeout) leaves its reply
    /// on the stream, so the session can no longer pair replies correctly.
    fn close_if_abandoned(&mut self) {
        if self.in_flight {
            self.in_flight = false;
            self.state = SessionState::Closed;
            logging::log_session_closed("request abandoned before its reply was read");
        }
    }

    fn begin(&mut self, op: &'static str, allowed: SessionState) -> Result<()> {
        self.close_if_abandoned();
        if self.state != allowed {
            return Err(Error::InvalidState {
                op,
                state: self.state.to_string(),
            });
        }
        self.in_flight = true;
        Ok(())
    }

    fn finish(&mut self, outcome: &Result<Packet>) {
        self.in_flight = false;
        if let Err(e) = outcome {
            if matches!(e.kind(), ErrorKind::Transport | ErrorKind::Framing) {
                self.state = SessionState::Closed;
                logging::log_session_closed(&e.to_string());
            }
        }
    }
}

/// SFTP client.
///
/// All methods take `&self`; the stream and request id counter sit behind one
/// async mutex held for a full request/response round trip, so the client can
/// be shared (e.g. in an `Arc`) and concurrent callers are serialized.
pub struct SftpClient<S> {
    session: Mutex<Session<S>>,
    server: OnceLock<ServerInfo>,
    config: SftpConfig,
}

impl<S: ByteStream> SftpClient<S> {
    /// Creates an unconnected client on a stream running the "sftp" subsystem.
    ///
    /// Call [`init`](Self::init) before anything else, or use
    /// [`connect`](Self::connect) which does both.
    pub fn new(stream: S, config: SftpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session: Mutex::new(Session {
                transport: SftpTransport::new(stream, &config),
                state: SessionState::Unconnected,
                in_flight: false,
                released: false,
            }),
            server: OnceLock::new(),
            config,
        })
    }

    /// Creates a client and performs the version handshake.
    pub async fn connect(stream: S, config: SftpConfig) -> Result<Self> {
        let client = Self::new(stream, config)?;
        client.init().await?;
        Ok(client)
    }

    /// Requests the "sftp" subsystem on `channel` and connects over it.
    pub async fn from_channel<C>(channel: &mut C, config: SftpConfig) -> Result<Self>
    where
        C: SubsystemChannel<Stream = S>,
    {
        debug!("Requesting {} subsystem", SFTP_SUBSYSTEM);
        let stream = channel.request_subsystem(SFTP_SUBSYSTEM).await?;
        Self::connect(stream, config).await
    }

    /// Initialize SFTP protocol (send SSH_FXP_INIT, receive SSH_FXP_VERSION).
    ///
    /// Any version other than 3 fails the handshake and closes the session
    /// for good.
    pub async fn init(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.begin("init", SessionState::Unconnected)?;

        debug!("Initializing SFTP protocol");
        session.state = SessionState::Initializing;

        let init = Message::Init {
            version: SFTP_VERSION,
            extensions: Extensions::new(),
        };
        let sent = session.transport.send(&init).await;
        session.finish(&sent);
        let outcome = match sent {
            Ok(packet) => match packet.message {
                Message::Version {
                    version,
                    extensions,
                } if version == SFTP_VERSION => Ok(ServerInfo {
                    version,
                    extensions,
                }),
                Message::Version { version, .. } => Err(Error::VersionMismatch {
                    expected: SFTP_VERSION,
                    got: version,
                }),
                other => Err(unexpected("init", PacketType::Version.name(), &other)),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(info) => {
                logging::log_handshake_complete(info.version, info.extensions.len());
                // init only runs once per client, so the cell is empty here
                let _ = self.server.set(info);
                session.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                session.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        let mut session = self.session.lock().await;
        session.close_if_abandoned();
        session.state
    }

    /// Protocol version agreed with the server, once ready.
    pub fn version(&self) -> Option<u32> {
        self.server.get().map(|info| info.version)
    }

    /// Extensions announced by the server, once ready.
    pub fn extensions(&self) -> Option<&Extensions> {
        self.server.get().map(|info| &info.extensions)
    }

    /// Client configuration.
    pub fn config(&self) -> &SftpConfig {
        &self.config
    }

    /// Closes the session and shuts the stream down.
    ///
    /// Also releases the stream of a session that was closed by a failure.
    /// Calling it again is a no-op.
    pub async fn close_session(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.state = SessionState::Closed;
        session.in_flight = false;
        if session.released {
            return Ok(());
        }
        session.released = true;
        debug!("Closing SFTP session");
        session.transport.shutdown().await
    }

    /// Sends one request on a ready session and returns the reply body.
    ///
    /// Transport and framing failures, and callers dropped before the reply
    /// arrived, leave the stream out of step and close the session.
    async fn request(&self, op: &'static str, message: Message) -> Result<Message> {
        let mut session = self.session.lock().await;
        session.begin(op, SessionState::Ready)?;
        let sent = session.transport.send(&message).await;
        session.finish(&sent);
        Ok(sent?.message)
    }

    /// Request whose only successful reply is SSH_FX_OK.
    async fn request_ok(&self, op: &'static str, message: Message) -> Result<()> {
        match self.request(op, message).await? {
            Message::Status(status) => status.into_result(op),
            other => Err(unexpected(op, PacketType::Status.name(), &other)),
        }
    }

    async fn request_handle(
        &self,
        op: &'static str,
        path: &str,
        message: Message,
    ) -> Result<FileHandle> {
        match self.request(op, message).await? {
            Message::Handle(handle) => {
                logging::log_handle_opened(op, path, &handle);
                Ok(FileHandle::new(handle, path))
            }
            Message::Status(status) => Err(status_error(op, PacketType::Handle.name(), status)),
            other => Err(unexpected(op, PacketType::Handle.name(), &other)),
        }
    }

    async fn request_attrs(
        &self,
        op: &'static str,
        name: &str,
        message: Message,
    ) -> Result<Metadata> {
        match self.request(op, message).await? {
            Message::Attrs(attrs) => Ok(Metadata {
                name: name.to_string(),
                attrs,
            }),
            Message::Status(status) => Err(status_error(op, PacketType::Attrs.name(), status)),
            other => Err(unexpected(op, PacketType::Attrs.name(), &other)),
        }
    }

    async fn request_single_name(&self, op: &'static str, message: Message) -> Result<DirEntry> {
        match self.request(op, message).await? {
            Message::Name(mut entries) if entries.len() == 1 => Ok(entries.remove(0)),
            Message::Name(entries) => Err(Error::UnexpectedPacket {
                op,
                expected: "SSH_FXP_NAME with one entry",
                got: format!("SSH_FXP_NAME with {} entries", entries.len()),
            }),
            Message::Status(status) => Err(status_error(op, PacketType::Name.name(), status)),
            other => Err(unexpected(op, PacketType::Name.name(), &other)),
        }
    }

    /// Opens a remote file.
    ///
    /// `attrs` apply when the file is created; `None` sends empty attributes.
    pub async fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        attrs: Option<&FileAttrs>,
    ) -> Result<FileHandle> {
        let message = Message::Open {
            path: path.to_string(),
            pflags: flags,
            attrs: attrs.cloned().unwrap_or_default(),
        };
        self.request_handle("open", path, message).await
    }

    /// Creates (or truncates) a remote file for writing.
    pub async fn create(&self, path: &str) -> Result<FileHandle> {
        self.open(
            path,
            OpenFlags::WRITE | OpenFlags::CREAT | OpenFlags::TRUNC,
            None,
        )
        .await
    }

    /// Opens a remote directory for [`readdir`](Self::readdir).
    pub async fn opendir(&self, path: &str) -> Result<FileHandle> {
        let message = Message::OpenDir {
            path: path.to_string(),
        };
        self.request_handle("opendir", path, message).await
    }

    /// Closes a file or directory handle.
    ///
    /// A handle without a server token is accepted and nothing is sent.
    pub async fn close(&self, handle: FileHandle) -> Result<()> {
        if handle.is_empty() {
            return Ok(());
        }
        debug!(path = handle.path(), "Closing SFTP handle");
        let message = Message::Close {
            handle: handle.as_bytes().to_vec(),
        };
        self.request_ok("close", message).await
    }

    /// Reads up to `len` bytes at `offset`.
    ///
    /// `len` is capped at [`SftpConfig::max_read_size`]. Returns `Ok(None)` at
    /// end of file; the server may return fewer bytes than asked for.
    pub async fn read(
        &self,
        handle: &FileHandle,
        offset: u64,
        len: u32,
    ) -> Result<Option<Vec<u8>>> {
        if len == 0 {
            return Ok(Some(Vec::new()));
        }
        let message = Message::Read {
            handle: handle.as_bytes().to_vec(),
            offset,
            len: len.min(self.config.max_read_size),
        };
        match self.request("read", message).await? {
            Message::Data(data) => Ok(Some(data)),
            Message::Status(status) if status.code == StatusCode::Eof => Ok(None),
            Message::Status(status) => Err(status_error("read", PacketType::Data.name(), status)),
            other => Err(unexpected("read", PacketType::Data.name(), &other)),
        }
    }

    /// Writes `data` at `offset`. Empty data sends nothing.
    pub async fn write(&self, handle: &FileHandle, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let message = Message::Write {
            handle: handle.as_bytes().to_vec(),
            offset,
            data: data.to_vec(),
        };
        self.request_ok("write", message).await
    }

    /// Gets attributes, following symlinks.
    pub async fn stat(&self, path: &str) -> Result<Metadata> {
        let message = Message::Stat {
            path: path.to_string(),
        };
        self.request_attrs("stat", path, message).await
    }

    /// Gets attributes without following symlinks.
    pub async fn lstat(&self, path: &str) -> Result<Metadata> {
        let message = Message::LStat {
            path: path.to_string(),
        };
        self.request_attrs("lstat", path, message).await
    }

    /// Gets attributes of an open handle.
    pub async fn fstat(&self, handle: &FileHandle) -> Result<Metadata> {
        let message = Message::FStat {
            handle: handle.as_bytes().to_vec(),
        };
        self.request_attrs("fstat", handle.path(), message).await
    }

    /// Changes attributes by path. `None` sends nothing.
    pub async fn setstat(&self, path: &str, attrs: Option<&FileAttrs>) -> Result<()> {
        let Some(attrs) = attrs else {
            return Ok(());
        };
        let message = Message::SetStat {
            path: path.to_string(),
            attrs: attrs.clone(),
        };
        self.request_ok("setstat", message).await
    }

    /// Changes attributes of an open handle. `None` sends nothing.
    pub async fn fsetstat(&self, handle: &FileHandle, attrs: Option<&FileAttrs>) -> Result<()> {
        let Some(attrs) = attrs else {
            return Ok(());
        };
        let message = Message::FSetStat {
            handle: handle.as_bytes().to_vec(),
            attrs: attrs.clone(),
        };
        self.request_ok("fsetstat", message).await
    }

    /// Reads the next batch of entries from a directory handle.
    ///
    /// Returns `Ok(None)` once the directory is exhausted.
    pub async fn readdir(&self, handle: &FileHandle) -> Result<Option<Vec<DirEntry>>> {
        let message = Message::ReadDir {
            handle: handle.as_bytes().to_vec(),
        };
        match self.request("readdir", message).await? {
            Message::Name(entries) => Ok(Some(entries)),
            Message::Status(status) if status.code == StatusCode::Eof => Ok(None),
            Message::Status(status) => {
                Err(status_error("readdir", PacketType::Name.name(), status))
            }
            other => Err(unexpected("readdir", PacketType::Name.name(), &other)),
        }
    }

    /// Removes a file.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let message = Message::Remove {
            path: path.to_string(),
        };
        self.request_ok("remove", message).await
    }

    /// Creates a directory.
    pub async fn mkdir(&self, path: &str, attrs: Option<&FileAttrs>) -> Result<()> {
        let message = Message::MkDir {
            path: path.to_string(),
            attrs: attrs.cloned().unwrap_or_default(),
        };
        self.request_ok("mkdir", message).await
    }

    /// Removes an empty directory.
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        let message = Message::RmDir {
            path: path.to_string(),
        };
        self.request_ok("rmdir", message).await
    }

    /// Renames a file or directory.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let message = Message::Rename {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
        };
        self.request_ok("rename", message).await
    }

    /// Creates a symbolic link at `link_path` pointing to `target_path`.
    pub async fn symlink(&self, link_path: &str, target_path: &str) -> Result<()> {
        let message = Message::Symlink {
            link_path: link_path.to_string(),
            target_path: target_path.to_string(),
        };
        self.request_ok("symlink", message).await
    }

    /// Canonicalizes a path on the server.
    pub async fn realpath(&self, path: &str) -> Result<DirEntry> {
        let message = Message::RealPath {
            path: path.to_string(),
        };
        self.request_single_name("realpath", message).await
    }

    /// Reads the target of a symbolic link.
    pub async fn readlink(&self, path: &str) -> Result<DirEntry> {
        let message = Message::ReadLink {
            path: path.to_string(),
        };
        self.request_single_name("readlink", message).await
    }
}

fn unexpected(op: &'static str, expected: &'static str, got: &Message) -> Error {
    Error::UnexpectedPacket {
        op,
        expected,
        got: got.kind().name().to_string(),
    }
}

/// A STATUS where something else was expected: OK is a protocol violation,
/// anything else is the server's answer.
fn status_error(op: &'static str, expected: &'static str, status: Status) -> Error {
    status
        .into_error(op)
        .unwrap_or_else(|| Error::UnexpectedPacket {
            op,
            expected,
            got: "SSH_FXP_STATUS (OK)".to_string(),
        })
}
