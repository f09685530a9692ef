//! In-memory SFTP v3 server used by the integration tests.
//!
//! The server runs on the far end of a `tokio::io::duplex` pipe, keeps a tiny
//! file tree in memory and records every request packet it receives, so tests
//! can assert on what actually went over the wire.

#![allow(dead_code)]

use sftpkit_platform::StatusCode;
use sftpkit_proto::sftp::{
    DirEntry, Extensions, FileAttrs, FileMode, Message, OpenFlags, Packet, Status,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Working directory reported for relative paths.
pub const HOME: &str = "/home/test";

const MTIME: u32 = 1_700_000_000;

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Link(String),
}

#[derive(Debug)]
enum OpenHandle {
    File(String),
    Dir(Vec<DirEntry>),
}

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    modes: HashMap<String, u32>,
}

impl Tree {
    fn children(&self, dir: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|path| path.as_str() != "/" && parent(path) == dir)
            .cloned()
            .collect()
    }

    fn resolve(&self, path: &str) -> String {
        match self.nodes.get(path) {
            Some(Node::Link(target)) => normalize(parent(path), target),
            _ => path.to_string(),
        }
    }

    fn attrs(&self, path: &str, follow: bool) -> Option<FileAttrs> {
        let path = if follow {
            self.resolve(path)
        } else {
            path.to_string()
        };
        let (kind, size, default_perm) = match self.nodes.get(&path)? {
            Node::File(data) => (FileMode::S_IFREG, data.len() as u64, 0o644),
            Node::Dir => (FileMode::S_IFDIR, 4096, 0o755),
            Node::Link(target) => (FileMode::S_IFLNK, target.len() as u64, 0o777),
        };
        let perm = self.modes.get(&path).copied().unwrap_or(default_perm);

        let mut attrs = FileAttrs::new();
        attrs
            .set_size(size)
            .set_uid_gid(1000, 1000)
            .set_permissions(kind | perm)
            .set_times(MTIME, MTIME);
        Some(attrs)
    }

    fn entry(&self, path: &str, name: &str) -> DirEntry {
        let attrs = self.attrs(path, false).unwrap_or_default();
        let mode = attrs.mode().unwrap_or(FileMode(0));
        let longname = format!(
            "{} 1 test test {:>8} Nov 14 22:13 {}",
            mode,
            attrs.size().unwrap_or(0),
            name
        );
        DirEntry::new(name, longname, attrs)
    }
}

/// Scriptable in-memory SFTP server.
#[derive(Clone)]
pub struct MockServer {
    tree: Arc<Mutex<Tree>>,
    requests: Arc<Mutex<Vec<Packet>>>,
    version: u32,
    dir_batch: usize,
    fail_read_at: Option<u64>,
}

impl MockServer {
    /// Server speaking version 3 with `/`, `/home` and [`HOME`] present.
    pub fn new() -> Self {
        let mut tree = Tree::default();
        for dir in ["/", "/home", HOME] {
            tree.nodes.insert(dir.to_string(), Node::Dir);
        }
        Self {
            tree: Arc::new(Mutex::new(tree)),
            requests: Arc::new(Mutex::new(Vec::new())),
            version: 3,
            dir_batch: 100,
            fail_read_at: None,
        }
    }

    /// Announce `version` in the VERSION reply.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Return at most `batch` entries per READDIR.
    pub fn with_dir_batch(mut self, batch: usize) -> Self {
        self.dir_batch = batch;
        self
    }

    /// Answer READ requests at or past `offset` with SSH_FX_FAILURE.
    pub fn with_read_failure_at(mut self, offset: u64) -> Self {
        self.fail_read_at = Some(offset);
        self
    }

    pub fn add_dir(&self, path: &str) {
        self.tree
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), Node::Dir);
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.tree
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), Node::File(data.to_vec()));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree.lock().unwrap().nodes.get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.lock().unwrap().nodes.contains_key(path)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Packet> {
        self.requests.lock().unwrap().clone()
    }

    /// `(offset, len)` of every WRITE received so far.
    pub fn writes(&self) -> Vec<(u64, usize)> {
        self.requests()
            .into_iter()
            .filter_map(|packet| match packet.message {
                Message::Write { offset, data, .. } => Some((offset, data.len())),
                _ => None,
            })
            .collect()
    }

    /// Number of requests of the given kind name (e.g. "SSH_FXP_CLOSE").
    pub fn count(&self, kind: &str) -> usize {
        self.requests()
            .iter()
            .filter(|packet| packet.kind().name() == kind)
            .count()
    }

    /// Starts serving and returns the client end of the pipe.
    pub fn spawn(&self) -> DuplexStream {
        let (client, server) = duplex(1 << 20);
        let mut session = ServerSession {
            server: self.clone(),
            handles: HashMap::new(),
            next_handle: 1,
        };
        tokio::spawn(async move { session.serve(server).await });
        client
    }
}

struct ServerSession {
    server: MockServer,
    handles: HashMap<Vec<u8>, OpenHandle>,
    next_handle: u32,
}

impl ServerSession {
    async fn serve(&mut self, mut stream: DuplexStream) {
        loop {
            let mut prefix = [0u8; 4];
            if stream.read_exact(&mut prefix).await.is_err() {
                return;
            }
            let len = u32::from_be_bytes(prefix) as usize;
            let mut frame = prefix.to_vec();
            frame.resize(4 + len, 0);
            if stream.read_exact(&mut frame[4..]).await.is_err() {
                return;
            }

            let packet = match Packet::from_bytes(&frame) {
                Ok(packet) => packet,
                Err(_) => return,
            };
            self.server.requests.lock().unwrap().push(packet.clone());

            let reply = self.handle(packet.message);
            let id = packet.request_id.unwrap_or(0);
            if stream.write_all(&reply.to_frame(id)).await.is_err() {
                return;
            }
        }
    }

    fn open_handle(&mut self, open: OpenHandle) -> Message {
        let handle = self.next_handle.to_be_bytes().to_vec();
        self.next_handle += 1;
        self.handles.insert(handle.clone(), open);
        Message::Handle(handle)
    }

    fn handle_path(&self, handle: &[u8]) -> Option<String> {
        match self.handles.get(handle) {
            Some(OpenHandle::File(path)) => Some(path.clone()),
            _ => None,
        }
    }

    fn handle(&mut self, message: Message) -> Message {
        let tree = Arc::clone(&self.server.tree);
        let mut tree = tree.lock().unwrap();

        match message {
            Message::Init { .. } => Message::Version {
                version: self.server.version,
                extensions: [("posix-rename@openssh.com", "1")]
                    .into_iter()
                    .collect::<Extensions>(),
            },

            Message::Open { path, pflags, .. } => {
                let path = tree.resolve(&normalize(HOME, &path));
                match tree.nodes.get_mut(&path) {
                    Some(Node::File(data)) => {
                        if pflags.contains(OpenFlags::EXCL) && pflags.contains(OpenFlags::CREAT) {
                            return status(StatusCode::Failure, "file exists");
                        }
                        if pflags.contains(OpenFlags::TRUNC) {
                            data.clear();
                        }
                    }
                    Some(_) => return status(StatusCode::Failure, "not a regular file"),
                    None if pflags.contains(OpenFlags::CREAT) => {
                        if !matches!(tree.nodes.get(parent(&path)), Some(Node::Dir)) {
                            return status(StatusCode::NoSuchFile, "no such directory");
                        }
                        tree.nodes.insert(path.clone(), Node::File(Vec::new()));
                    }
                    None => return status(StatusCode::NoSuchFile, "no such file"),
                }
                drop(tree);
                self.open_handle(OpenHandle::File(path))
            }

            Message::OpenDir { path } => {
                let path = tree.resolve(&normalize(HOME, &path));
                if !matches!(tree.nodes.get(&path), Some(Node::Dir)) {
                    return status(StatusCode::NoSuchFile, "no such directory");
                }
                let mut entries = vec![tree.entry(&path, "."), tree.entry(parent(&path), "..")];
                for child in tree.children(&path) {
                    entries.push(tree.entry(&child, basename(&child)));
                }
                entries.reverse();
                drop(tree);
                self.open_handle(OpenHandle::Dir(entries))
            }

            Message::Close { handle } => match self.handles.remove(&handle) {
                Some(_) => ok(),
                None => status(StatusCode::Failure, "invalid handle"),
            },

            Message::Read {
                handle,
                offset,
                len,
            } => {
                if let Some(at) = self.server.fail_read_at {
                    if offset >= at {
                        return status(StatusCode::Failure, "injected read failure");
                    }
                }
                let Some(path) = self.handle_path(&handle) else {
                    return status(StatusCode::Failure, "invalid handle");
                };
                match tree.nodes.get(&path) {
                    Some(Node::File(data)) if offset >= data.len() as u64 => {
                        status(StatusCode::Eof, "")
                    }
                    Some(Node::File(data)) => {
                        let start = offset as usize;
                        let end = data.len().min(start + len as usize);
                        Message::Data(data[start..end].to_vec())
                    }
                    _ => status(StatusCode::NoSuchFile, "file vanished"),
                }
            }

            Message::Write {
                handle,
                offset,
                data,
            } => {
                let Some(path) = self.handle_path(&handle) else {
                    return status(StatusCode::Failure, "invalid handle");
                };
                match tree.nodes.get_mut(&path) {
                    Some(Node::File(contents)) => {
                        let start = offset as usize;
                        let end = start + data.len();
                        if contents.len() < end {
                            contents.resize(end, 0);
                        }
                        contents[start..end].copy_from_slice(&data);
                        ok()
                    }
                    _ => status(StatusCode::NoSuchFile, "file vanished"),
                }
            }

            Message::Stat { path } => attrs_reply(tree.attrs(&normalize(HOME, &path), true)),
            Message::LStat { path } => attrs_reply(tree.attrs(&normalize(HOME, &path), false)),
            Message::FStat { handle } => match self.handle_path(&handle) {
                Some(path) => attrs_reply(tree.attrs(&path, false)),
                None => status(StatusCode::Failure, "invalid handle"),
            },

            Message::SetStat { path, attrs } => {
                let path = tree.resolve(&normalize(HOME, &path));
                set_mode(&mut tree, &path, &attrs)
            }
            Message::FSetStat { handle, attrs } => match self.handle_path(&handle) {
                Some(path) => set_mode(&mut tree, &path, &attrs),
                None => status(StatusCode::Failure, "invalid handle"),
            },

            Message::ReadDir { handle } => {
                let batch = self.server.dir_batch;
                match self.handles.get_mut(&handle) {
                    Some(OpenHandle::Dir(pending)) if pending.is_empty() => {
                        status(StatusCode::Eof, "")
                    }
                    Some(OpenHandle::Dir(pending)) => {
                        let take = batch.min(pending.len());
                        let split = pending.len() - take;
                        let mut entries = pending.split_off(split);
                        entries.reverse();
                        Message::Name(entries)
                    }
                    _ => status(StatusCode::Failure, "invalid handle"),
                }
            }

            Message::Remove { path } => {
                let path = normalize(HOME, &path);
                match tree.nodes.get(&path) {
                    Some(Node::File(_)) | Some(Node::Link(_)) => {
                        tree.nodes.remove(&path);
                        ok()
                    }
                    Some(Node::Dir) => status(StatusCode::Failure, "is a directory"),
                    None => status(StatusCode::NoSuchFile, "no such file"),
                }
            }

            Message::MkDir { path, attrs } => {
                let path = normalize(HOME, &path);
                if tree.nodes.contains_key(&path) {
                    return status(StatusCode::Failure, "file exists");
                }
                if !matches!(tree.nodes.get(parent(&path)), Some(Node::Dir)) {
                    return status(StatusCode::NoSuchFile, "no such directory");
                }
                tree.nodes.insert(path.clone(), Node::Dir);
                if let Some(mode) = attrs.permissions() {
                    tree.modes.insert(path, mode & 0o7777);
                }
                ok()
            }

            Message::RmDir { path } => {
                let path = normalize(HOME, &path);
                match tree.nodes.get(&path) {
                    Some(Node::Dir) if !tree.children(&path).is_empty() => {
                        status(StatusCode::Failure, "directory not empty")
                    }
                    Some(Node::Dir) => {
                        tree.nodes.remove(&path);
                        ok()
                    }
                    Some(_) => status(StatusCode::Failure, "not a directory"),
                    None => status(StatusCode::NoSuchFile, "no such directory"),
                }
            }

            Message::RealPath { path } => {
                let path = normalize(HOME, &path);
                Message::Name(vec![DirEntry::new(path.clone(), path, FileAttrs::new())])
            }

            Message::Rename { old_path, new_path } => {
                let old_path = normalize(HOME, &old_path);
                let new_path = normalize(HOME, &new_path);
                if tree.nodes.contains_key(&new_path) {
                    return status(StatusCode::Failure, "target exists");
                }
                match tree.nodes.remove(&old_path) {
                    Some(node) => {
                        tree.nodes.insert(new_path, node);
                        ok()
                    }
                    None => status(StatusCode::NoSuchFile, "no such file"),
                }
            }

            Message::ReadLink { path } => match tree.nodes.get(&normalize(HOME, &path)) {
                Some(Node::Link(target)) => Message::Name(vec![DirEntry::new(
                    target.clone(),
                    target.clone(),
                    FileAttrs::new(),
                )]),
                _ => status(StatusCode::NoSuchFile, "not a link"),
            },

            Message::Symlink {
                link_path,
                target_path,
            } => {
                let link_path = normalize(HOME, &link_path);
                if tree.nodes.contains_key(&link_path) {
                    return status(StatusCode::Failure, "file exists");
                }
                tree.nodes.insert(link_path, Node::Link(target_path));
                ok()
            }

            _ => status(StatusCode::OpUnsupported, "unsupported request"),
        }
    }
}

fn ok() -> Message {
    Message::Status(Status::ok())
}

fn status(code: StatusCode, message: &str) -> Message {
    Message::Status(Status::new(code, message))
}

fn attrs_reply(attrs: Option<FileAttrs>) -> Message {
    match attrs {
        Some(attrs) => Message::Attrs(attrs),
        None => status(StatusCode::NoSuchFile, "no such file"),
    }
}

fn set_mode(tree: &mut Tree, path: &str, attrs: &FileAttrs) -> Message {
    if !tree.nodes.contains_key(path) {
        return status(StatusCode::NoSuchFile, "no such file");
    }
    if let Some(mode) = attrs.permissions() {
        tree.modes.insert(path.to_string(), mode & 0o7777);
    }
    if let (Some(size), Some(Node::File(data))) = (attrs.size(), tree.nodes.get_mut(path)) {
        data.resize(size as usize, 0);
    }
    ok()
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Joins `path` onto `cwd` and collapses `.` and `..` components.
pub fn normalize(cwd: &str, path: &str) -> String {
    let full = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", cwd, path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in full.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    format!("/{}", parts.join("/"))
}
