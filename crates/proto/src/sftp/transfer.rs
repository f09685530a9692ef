//! Whole-file transfers and directory listing built on the request API.

use super::attrs::FileAttrs;
use super::client::SftpClient;
use super::logging;
use super::types::{DirEntry, FileHandle, OpenFlags};
use sftpkit_platform::{ByteStream, Result};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

impl<S: ByteStream> SftpClient<S> {
    /// Downloads a file.
    ///
    /// # Arguments
    ///
    /// * `remote_path` - Path on remote server
    /// * `local_path` - Path to save locally (created or truncated)
    ///
    /// # Returns
    ///
    /// Number of bytes written locally.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use sftpkit_proto::sftp::SftpClient;
    /// # use tokio::io::DuplexStream;
    /// # async fn example(sftp: &SftpClient<DuplexStream>) -> sftpkit_platform::Result<()> {
    /// let bytes = sftp.download("/remote/file.txt", "local.txt").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download(&self, remote_path: &str, local_path: impl AsRef<Path>) -> Result<u64> {
        info!(
            "Downloading {} -> {}",
            remote_path,
            local_path.as_ref().display()
        );
        // the local file is only truncated once the remote side is open
        let handle = self.open(remote_path, OpenFlags::READ, None).await?;
        let copied = match tokio::fs::File::create(local_path).await {
            Ok(mut file) => self.copy_to_writer(&handle, &mut file).await,
            Err(e) => Err(e.into()),
        };
        let bytes = self.finish(handle, copied).await?;
        logging::log_transfer_complete("download", remote_path, bytes);
        Ok(bytes)
    }

    /// Downloads a file into any async writer.
    ///
    /// Reads at increasing offsets until the server reports end of file. Any
    /// other error aborts the loop; the remote handle is still closed.
    pub async fn download_to<W>(&self, remote_path: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let handle = self.open(remote_path, OpenFlags::READ, None).await?;
        let copied = self.copy_to_writer(&handle, writer).await;
        let bytes = self.finish(handle, copied).await?;
        logging::log_transfer_complete("download", remote_path, bytes);
        Ok(bytes)
    }

    async fn copy_to_writer<W>(&self, handle: &FileHandle, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let chunk = self.config().max_read_size;
        let mut offset = 0u64;

        while let Some(data) = self.read(handle, offset, chunk).await? {
            if data.is_empty() {
                break;
            }
            writer.write_all(&data).await?;
            offset += data.len() as u64;
        }

        writer.flush().await?;
        Ok(offset)
    }

    /// Uploads a file.
    ///
    /// The remote file is created (or truncated) with the local size, mode and
    /// times, then written in [`SftpConfig::write_chunk_size`] chunks.
    ///
    /// [`SftpConfig::write_chunk_size`]: super::SftpConfig::write_chunk_size
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use sftpkit_proto::sftp::SftpClient;
    /// # use tokio::io::DuplexStream;
    /// # async fn example(sftp: &SftpClient<DuplexStream>) -> sftpkit_platform::Result<()> {
    /// sftp.upload("local.txt", "/remote/file.txt").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload(&self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<u64> {
        let local_path = local_path.as_ref();
        info!("Uploading {} -> {}", local_path.display(), remote_path);

        let meta = tokio::fs::metadata(local_path).await?;
        let local = FileAttrs::from_metadata(&meta);

        // ownership is left to the server
        let mut attrs = FileAttrs::new();
        attrs.set_size(meta.len());
        if let Some(permissions) = local.permissions() {
            attrs.set_permissions(permissions);
        }
        if let Some((atime, mtime)) = local.times() {
            attrs.set_times(atime, mtime);
        }

        let mut file = tokio::fs::File::open(local_path).await?;
        self.upload_from(&mut file, remote_path, &attrs).await
    }

    /// Uploads everything `reader` yields to `remote_path`.
    ///
    /// A chunk shorter than the chunk size marks the end of local input.
    pub async fn upload_from<R>(
        &self,
        reader: &mut R,
        remote_path: &str,
        attrs: &FileAttrs,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let flags = OpenFlags::WRITE | OpenFlags::CREAT | OpenFlags::TRUNC;
        let handle = self.open(remote_path, flags, Some(attrs)).await?;
        let copied = self.copy_from_reader(&handle, reader).await;
        let bytes = self.finish(handle, copied).await?;
        logging::log_transfer_complete("upload", remote_path, bytes);
        Ok(bytes)
    }

    async fn copy_from_reader<R>(&self, handle: &FileHandle, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.config().write_chunk_size];
        let mut offset = 0u64;

        loop {
            let n = fill_chunk(reader, &mut buf).await?;
            self.write(handle, offset, &buf[..n]).await?;
            offset += n as u64;
            if n < buf.len() {
                break;
            }
        }

        Ok(offset)
    }

    /// Lists a directory.
    ///
    /// Reads batches until the server reports end of directory and returns
    /// every entry, "." and ".." included if the server sends them.
    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let handle = self.opendir(path).await?;
        let listed = self.collect_entries(&handle).await;
        self.finish(handle, listed).await
    }

    async fn collect_entries(&self, handle: &FileHandle) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        while let Some(batch) = self.readdir(handle).await? {
            entries.extend(batch);
        }
        Ok(entries)
    }

    /// Closes `handle` after a loop; on failure the close is best-effort and
    /// the loop's error wins.
    async fn finish<T>(&self, handle: FileHandle, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.close(handle).await?;
                Ok(value)
            }
            Err(e) => {
                let path = handle.path().to_string();
                if let Err(close_err) = self.close(handle).await {
                    logging::log_cleanup_failed("close", &path, &close_err.to_string());
                }
                Err(e)
            }
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
async fn fill_chunk<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fill_chunk_joins_short_reads() {
        // a reader that yields at most 3 bytes per read
        let (mut tx, mut rx) = tokio::io::duplex(3);
        tokio::spawn(async move {
            tx.write_all(b"abcdefgh").await.unwrap();
        });

        let mut buf = [0u8; 5];
        assert_eq!(fill_chunk(&mut rx, &mut buf).await.unwrap(), 5);
        assert_eq!(&buf, b"abcde");
        assert_eq!(fill_chunk(&mut rx, &mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], b"fgh");
        assert_eq!(fill_chunk(&mut rx, &mut buf).await.unwrap(), 0);
    }
}
