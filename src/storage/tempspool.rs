//! Spools a request body to memory or, once it exceeds a size threshold, to
//! a scoped temp file. Mirrors `s3srv.GetReaderSize`/`s3srv.TeeRead`: small
//! bodies never touch disk, large ones don't blow up memory.

use md5::{Digest, Md5};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};

/// Default cap for the plain size probe (`TempSpool::capture`).
pub const DEFAULT_MAX_MEMORY: u64 = 10 << 20;
/// Default cap for the hashing tee (`TempSpool::capture_with_md5`).
pub const DEFAULT_TEE_MAX_MEMORY: u64 = 1 << 20;

/// A reader over spooled content: either still in memory, or backed by a
/// temp file that is removed when this value is dropped.
pub enum TempSpool {
    Memory(io::Cursor<Vec<u8>>),
    Disk { file: File, _guard: NamedTempFile },
}

impl TempSpool {
    /// Reads all of `reader` into memory up to `max_memory` bytes; if more
    /// remains, spills everything read so far plus the rest of the stream
    /// into a temp file. Returns the spool and the total size read.
    pub async fn capture<R>(mut reader: R, max_memory: u64) -> io::Result<(Self, u64)>
    where
        R: AsyncRead + Unpin,
    {
        let max_memory = if max_memory == 0 {
            DEFAULT_MAX_MEMORY
        } else {
            max_memory
        };
        let mut buf = Vec::new();
        let mut limited = (&mut reader).take(max_memory + 1);
        limited.read_to_end(&mut buf).await?;

        if (buf.len() as u64) <= max_memory {
            let size = buf.len() as u64;
            return Ok((TempSpool::Memory(io::Cursor::new(buf)), size));
        }

        let tmp = NamedTempFile::new()?;
        let mut file = File::create(tmp.path()).await?;
        file.write_all(&buf).await?;
        let mut written = buf.len() as u64;
        written += tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file = File::open(tmp.path()).await?;

        Ok((
            TempSpool::Disk {
                file,
                _guard: tmp,
            },
            written,
        ))
    }

    /// Like `capture`, but also computes the MD5 of everything read,
    /// regardless of whether it ends up in memory or on disk.
    pub async fn capture_with_md5<R>(
        mut reader: R,
        max_memory: u64,
    ) -> io::Result<(Self, u64, [u8; 16])>
    where
        R: AsyncRead + Unpin,
    {
        let max_memory = if max_memory == 0 {
            DEFAULT_TEE_MAX_MEMORY
        } else {
            max_memory
        };
        let mut hasher = Md5::new();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64 * 1024];
        let mut total: u64 = 0;
        let mut spilled = false;
        let mut tmp: Option<(NamedTempFile, File)> = None;

        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
            total += n as u64;

            if !spilled && (buf.len() + n) as u64 > max_memory {
                let t = NamedTempFile::new()?;
                let mut f = File::create(t.path()).await?;
                f.write_all(&buf).await?;
                buf.clear();
                spilled = true;
                tmp = Some((t, f));
            }

            if spilled {
                let (_, f) = tmp.as_mut().unwrap();
                f.write_all(&chunk[..n]).await?;
            } else {
                buf.extend_from_slice(&chunk[..n]);
            }
        }

        let digest: [u8; 16] = hasher.finalize().into();

        if let Some((guard, mut f)) = tmp {
            f.flush().await?;
            let f = File::open(guard.path()).await?;
            Ok((TempSpool::Disk { file: f, _guard: guard }, total, digest))
        } else {
            Ok((TempSpool::Memory(io::Cursor::new(buf)), total, digest))
        }
    }
}

impl AsyncRead for TempSpool {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TempSpool::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            TempSpool::Disk { file, .. } => Pin::new(file).poll_read(cx, buf),
        }
    }
}
