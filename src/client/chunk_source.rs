//! Fixed-size chunk planning and reading.

use bytes::Bytes;
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// A file queued for upload. Name and size are captured once and never
/// change for the lifetime of its upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

impl FileDescriptor {
    /// Describe the file at `path`, naming it after its last path component.
    pub async fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        Ok(Self {
            name,
            size: meta.len(),
            path,
        })
    }
}

/// Byte range `[start, end)` of one chunk (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// How a file of `size` bytes splits into chunks of `chunk_size` bytes.
///
/// An empty file is one empty chunk, so it still finalizes on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// `chunk_size` of 0 is treated as 1.
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self {
            size,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn total_chunks(&self) -> u64 {
        if self.size == 0 {
            1
        } else {
            self.size.div_ceil(self.chunk_size)
        }
    }

    /// Range of chunk `index`, or `None` past the last chunk.
    pub fn span(&self, index: u64) -> Option<ChunkSpan> {
        if index >= self.total_chunks() {
            return None;
        }
        let start = index.saturating_mul(self.chunk_size).min(self.size);
        let end = start.saturating_add(self.chunk_size).min(self.size);
        Some(ChunkSpan { index, start, end })
    }

    /// All spans in index order. The plan is `Copy`, so iteration can be
    /// restarted at will.
    pub fn spans(self) -> impl Iterator<Item = ChunkSpan> {
        (0..self.total_chunks()).filter_map(move |i| self.span(i))
    }
}

/// Read exactly the bytes of `span` from the file at `path`.
///
/// Fails with `UnexpectedEof` if the file shrank since it was described.
pub async fn read_span(path: &Path, span: ChunkSpan) -> io::Result<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(span.start)).await?;
    let mut buf = vec![0u8; span.len() as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
