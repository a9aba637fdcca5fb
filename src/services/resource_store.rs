//! ResourceStore: read side of the public root.
//!
//! Locates finalized resources by retrieval key or file name and opens
//! readers positioned on a byte range. Holds no mutable state, so any number
//! of requests may use it concurrently.

use crate::{models::resource::Resource, services::range::ByteRange};
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, Take},
};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ResourceResult<T> = Result<T, ResourceError>;

/// Extension tried first when resolving a bare retrieval key.
const DEFAULT_EXTENSION: &str = "mp4";

#[derive(Clone, Debug)]
pub struct ResourceStore {
    pub public_dir: PathBuf,
}

impl ResourceStore {
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
        }
    }

    /// Keys and file names must name a direct child of the public root.
    /// Unsafe values are reported as missing rather than as bad requests.
    fn ensure_name_safe(name: &str) -> ResourceResult<()> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.bytes().any(|b| b.is_ascii_control())
        {
            return Err(ResourceError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Resolve a retrieval key (identifier without extension).
    ///
    /// Tries `{key}.mp4` first, then any file whose stem equals the key.
    pub async fn locate_by_key(&self, key: &str) -> ResourceResult<Resource> {
        Self::ensure_name_safe(key)?;

        let preferred = format!("{}.{}", key, DEFAULT_EXTENSION);
        match self.describe(&preferred).await {
            Err(ResourceError::NotFound(_)) => {}
            other => return other,
        }

        let mut entries = match fs::read_dir(&self.public_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ResourceError::NotFound(key.to_string()));
            }
            Err(err) => return Err(ResourceError::Io(err)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let stem = Path::new(file_name).file_stem().and_then(|s| s.to_str());
            if stem == Some(key) {
                match self.describe(file_name).await {
                    Err(ResourceError::NotFound(_)) => continue,
                    other => return other,
                }
            }
        }

        Err(ResourceError::NotFound(key.to_string()))
    }

    /// Resolve a full file name (`resourceId.ext`) as returned by the upload
    /// endpoint.
    pub async fn locate_file(&self, file_name: &str) -> ResourceResult<Resource> {
        Self::ensure_name_safe(file_name)?;
        self.describe(file_name).await
    }

    async fn describe(&self, file_name: &str) -> ResourceResult<Resource> {
        let path = self.public_dir.join(file_name);
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(ResourceError::NotFound(file_name.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ResourceError::NotFound(file_name.to_string()));
            }
            Err(err) => return Err(ResourceError::Io(err)),
        };

        Ok(Resource {
            file_name: file_name.to_string(),
            path,
            size: meta.len(),
            content_type: content_type_for(file_name),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Open a reader yielding exactly the requested bytes, or the whole
    /// resource when `range` is `None`.
    pub async fn open_range(
        &self,
        resource: &Resource,
        range: Option<ByteRange>,
    ) -> ResourceResult<Take<File>> {
        let mut file = File::open(&resource.path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ResourceError::NotFound(resource.file_name.clone())
            } else {
                ResourceError::Io(err)
            }
        })?;

        match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                Ok(file.take(range.len()))
            }
            None => Ok(file.take(resource.size)),
        }
    }
}

/// MIME type by extension; playback clients need the video types right.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("m4v") => "video/x-m4v",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}
