//! src/services/chunk_receiver.rs
//!
//! ChunkReceiver: appends incoming chunks to a per-upload staging artifact
//! and promotes the artifact into the public root once the last chunk lands.
//!
//! Staging artifacts live under `staging_dir/tmp_{md5}.{ext}`; finalized
//! resources under `public_dir/{uuid}.{ext}`. No lock is taken on a staging
//! artifact: a well-behaved client never has two chunk requests in flight.

use crate::models::upload::{ChunkEncoding, ChunkMeta, ChunkOutcome};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("invalid file name `{0}`")]
    InvalidName(String),
    #[error("chunk index {index} out of range for {total} chunk(s)")]
    ChunkOutOfRange { index: u64, total: u64 },
    #[error("chunk payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("staging artifact would grow to {attempted} bytes, declared size is {declared}")]
    SizeExceeded { declared: u64, attempted: u64 },
    #[error("staging artifact holds {staged} bytes, declared size is {declared}")]
    SizeMismatch { declared: u64, staged: u64 },
    #[error("failed to promote staging artifact: {0}")]
    Finalize(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ReceiverResult<T> = Result<T, ReceiverError>;

const MAX_NAME_LEN: usize = 1024;
const MAX_EXTENSION_LEN: usize = 16;
const FALLBACK_EXTENSION: &str = "bin";
pub const STAGING_PREFIX: &str = "tmp_";

#[derive(Clone, Debug)]
pub struct ChunkReceiver {
    /// Directory holding in-progress staging artifacts.
    pub staging_dir: PathBuf,

    /// Directory finalized resources are promoted into.
    pub public_dir: PathBuf,
}

impl ChunkReceiver {
    pub fn new(staging_dir: impl Into<PathBuf>, public_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            public_dir: public_dir.into(),
        }
    }

    /// Create the staging and public directories if they are missing.
    pub async fn ensure_dirs(&self) -> ReceiverResult<()> {
        fs::create_dir_all(&self.staging_dir).await?;
        fs::create_dir_all(&self.public_dir).await?;
        Ok(())
    }

    /// Reject names that could escape the staging directory or that carry
    /// control characters. The name only feeds a hash and an extension, but
    /// it is logged and echoed back in errors.
    fn ensure_name_safe(name: &str) -> ReceiverResult<()> {
        if name.is_empty()
            || name.len() > MAX_NAME_LEN
            || name.contains('/')
            || name.contains('\\')
            || name.bytes().any(|b| b.is_ascii_control())
        {
            return Err(ReceiverError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Deterministic staging key for `(name, origin)` as lowercase MD5 hex.
    ///
    /// `origin` is the client's upload token when it sent one, otherwise the
    /// client address.
    pub fn staging_key(name: &str, origin: &str) -> String {
        let mut ctx = md5::Context::new();
        ctx.consume(name.as_bytes());
        ctx.consume(b"\n");
        ctx.consume(origin.as_bytes());
        format!("{:x}", ctx.compute())
    }

    /// Path of the staging artifact a chunk is appended to.
    pub fn staging_path(&self, meta: &ChunkMeta, peer: &str) -> PathBuf {
        let origin = meta
            .upload_id
            .as_deref()
            .filter(|token| !token.is_empty())
            .unwrap_or(peer);
        let key = Self::staging_key(&meta.name, origin);
        self.staging_dir.join(format!(
            "{}{}.{}",
            STAGING_PREFIX,
            key,
            file_extension(&meta.name)
        ))
    }

    /// Turn a request body into raw chunk bytes.
    ///
    /// Base64 bodies may be a `data:<mime>;base64,<payload>` URL, which is
    /// what browser file readers produce.
    pub fn decode_payload(encoding: ChunkEncoding, body: Bytes) -> ReceiverResult<Bytes> {
        match encoding {
            ChunkEncoding::Raw => Ok(body),
            ChunkEncoding::Base64 => {
                let text = body.trim_ascii();
                let data = if text.starts_with(b"data:") {
                    match text.iter().position(|b| *b == b',') {
                        Some(pos) => &text[pos + 1..],
                        None => text,
                    }
                } else {
                    text
                };
                Ok(Bytes::from(general_purpose::STANDARD.decode(data)?))
            }
        }
    }

    /// Append one chunk to its staging artifact and, for the last chunk,
    /// promote the artifact into the public root.
    ///
    /// - Validates name and chunk position before touching disk.
    /// - Refuses to grow the artifact past the declared size.
    /// - Flushes and fsyncs before returning, so the next chunk request
    ///   never races this write.
    /// - Re-sent chunks are appended again; there is no dedupe.
    pub async fn accept_chunk(
        &self,
        meta: &ChunkMeta,
        peer: &str,
        payload: &[u8],
    ) -> ReceiverResult<ChunkOutcome> {
        Self::ensure_name_safe(&meta.name)?;
        if meta.total_chunks == 0 || meta.index >= meta.total_chunks {
            return Err(ReceiverError::ChunkOutOfRange {
                index: meta.index,
                total: meta.total_chunks,
            });
        }

        let staging = self.staging_path(meta, peer);
        let staged = staged_len(&staging).await?;
        let after = staged + payload.len() as u64;
        if let Some(declared) = meta.declared_size {
            if after > declared {
                return Err(ReceiverError::SizeExceeded {
                    declared,
                    attempted: after,
                });
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&staging)
            .await?;
        file.write_all(payload).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        debug!(
            name = %meta.name,
            index = meta.index,
            total = meta.total_chunks,
            bytes = payload.len(),
            staged = after,
            "appended chunk to {}",
            staging.display()
        );

        if !meta.is_last() {
            return Ok(ChunkOutcome::Continue);
        }

        if let Some(declared) = meta.declared_size {
            if after != declared {
                return Err(ReceiverError::SizeMismatch {
                    declared,
                    staged: after,
                });
            }
        }

        self.finalize(&staging, file_extension(&meta.name)).await
    }

    /// Rename the staging artifact to a fresh, name-independent identifier.
    ///
    /// On failure the staging artifact is left where it is.
    async fn finalize(&self, staging: &Path, extension: &str) -> ReceiverResult<ChunkOutcome> {
        let resource_id = Uuid::new_v4().simple().to_string();
        let final_filename = format!("{}.{}", resource_id, extension);
        let target = self.public_dir.join(&final_filename);

        if let Err(err) = fs::rename(staging, &target).await {
            error!(
                "failed to promote {} to {}: {}",
                staging.display(),
                target.display(),
                err
            );
            return Err(ReceiverError::Finalize(err));
        }

        info!("finalized upload into {}", target.display());
        Ok(ChunkOutcome::Finalized {
            resource_id,
            final_filename,
        })
    }
}

/// Current length of a staging artifact; a missing artifact counts as empty.
async fn staged_len(path: &Path) -> ReceiverResult<u64> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
        Err(err) => Err(ReceiverError::Io(err)),
    }
}

/// Extension used for staging and final names.
///
/// Text after the last `.` when it is 1 to 16 ASCII alphanumerics (case kept),
/// otherwise `bin`.
pub fn file_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => FALLBACK_EXTENSION,
    }
}
