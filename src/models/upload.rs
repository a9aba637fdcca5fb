//! Wire and metadata types for the chunk upload protocol.

use serde::{Deserialize, Serialize};

/// Result of accepting a single chunk.
///
/// Serialized as `{"status":"continue"}` for intermediate chunks and as
/// `{"status":"finalized","resourceId":"…","finalFilename":"…"}` once the
/// last chunk has been promoted into a retrievable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChunkOutcome {
    /// Chunk appended; the client should send the next one.
    Continue,

    /// Last chunk appended and the staging artifact promoted.
    Finalized {
        /// Retrieval identifier, without extension. Used by `/video/{key}`.
        #[serde(rename = "resourceId")]
        resource_id: String,

        /// File name under the public root, i.e. `resourceId.ext`.
        #[serde(rename = "finalFilename")]
        final_filename: String,
    },
}

impl ChunkOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, ChunkOutcome::Finalized { .. })
    }
}

/// How chunk bytes are carried in the request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkEncoding {
    /// Raw octets.
    #[default]
    Raw,
    /// Base64 text, optionally wrapped as a `data:` URL.
    Base64,
}

impl ChunkEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkEncoding::Raw => "raw",
            ChunkEncoding::Base64 => "base64",
        }
    }
}

/// Position metadata for one chunk, after the HTTP layer checked that the
/// required fields are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeta {
    /// Original file name as supplied by the client.
    pub name: String,

    /// Declared total file size. When present the receiver enforces it.
    pub declared_size: Option<u64>,

    /// 0-based chunk index.
    pub index: u64,

    /// Number of chunks the client will send for this file.
    pub total_chunks: u64,

    /// Client-generated token identifying one upload attempt.
    pub upload_id: Option<String>,
}

impl ChunkMeta {
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total_chunks
    }
}
