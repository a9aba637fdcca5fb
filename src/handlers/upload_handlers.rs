//! `POST /upload`: accept one chunk of a file.
//!
//! The body is read fully (bounded by `max_chunk_bytes`) before anything is
//! written, so rejected requests leave no trace on disk.

use crate::{
    errors::AppError,
    models::upload::{ChunkEncoding, ChunkMeta, ChunkOutcome},
    services::chunk_receiver::ChunkReceiver,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Query, State, rejection::QueryRejection},
    http::{HeaderMap, header},
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;

/// Query parameters accepted by the upload endpoint.
///
/// Everything arrives as text and is validated in [`ChunkQuery::into_parts`],
/// so malformed values get the same JSON error body as missing ones.
#[derive(Debug, Default, Deserialize)]
pub struct ChunkQuery {
    pub name: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "currentChunkIndex")]
    pub current_chunk_index: Option<String>,
    #[serde(rename = "totalChunks")]
    pub total_chunks: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    pub encoding: Option<String>,
}

impl ChunkQuery {
    /// Split into chunk metadata and body encoding. Empty values count as
    /// absent.
    fn into_parts(self) -> Result<(ChunkMeta, ChunkEncoding), AppError> {
        let encoding = parse_encoding(self.encoding.as_deref())?;
        let declared_size = parse_count("size", self.size.as_deref())?;
        let index = parse_count("currentChunkIndex", self.current_chunk_index.as_deref())?;
        let total_chunks = parse_count("totalChunks", self.total_chunks.as_deref())?;

        match (self.name, index, total_chunks) {
            (Some(name), Some(index), Some(total_chunks)) if !name.is_empty() => Ok((
                ChunkMeta {
                    name,
                    declared_size,
                    index,
                    total_chunks,
                    upload_id: self.upload_id,
                },
                encoding,
            )),
            _ => Err(AppError::bad_request("Missing required query parameters")),
        }
    }
}

fn parse_count(field: &str, raw: Option<&str>) -> Result<Option<u64>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<u64>().map(Some).map_err(|_| {
            AppError::bad_request(format!("Invalid value `{}` for `{}`", value, field))
        }),
    }
}

fn parse_encoding(raw: Option<&str>) -> Result<ChunkEncoding, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(ChunkEncoding::Raw),
        Some(value) if value.eq_ignore_ascii_case(ChunkEncoding::Raw.as_str()) => {
            Ok(ChunkEncoding::Raw)
        }
        Some(value) if value.eq_ignore_ascii_case(ChunkEncoding::Base64.as_str()) => {
            Ok(ChunkEncoding::Base64)
        }
        Some(value) => Err(AppError::bad_request(format!(
            "Unsupported encoding `{}`",
            value
        ))),
    }
}

/// Upload a chunk: `POST /upload?name=&size=&currentChunkIndex=&totalChunks=`.
///
/// Responds only after the chunk is durably appended. The last chunk's
/// response carries the retrieval identifier.
pub async fn upload_chunk(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<ChunkQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ChunkOutcome>, AppError> {
    let Query(query) = query.map_err(|err| AppError::bad_request(err.body_text()))?;
    let (meta, encoding) = query.into_parts()?;

    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(len) = declared_len {
        if len > state.max_chunk_bytes as u64 {
            return Err(AppError::payload_too_large("Payload too large"));
        }
    }

    let raw = read_body_limited(body, state.max_chunk_bytes).await?;
    let payload = ChunkReceiver::decode_payload(encoding, raw)?;

    let outcome = state
        .receiver
        .accept_chunk(&meta, &peer.ip().to_string(), &payload)
        .await?;
    Ok(Json(outcome))
}

/// Collect the request body, failing as soon as it grows past `limit`.
async fn read_body_limited(body: Body, limit: usize) -> Result<Bytes, AppError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|err| AppError::bad_request(format!("failed to read request body: {}", err)))?;
        if buf.len() + chunk.len() > limit {
            return Err(AppError::payload_too_large("Payload too large"));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
