//! Network seam between the scheduler and the chunk receiver.

use crate::models::upload::{ChunkEncoding, ChunkOutcome};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::future::Future;
use thiserror::Error;

/// Everything the receiver needs to place one chunk.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub name: String,
    pub size: u64,
    pub index: u64,
    pub total_chunks: u64,
    pub upload_id: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Whether re-sending the same chunk could succeed.
    ///
    /// Network failures, timeouts, throttling and 5xx are transient; client
    /// errors and undecodable responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
        }
    }
}

/// Sends a single chunk and reports what the receiver did with it.
///
/// The scheduler awaits each call before issuing the next, so
/// implementations never see overlapping requests from one scheduler.
pub trait ChunkTransport {
    fn send_chunk(
        &self,
        request: ChunkRequest,
    ) -> impl Future<Output = Result<ChunkOutcome, TransportError>> + Send;
}

/// HTTP transport speaking to `POST {server}/upload`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    upload_url: String,
    encoding: ChunkEncoding,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, server_url: &str) -> Self {
        Self {
            client,
            upload_url: format!("{}/upload", server_url.trim_end_matches('/')),
            encoding: ChunkEncoding::Raw,
        }
    }

    pub fn with_encoding(mut self, encoding: ChunkEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl ChunkTransport for HttpTransport {
    async fn send_chunk(&self, request: ChunkRequest) -> Result<ChunkOutcome, TransportError> {
        let size = request.size.to_string();
        let index = request.index.to_string();
        let total = request.total_chunks.to_string();

        let body = match self.encoding {
            ChunkEncoding::Raw => reqwest::Body::from(request.payload),
            ChunkEncoding::Base64 => {
                reqwest::Body::from(general_purpose::STANDARD.encode(&request.payload))
            }
        };

        let response = self
            .client
            .post(&self.upload_url)
            .query(&[
                ("name", request.name.as_str()),
                ("size", size.as_str()),
                ("currentChunkIndex", index.as_str()),
                ("totalChunks", total.as_str()),
                ("uploadId", request.upload_id.as_str()),
                ("encoding", self.encoding.as_str()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<ChunkOutcome>().await?)
    }
}
