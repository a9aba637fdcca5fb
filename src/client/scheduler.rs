//! Upload queue state machine.
//!
//! One `UploadScheduler` owns the queue and the active file/chunk cursor.
//! Its `&mut self` methods are the only transitions:
//!
//! - `enqueue` appends files, legal at any time.
//! - `advance` activates the next queued file at chunk 0.
//! - `send_active_chunk` sends the active chunk and moves the cursor on
//!   success, to the next chunk or (after finalize) back to idle.
//!
//! Exactly one chunk request is outstanding at a time. A chunk that keeps
//! failing stalls its file: the cursor stays put and the error is returned.

use crate::{
    client::{
        chunk_source::{ChunkPlan, FileDescriptor, read_span},
        retry::RetryPolicy,
        transport::{ChunkRequest, ChunkTransport, TransportError},
    },
    models::upload::ChunkOutcome,
};
use std::io;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read chunk {index} of `{name}`: {source}")]
    Read {
        name: String,
        index: u64,
        #[source]
        source: io::Error,
    },
    #[error("chunk {index} of `{name}` failed after {attempts} attempt(s): {source}")]
    Transport {
        name: String,
        index: u64,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("server finalized `{name}` at chunk {index} of {total}")]
    EarlyFinalize { name: String, index: u64, total: u64 },
    #[error("server did not finalize `{name}` after its last chunk")]
    MissingFinalize { name: String },
}

/// Lifecycle of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Queued,
    Uploading,
    Done,
}

/// A queued file and, once finished, where the server put it.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub file: FileDescriptor,
    pub resource_id: Option<String>,
    pub final_filename: Option<String>,
}

/// What one call to [`UploadScheduler::send_active_chunk`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No file is active.
    Idle,
    /// Chunk accepted; the cursor moved to the next chunk of the same file.
    ChunkAccepted { file: usize, next_chunk: u64 },
    /// Last chunk accepted and finalized; the scheduler is idle again.
    FileFinished { file: usize },
}

pub struct UploadScheduler<T> {
    transport: T,
    chunk_size: u64,
    retry: RetryPolicy,
    queue: Vec<QueueEntry>,
    active_file: Option<usize>,
    active_chunk: Option<u64>,
    last_completed: Option<usize>,
    upload_token: Option<String>,
}

impl<T: ChunkTransport> UploadScheduler<T> {
    /// `chunk_size` of 0 is treated as 1.
    pub fn new(transport: T, chunk_size: u64) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
            retry: RetryPolicy::default(),
            queue: Vec::new(),
            active_file: None,
            active_chunk: None,
            last_completed: None,
            upload_token: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Append files to the queue. Never disturbs the active upload.
    pub fn enqueue<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = FileDescriptor>,
    {
        for file in files {
            debug!(name = %file.name, size = file.size, "queued");
            self.queue.push(QueueEntry {
                file,
                resource_id: None,
                final_filename: None,
            });
        }
    }

    /// Activate the next queued file, if nothing is active.
    ///
    /// Mints a fresh upload token for the attempt. Returns whether a file
    /// was activated.
    pub fn advance(&mut self) -> bool {
        if self.active_file.is_some() {
            return false;
        }
        let next = self.last_completed.map_or(0, |i| i + 1);
        let Some(entry) = self.queue.get(next) else {
            return false;
        };

        let total = ChunkPlan::new(entry.file.size, self.chunk_size).total_chunks();
        info!(
            name = %entry.file.name,
            size = entry.file.size,
            chunks = total,
            "starting upload"
        );
        self.active_file = Some(next);
        self.active_chunk = Some(0);
        self.upload_token = Some(Uuid::new_v4().to_string());
        true
    }

    /// Read, send and account for the active chunk.
    ///
    /// On error nothing moves: calling again re-sends the same chunk under
    /// the same upload token.
    pub async fn send_active_chunk(&mut self) -> Result<Step, UploadError> {
        let (Some(file_index), Some(chunk_index)) = (self.active_file, self.active_chunk) else {
            return Ok(Step::Idle);
        };
        let file = self.queue[file_index].file.clone();
        let plan = ChunkPlan::new(file.size, self.chunk_size);
        let total = plan.total_chunks();

        let span = plan.span(chunk_index).ok_or_else(|| UploadError::Read {
            name: file.name.clone(),
            index: chunk_index,
            source: io::Error::new(io::ErrorKind::InvalidInput, "chunk index past end of file"),
        })?;
        let payload = read_span(&file.path, span)
            .await
            .map_err(|source| UploadError::Read {
                name: file.name.clone(),
                index: chunk_index,
                source,
            })?;

        let request = ChunkRequest {
            name: file.name.clone(),
            size: file.size,
            index: chunk_index,
            total_chunks: total,
            upload_id: self.upload_token.clone().unwrap_or_default(),
            payload,
        };
        let outcome = self.send_with_retry(request).await?;

        let is_last = chunk_index + 1 == total;
        match outcome {
            ChunkOutcome::Finalized {
                resource_id,
                final_filename,
            } if is_last => {
                info!(name = %file.name, %final_filename, "upload finished");
                let entry = &mut self.queue[file_index];
                entry.resource_id = Some(resource_id);
                entry.final_filename = Some(final_filename);
                self.last_completed = Some(file_index);
                self.active_file = None;
                self.active_chunk = None;
                self.upload_token = None;
                Ok(Step::FileFinished { file: file_index })
            }
            ChunkOutcome::Continue if !is_last => {
                let next_chunk = chunk_index + 1;
                debug!(name = %file.name, chunk = chunk_index, total, "chunk accepted");
                self.active_chunk = Some(next_chunk);
                Ok(Step::ChunkAccepted {
                    file: file_index,
                    next_chunk,
                })
            }
            ChunkOutcome::Finalized { .. } => Err(UploadError::EarlyFinalize {
                name: file.name,
                index: chunk_index,
                total,
            }),
            ChunkOutcome::Continue => Err(UploadError::MissingFinalize { name: file.name }),
        }
    }

    async fn send_with_retry(&self, request: ChunkRequest) -> Result<ChunkOutcome, UploadError> {
        let mut attempt = 1u32;
        loop {
            let err = match self.transport.send_chunk(request.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };
            let Some(delay) = self.retry.delay_before_resend(attempt, &err) else {
                return Err(UploadError::Transport {
                    name: request.name,
                    index: request.index,
                    attempts: attempt,
                    source: err,
                });
            };
            warn!(
                name = %request.name,
                chunk = request.index,
                attempt,
                "chunk send failed, retrying in {:?}: {}",
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Upload every queued file in order until the queue is exhausted or a
    /// chunk fails for good.
    pub async fn run(&mut self) -> Result<(), UploadError> {
        loop {
            if self.active_file.is_none() && !self.advance() {
                return Ok(());
            }
            if let Err(err) = self.send_active_chunk().await {
                error!("upload stalled: {}", err);
                return Err(err);
            }
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.queue
    }

    pub fn state_of(&self, index: usize) -> Option<EntryState> {
        let entry = self.queue.get(index)?;
        Some(if entry.final_filename.is_some() {
            EntryState::Done
        } else if self.active_file == Some(index) {
            EntryState::Uploading
        } else {
            EntryState::Queued
        })
    }

    /// Percentage complete: chunks acknowledged over total chunks, rounded.
    pub fn progress_of(&self, index: usize) -> Option<u8> {
        Some(match self.state_of(index)? {
            EntryState::Queued => 0,
            EntryState::Done => 100,
            EntryState::Uploading => {
                let file = &self.queue[index].file;
                let total = ChunkPlan::new(file.size, self.chunk_size).total_chunks();
                let sent = self.active_chunk.unwrap_or(0);
                ((sent as f64 / total as f64) * 100.0).round() as u8
            }
        })
    }

    /// No file is active and none is waiting.
    pub fn is_idle(&self) -> bool {
        self.active_file.is_none() && self.last_completed.map_or(0, |i| i + 1) >= self.queue.len()
    }
}
